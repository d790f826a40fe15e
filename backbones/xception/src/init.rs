//! Weight initialization shared by every convolution in the backbone.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer,
    },
    prelude::*,
};

/// Initializer for a convolution with a `kernel_size` kernel and `out_channels` filters.
///
/// With `enabled`, weights follow `N(0, sqrt(2 / n))` where `n = k_h * k_w * out_channels`
/// (He initialization over the fan-out, grouped convolutions included). Otherwise Burn's
/// default uniform initializer is kept.
pub fn conv_initializer(
    kernel_size: [usize; 2],
    out_channels: usize,
    enabled: bool,
) -> Option<Initializer> {
    if !enabled {
        return None;
    }

    let n = (kernel_size[0] * kernel_size[1] * out_channels).max(1) as f64;
    Some(Initializer::Normal {
        mean: 0.0,
        std: (2.0 / n).sqrt(),
    })
}

/// Builds `config`, overriding its initializer when `initialization` is set.
pub fn init_conv<B: Backend>(
    config: Conv2dConfig,
    initialization: bool,
    device: &Device<B>,
) -> Conv2d<B> {
    let config = match conv_initializer(config.kernel_size, config.channels[1], initialization) {
        Some(initializer) => config.with_initializer(initializer),
        None => config,
    };
    config.init(device)
}
