//! Xception block implementations.
//!
//! This module contains the building blocks shared by the three flows: the depthwise
//! separable convolution and the residual `Block` used by the entry and middle flows.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use burn_extra_ops::{FixedPadding, FixedPaddingConfig};

use crate::{
    error::{XceptionError, XceptionResult},
    init::init_conv,
};

/// Configuration for [`DepthwiseSeparableConv`].
#[derive(Config, Debug)]
pub struct DepthwiseSeparableConvConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output channels.
    pub out_channels: usize,
    #[config(default = "3")]
    pub kernel_size: usize,
    #[config(default = "1")]
    pub stride: usize,
    #[config(default = "1")]
    pub dilation: usize,
    #[config(default = "false")]
    pub bias: bool,
    /// Use the fan-out normal initializer instead of Burn's default.
    #[config(default = "false")]
    pub initialization: bool,
}

impl DepthwiseSeparableConvConfig {
    /// Initializes a new [`DepthwiseSeparableConv`].
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DepthwiseSeparableConv<B> {
        let padding = FixedPaddingConfig::new(self.kernel_size)
            .with_dilation(self.dilation)
            .init();

        // One filter per input channel, padding handled by `padding`
        let depthwise = init_conv(
            Conv2dConfig::new(
                [self.in_channels, self.in_channels],
                [self.kernel_size, self.kernel_size],
            )
            .with_stride([self.stride, self.stride])
            .with_dilation([self.dilation, self.dilation])
            .with_padding(PaddingConfig2d::Valid)
            .with_groups(self.in_channels)
            .with_bias(self.bias),
            self.initialization,
            device,
        );

        let pointwise = init_conv(
            Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1]).with_bias(self.bias),
            self.initialization,
            device,
        );

        DepthwiseSeparableConv {
            padding,
            depthwise,
            pointwise,
        }
    }
}

/// A per-channel spatial convolution followed by a 1x1 channel-mixing convolution.
///
/// The input is padded with [`FixedPadding`] first, so for odd kernels the spatial size
/// becomes `ceil(size / stride)` whatever the dilation.
#[derive(Module, Debug)]
pub struct DepthwiseSeparableConv<B: Backend> {
    padding: FixedPadding<B>,
    depthwise: Conv2d<B>,
    pointwise: Conv2d<B>,
}

impl<B: Backend> DepthwiseSeparableConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.padding.forward(x);
        let x = self.depthwise.forward(x);
        self.pointwise.forward(x)
    }
}

/// `ReLU -> separable conv -> batch norm`, the repeated unit of a [`Block`].
#[derive(Module, Debug)]
pub struct PreActSeparable<B: Backend> {
    relu: Relu,
    conv: DepthwiseSeparableConv<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> PreActSeparable<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(x);
        let x = self.conv.forward(x);
        self.bn.forward(x)
    }

    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        initialization: bool,
        device: &Device<B>,
    ) -> Self {
        let conv = DepthwiseSeparableConvConfig::new(in_channels, out_channels)
            .with_kernel_size(kernel_size)
            .with_initialization(initialization)
            .init(device);

        Self {
            relu: Relu::new(),
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }
}

/// Configuration for the entry and middle flow [`Block`].
#[derive(Config, Debug)]
pub struct BlockConfig {
    pub in_channels: usize,
    pub middle_channels: usize,
    pub out_channels: usize,
    #[config(default = "3")]
    pub kernel_size: usize,
    #[config(default = "1")]
    pub stride: usize,
    /// End with a strided separable convolution instead of max pooling.
    #[config(default = "false")]
    pub strided_out: bool,
    /// Number of separable units, 2 or 3.
    #[config(default = "2")]
    pub n_convs: usize,
    #[config(default = "false")]
    pub initialization: bool,
}

impl BlockConfig {
    /// Checks that the residual branch and the main path produce the same shape.
    ///
    /// # Errors
    ///
    /// Returns `XceptionError::InvalidConfiguration` when a channel count is zero, when
    /// `n_convs` is outside `2..=3`, or when a stride is requested without the strided
    /// output convolution that applies it.
    pub fn validate(&self) -> XceptionResult<()> {
        if self.in_channels == 0 || self.middle_channels == 0 || self.out_channels == 0 {
            return Err(XceptionError::InvalidConfiguration {
                reason: format!(
                    "Block channels must be positive, got {} -> {} -> {}",
                    self.in_channels, self.middle_channels, self.out_channels
                ),
            });
        }
        if self.kernel_size == 0 || self.stride == 0 {
            return Err(XceptionError::InvalidConfiguration {
                reason: "Block kernel size and stride must be positive".to_string(),
            });
        }
        if !(2..=3).contains(&self.n_convs) {
            return Err(XceptionError::InvalidConfiguration {
                reason: format!("Block n_convs must be 2 or 3, got {}", self.n_convs),
            });
        }
        if self.stride != 1 && !self.strided_out {
            return Err(XceptionError::InvalidConfiguration {
                reason: format!(
                    "Block stride {} requires strided_out, otherwise the skip path is downsampled alone",
                    self.stride
                ),
            });
        }
        Ok(())
    }

    /// Initializes a new [`Block`].
    ///
    /// # Errors
    ///
    /// Returns an error if [`BlockConfig::validate`] fails.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> XceptionResult<Block<B>> {
        self.validate()?;

        let mut units = Vec::with_capacity(self.n_convs);
        units.push(PreActSeparable::new(
            self.in_channels,
            self.middle_channels,
            self.kernel_size,
            self.initialization,
            device,
        ));
        units.push(PreActSeparable::new(
            self.middle_channels,
            self.out_channels,
            self.kernel_size,
            self.initialization,
            device,
        ));
        if self.n_convs > 2 {
            units.push(PreActSeparable::new(
                self.out_channels,
                self.out_channels,
                self.kernel_size,
                self.initialization,
                device,
            ));
        }

        let strided_out = self.strided_out.then(|| {
            DepthwiseSeparableConvConfig::new(self.out_channels, self.out_channels)
                .with_kernel_size(self.kernel_size)
                .with_stride(self.stride)
                .with_initialization(self.initialization)
                .init(device)
        });

        let skip = (self.in_channels != self.out_channels || self.stride != 1).then(|| {
            init_conv(
                Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
                    .with_stride([self.stride, self.stride])
                    .with_padding(PaddingConfig2d::Explicit(0, 0)),
                self.initialization,
                device,
            )
        });

        Ok(Block {
            units,
            strided_out,
            skip,
        })
    }
}

/// Residual block of the entry and middle flows.
///
/// The main path is two (or three) [`PreActSeparable`] units, optionally followed by a
/// strided separable convolution that downsamples in place of max pooling. The skip path
/// is a strided 1x1 convolution when channels or resolution change, the identity otherwise.
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    units: Vec<PreActSeparable<B>>,
    strided_out: Option<DepthwiseSeparableConv<B>>,
    skip: Option<Conv2d<B>>,
}

impl<B: Backend> Block<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self
            .units
            .iter()
            .fold(input, |out, unit| unit.forward(out));
        let out = match &self.strided_out {
            Some(conv) => conv.forward(out),
            None => out,
        };

        // Skip connection
        match &self.skip {
            Some(skip) => out + skip.forward(identity),
            None => out + identity,
        }
    }

    /// Number of separable units on the main path, excluding the strided output conv.
    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    /// Whether the residual branch carries a projection.
    pub const fn has_projection(&self) -> bool {
        self.skip.is_some()
    }
}
