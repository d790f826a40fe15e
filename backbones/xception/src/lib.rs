//! Xception backbone implementation.
//!
//! A modified Xception in the DeepLab style: every max pooling of the original network is
//! replaced by a strided depthwise separable convolution, the middle flow is wrapped in
//! an outer residual, and the exit flow ends with three dilated separable convolutions.
//! The backbone returns the deep feature map together with the low-level feature kept
//! from the entry flow.

use burn::prelude::*;

mod blocks;
mod error;
mod flows;
mod init;

pub use blocks::*;
pub use error::{XceptionError, XceptionResult};
pub use flows::*;
pub use init::{conv_initializer, init_conv};

// Middle flow depths of the published variants
const XCEPTION41_MIDDLE_BLOCKS: usize = 8;
const XCEPTION65_MIDDLE_BLOCKS: usize = 16;

/// Downsampling of the stem (two stride-2 convolutions).
const STEM_STRIDE: usize = 4;

/// Xception backbone configuration.
#[derive(Config, Debug)]
pub struct XceptionConfig {
    /// Channels of the input image.
    #[config(default = "3")]
    pub in_channels: usize,
    /// Number of middle flow blocks.
    #[config(default = "16")]
    pub layers: usize,
    /// Channels of the backbone output.
    #[config(default = "2048")]
    pub out_channels: usize,
    /// `[in, out]` channels of the entry blocks.
    #[config(default = "DEFAULT_ENTRY_BLOCK_CHANNELS.to_vec()")]
    pub entry_block_channels: Vec<[usize; 2]>,
    /// Channels after the exit flow's downsampling block.
    #[config(default = "1024")]
    pub exit_block_channels: usize,
    /// Channels of the first dilated exit convolutions.
    #[config(default = "1536")]
    pub exit1_channels: usize,
    /// Draw convolution weights from `N(0, sqrt(2 / fan_out))`.
    #[config(default = "false")]
    pub initialization: bool,
}

impl XceptionConfig {
    /// Xception-41 layout (8 middle blocks).
    pub fn xception41() -> Self {
        Self::new().with_layers(XCEPTION41_MIDDLE_BLOCKS)
    }

    /// Xception-65 layout (16 middle blocks).
    pub fn xception65() -> Self {
        Self::new().with_layers(XCEPTION65_MIDDLE_BLOCKS)
    }

    fn entry(&self) -> EntryFlowConfig {
        EntryFlowConfig::new(self.in_channels)
            .with_block_channels(self.entry_block_channels.clone())
            .with_initialization(self.initialization)
    }

    fn middle(&self) -> MiddleFlowConfig {
        MiddleFlowConfig::new(self.middle_channels())
            .with_repeat(self.layers)
            .with_initialization(self.initialization)
    }

    fn exit(&self) -> ExitFlowConfig {
        ExitFlowConfig::new()
            .with_in_channels(self.middle_channels())
            .with_block_out_channels(self.exit_block_channels)
            .with_exit1_channels(self.exit1_channels)
            .with_exit2_channels(self.out_channels)
            .with_initialization(self.initialization)
    }

    /// Checks that every stage agrees on the channels flowing through it.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry blocks do not chain or a channel count is zero.
    pub fn validate(&self) -> XceptionResult<()> {
        self.entry().validate()?;
        if self.out_channels == 0 || self.exit_block_channels == 0 || self.exit1_channels == 0 {
            return Err(XceptionError::InvalidConfiguration {
                reason: format!(
                    "Exit channels must be positive, got {} -> {} -> {}",
                    self.exit_block_channels, self.exit1_channels, self.out_channels
                ),
            });
        }
        Ok(())
    }

    /// Channels flowing through the middle flow (the last entry block's output).
    pub fn middle_channels(&self) -> usize {
        self.entry().out_channels()
    }

    /// Channels of the low-level feature.
    pub fn low_level_channels(&self) -> usize {
        self.entry().low_level_channels()
    }

    /// Downsampling factor of the low-level feature.
    pub const fn low_level_stride(&self) -> usize {
        STEM_STRIDE * 2
    }

    /// Downsampling factor of the backbone output.
    ///
    /// Each entry block and the exit block halve the resolution once. Saturates at
    /// `usize::MAX` for entry flows too deep to express the stride.
    pub fn output_stride(&self) -> usize {
        u32::try_from(self.entry_block_channels.len() + 1)
            .ok()
            .and_then(|halvings| 2usize.checked_pow(halvings))
            .and_then(|factor| factor.checked_mul(STEM_STRIDE))
            .unwrap_or(usize::MAX)
    }

    /// Spatial size of the low-level feature for an `height x width` input.
    pub fn low_level_size(&self, height: usize, width: usize) -> [usize; 2] {
        [halve(height, 3), halve(width, 3)]
    }

    /// Spatial size of the backbone output for an `height x width` input.
    pub fn output_size(&self, height: usize, width: usize) -> [usize; 2] {
        let halvings = 2 + self.entry_block_channels.len() + 1;
        [halve(height, halvings), halve(width, halvings)]
    }

    /// Initializes the backbone.
    ///
    /// # Errors
    ///
    /// Returns an error if [`XceptionConfig::validate`] fails.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> XceptionResult<XceptionBackbone<B>> {
        self.validate()?;

        let entry = self.entry().init(device)?;
        tracing::debug!(
            blocks = entry.num_blocks(),
            low_level_channels = self.low_level_channels(),
            "entry flow built"
        );

        let middle = self.middle().init(device)?;
        tracing::debug!(
            blocks = middle.num_blocks(),
            channels = self.middle_channels(),
            "middle flow built"
        );

        let exit = self.exit().init(device)?;
        tracing::debug!(out_channels = self.out_channels, "exit flow built");

        Ok(XceptionBackbone {
            entry,
            middle,
            exit,
            out_channels: self.out_channels,
            low_level_channels: self.low_level_channels(),
        })
    }
}

/// Spatial size after `times` stride-2 stages, each mapping `n` to `ceil(n / 2)`.
pub const fn halve(size: usize, times: usize) -> usize {
    let mut size = size;
    let mut remaining = times;
    while remaining > 0 {
        size = size.div_ceil(2);
        remaining -= 1;
    }
    size
}

/// Backbone output: the deep feature map and the rectified low-level feature.
#[derive(Debug, Clone)]
pub struct XceptionFeatures<B: Backend> {
    /// Output of the exit flow (1/64 scale with the default entry flow).
    pub out: Tensor<B, 4>,
    /// Output of the first entry block (1/8 scale).
    pub low_level: Tensor<B, 4>,
}

/// Xception backbone: entry, middle and exit flows.
#[derive(Module, Debug)]
pub struct XceptionBackbone<B: Backend> {
    entry: EntryFlow<B>,
    middle: MiddleFlow<B>,
    exit: ExitFlow<B>,
    out_channels: usize,
    low_level_channels: usize,
}

impl<B: Backend> XceptionBackbone<B> {
    /// Forward pass returning the deep and low-level features.
    ///
    /// # Shapes
    /// - input: `[batch_size, in_channels, height, width]`
    /// - out: `[batch_size, out_channels, height / 64, width / 64]` (rounded up)
    /// - low_level: `[batch_size, low_level_channels, height / 8, width / 8]` (rounded up)
    pub fn forward(&self, input: Tensor<B, 4>) -> XceptionFeatures<B> {
        let (x, low_level) = self.entry.forward(input);
        let x = self.middle.forward(x);
        let out = self.exit.forward(x);

        XceptionFeatures { out, low_level }
    }

    /// Channels of the deep output.
    pub const fn output_channels(&self) -> usize {
        self.out_channels
    }

    /// Channels of the low-level output.
    pub const fn low_level_channels(&self) -> usize {
        self.low_level_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn slim_config() -> XceptionConfig {
        XceptionConfig::new()
            .with_layers(2)
            .with_entry_block_channels(vec![[64, 16], [16, 24], [24, 32]])
            .with_exit_block_channels(40)
            .with_exit1_channels(48)
            .with_out_channels(56)
    }

    #[test]
    fn test_xception_config() {
        let config = XceptionConfig::xception65();
        assert_eq!(config.layers, 16);
        assert_eq!(config.in_channels, 3);
        assert_eq!(config.out_channels, 2048);
        assert_eq!(config.middle_channels(), 728);
        assert_eq!(config.low_level_channels(), 128);
        assert_eq!(config.low_level_stride(), 8);
        assert_eq!(config.output_stride(), 64);
        assert!(!config.initialization);

        assert_eq!(XceptionConfig::xception41().layers, 8);
    }

    #[test]
    fn output_size_rounds_up_at_every_stage() {
        let config = XceptionConfig::new();

        assert_eq!(config.output_size(512, 512), [8, 8]);
        assert_eq!(config.low_level_size(512, 512), [64, 64]);
        // 100 -> 50 -> 25 -> 13 -> 7 -> 4 -> 2
        assert_eq!(config.output_size(100, 100), [2, 2]);
        assert_eq!(config.low_level_size(100, 30), [13, 4]);
    }

    #[test]
    fn output_stride_follows_entry_depth() {
        let config = XceptionConfig::new().with_entry_block_channels(vec![[64, 128], [128, 256]]);

        assert_eq!(config.output_stride(), 32);
        assert_eq!(config.middle_channels(), 256);
    }

    #[test]
    fn output_stride_saturates_for_deep_entry_flows() {
        let config = XceptionConfig::new().with_entry_block_channels(vec![[64, 64]; 70]);

        assert_eq!(config.output_stride(), usize::MAX);
        assert_eq!(config.output_size(512, 512), [1, 1]);
        assert_eq!(config.middle_channels(), 64);
    }

    #[test]
    fn test_xception_forward() {
        let device = Default::default();
        let config = slim_config();
        let model = config.init::<TestBackend>(&device).expect("valid backbone");

        let input = Tensor::<TestBackend, 4>::random(
            [2, 3, 96, 80],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let features = model.forward(input);

        let [h, w] = config.output_size(96, 80);
        let [lh, lw] = config.low_level_size(96, 80);
        assert_eq!(features.out.dims(), [2, 56, h, w]);
        assert_eq!(features.low_level.dims(), [2, 16, lh, lw]);
        assert_eq!(model.output_channels(), 56);
        assert_eq!(model.low_level_channels(), 16);
    }

    #[test]
    fn test_xception65_forward() {
        let device = Default::default();
        let model = XceptionConfig::xception65()
            .with_initialization(true)
            .init::<TestBackend>(&device)
            .expect("valid backbone");

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let features = model.forward(input);

        assert_eq!(features.out.dims(), [1, 2048, 1, 1]); // 64 / 64
        assert_eq!(features.low_level.dims(), [1, 128, 8, 8]); // 64 / 8
    }

    #[test]
    fn single_channel_input() {
        let device = Default::default();
        let model = slim_config()
            .with_in_channels(1)
            .init::<TestBackend>(&device)
            .expect("valid backbone");

        let input = Tensor::<TestBackend, 4>::ones([1, 1, 32, 32], &device);
        let features = model.forward(input);

        assert_eq!(features.out.dims(), [1, 56, 1, 1]);
    }

    #[test]
    fn invalid_entry_channels_are_reported() {
        let device = Default::default();
        let result = XceptionConfig::new()
            .with_entry_block_channels(vec![[64, 128], [64, 728]])
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(XceptionError::ChannelMismatch { expected: 128, actual: 64, .. })
        ));
    }

    #[test]
    fn zero_output_channels_are_rejected() {
        let result = XceptionConfig::new().with_out_channels(0).validate();

        assert!(matches!(
            result,
            Err(XceptionError::InvalidConfiguration { .. })
        ));
    }
}
