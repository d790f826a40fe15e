//! Entry, middle and exit flows.
//!
//! The entry flow downsamples by 32 (with the default three blocks) and exposes the
//! stride-8 low-level feature. The middle flow keeps resolution and channels. The exit
//! flow downsamples once more and widens channels through dilated separable convolutions.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::{
    blocks::{Block, BlockConfig, DepthwiseSeparableConv, DepthwiseSeparableConvConfig},
    error::{XceptionError, XceptionResult},
    init::init_conv,
};

/// Channels produced by the two-convolution stem.
pub const STEM_CHANNELS: usize = 64;
const STEM_HIDDEN_CHANNELS: usize = 32;

/// Default `[in, out]` channel pairs of the entry blocks.
pub const DEFAULT_ENTRY_BLOCK_CHANNELS: [[usize; 2]; 3] = [[64, 128], [128, 256], [256, 728]];

/// Configuration for [`EntryFlow`].
#[derive(Config, Debug)]
pub struct EntryFlowConfig {
    pub in_channels: usize,
    /// `[in, out]` channels of each downsampling block. The first block produces the
    /// low-level feature and must start from the stem's 64 channels.
    #[config(default = "DEFAULT_ENTRY_BLOCK_CHANNELS.to_vec()")]
    pub block_channels: Vec<[usize; 2]>,
    #[config(default = "false")]
    pub initialization: bool,
}

impl EntryFlowConfig {
    /// Checks that the entry blocks chain from the stem to the last block.
    ///
    /// # Errors
    ///
    /// Returns an error if no block is configured, or if one block's input does not
    /// match the channels produced before it.
    pub fn validate(&self) -> XceptionResult<()> {
        if self.in_channels == 0 {
            return Err(XceptionError::InvalidConfiguration {
                reason: "Input channels must be positive".to_string(),
            });
        }
        if self.block_channels.is_empty() {
            return Err(XceptionError::InvalidConfiguration {
                reason: "Entry flow needs at least one block".to_string(),
            });
        }

        let mut expected = STEM_CHANNELS;
        for (idx, [block_in, block_out]) in self.block_channels.iter().copied().enumerate() {
            if block_in != expected {
                return Err(XceptionError::ChannelMismatch {
                    stage: format!("entry block {idx}"),
                    expected,
                    actual: block_in,
                });
            }
            if block_out == 0 {
                return Err(XceptionError::InvalidConfiguration {
                    reason: format!("Entry block {idx} has no output channels"),
                });
            }
            expected = block_out;
        }
        Ok(())
    }

    /// Channels of the deep entry output.
    pub fn out_channels(&self) -> usize {
        self.block_channels
            .last()
            .map_or(STEM_CHANNELS, |[_, out]| *out)
    }

    /// Channels of the low-level feature.
    pub fn low_level_channels(&self) -> usize {
        self.block_channels
            .first()
            .map_or(STEM_CHANNELS, |[_, out]| *out)
    }

    /// Initializes a new [`EntryFlow`].
    ///
    /// # Errors
    ///
    /// Returns an error if [`EntryFlowConfig::validate`] fails.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> XceptionResult<EntryFlow<B>> {
        self.validate()?;

        let conv1 = init_conv(
            Conv2dConfig::new([self.in_channels, STEM_HIDDEN_CHANNELS], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false),
            self.initialization,
            device,
        );
        let bn1 = BatchNormConfig::new(STEM_HIDDEN_CHANNELS).init(device);

        let conv2 = init_conv(
            Conv2dConfig::new([STEM_HIDDEN_CHANNELS, STEM_CHANNELS], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1)),
            self.initialization,
            device,
        );
        let bn2 = BatchNormConfig::new(STEM_CHANNELS).init(device);

        let mut blocks = self
            .block_channels
            .iter()
            .map(|&[block_in, block_out]| {
                BlockConfig::new(block_in, block_out, block_out)
                    .with_stride(2)
                    .with_strided_out(true)
                    .with_initialization(self.initialization)
                    .init(device)
            })
            .collect::<XceptionResult<Vec<_>>>()?;
        let low_level_block = blocks.remove(0);

        Ok(EntryFlow {
            conv1,
            bn1,
            conv2,
            bn2,
            relu: Relu::new(),
            low_level_block,
            blocks,
        })
    }
}

/// Entry flow: a two-convolution stem followed by downsampling blocks.
#[derive(Module, Debug)]
pub struct EntryFlow<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    relu: Relu,
    low_level_block: Block<B>,
    blocks: Vec<Block<B>>,
}

impl<B: Backend> EntryFlow<B> {
    /// Returns `(deep, low_level)`.
    ///
    /// The low-level feature is rectified on the way out; the deep path receives it
    /// before the ReLU because every block starts with its own activation.
    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);
        let x = self.relu.forward(x);
        let low_level = self.low_level_block.forward(x);

        let deep = self
            .blocks
            .iter()
            .fold(low_level.clone(), |x, block| block.forward(x));

        (deep, relu(low_level))
    }

    /// Number of downsampling blocks, the low-level one included.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len() + 1
    }
}

/// Configuration for [`MiddleFlow`].
#[derive(Config, Debug)]
pub struct MiddleFlowConfig {
    pub channels: usize,
    /// Number of repeated three-unit blocks.
    #[config(default = "16")]
    pub repeat: usize,
    #[config(default = "false")]
    pub initialization: bool,
}

impl MiddleFlowConfig {
    /// Initializes a new [`MiddleFlow`].
    ///
    /// # Errors
    ///
    /// Returns an error if `channels` is zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> XceptionResult<MiddleFlow<B>> {
        if self.channels == 0 {
            return Err(XceptionError::InvalidConfiguration {
                reason: "Middle flow channels must be positive".to_string(),
            });
        }

        let blocks = (0..self.repeat)
            .map(|_| {
                BlockConfig::new(self.channels, self.channels, self.channels)
                    .with_n_convs(3)
                    .with_initialization(self.initialization)
                    .init(device)
            })
            .collect::<XceptionResult<Vec<_>>>()?;

        Ok(MiddleFlow { blocks })
    }
}

/// Middle flow: residual blocks at constant resolution, wrapped in an outer residual.
///
/// With zero blocks the inner path is the identity and the flow doubles its input.
#[derive(Module, Debug)]
pub struct MiddleFlow<B: Backend> {
    blocks: Vec<Block<B>>,
}

impl<B: Backend> MiddleFlow<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self
            .blocks
            .iter()
            .fold(input.clone(), |x, block| block.forward(x));
        out + input
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// Configuration for [`ExitFlow`].
#[derive(Config, Debug)]
pub struct ExitFlowConfig {
    /// Channels coming out of the middle flow.
    #[config(default = "728")]
    pub in_channels: usize,
    /// Channels after the downsampling block.
    #[config(default = "1024")]
    pub block_out_channels: usize,
    /// Channels of the first two dilated separable convolutions.
    #[config(default = "1536")]
    pub exit1_channels: usize,
    /// Channels of the last dilated separable convolution, the backbone output.
    #[config(default = "2048")]
    pub exit2_channels: usize,
    #[config(default = "2")]
    pub dilation: usize,
    #[config(default = "false")]
    pub initialization: bool,
}

impl ExitFlowConfig {
    /// Initializes a new [`ExitFlow`].
    ///
    /// # Errors
    ///
    /// Returns an error if a channel count or the dilation is zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> XceptionResult<ExitFlow<B>> {
        if self.exit1_channels == 0 || self.exit2_channels == 0 || self.dilation == 0 {
            return Err(XceptionError::InvalidConfiguration {
                reason: format!(
                    "Exit flow needs positive channels and dilation, got {} / {} / dilation {}",
                    self.exit1_channels, self.exit2_channels, self.dilation
                ),
            });
        }

        let block = BlockConfig::new(self.in_channels, self.in_channels, self.block_out_channels)
            .with_stride(2)
            .with_strided_out(true)
            .with_initialization(self.initialization)
            .init(device)?;

        let units = [
            (self.block_out_channels, self.exit1_channels),
            (self.exit1_channels, self.exit1_channels),
            (self.exit1_channels, self.exit2_channels),
        ]
        .into_iter()
        .map(|(unit_in, unit_out)| SeparableBnRelu {
            conv: DepthwiseSeparableConvConfig::new(unit_in, unit_out)
                .with_dilation(self.dilation)
                .with_initialization(self.initialization)
                .init(device),
            bn: BatchNormConfig::new(unit_out).init(device),
            relu: Relu::new(),
        })
        .collect();

        Ok(ExitFlow { block, units })
    }
}

/// `separable conv -> batch norm -> ReLU`, used after the exit block.
#[derive(Module, Debug)]
pub struct SeparableBnRelu<B: Backend> {
    conv: DepthwiseSeparableConv<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> SeparableBnRelu<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// Exit flow: one downsampling block, then three dilated separable convolutions.
#[derive(Module, Debug)]
pub struct ExitFlow<B: Backend> {
    block: Block<B>,
    units: Vec<SeparableBnRelu<B>>,
}

impl<B: Backend> ExitFlow<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.block.forward(input);
        self.units.iter().fold(x, |x, unit| unit.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn random_input(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(
            shape,
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }

    fn small_entry() -> EntryFlowConfig {
        EntryFlowConfig::new(3).with_block_channels(vec![[64, 16], [16, 24], [24, 32]])
    }

    #[test]
    fn entry_flow_returns_deep_and_low_level_features() {
        let device = Default::default();
        let entry = small_entry().init::<TestBackend>(&device).expect("valid entry");

        let (deep, low_level) = entry.forward(random_input([2, 3, 64, 64]));

        assert_eq!(entry.num_blocks(), 3);
        assert_eq!(low_level.dims(), [2, 16, 8, 8]); // 64 / 8
        assert_eq!(deep.dims(), [2, 32, 2, 2]); // 64 / 32
    }

    #[test]
    fn low_level_feature_is_rectified() {
        let device = Default::default();
        let entry = small_entry().init::<TestBackend>(&device).expect("valid entry");

        let (_, low_level) = entry.forward(random_input([1, 3, 32, 32]));

        let min = low_level.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn initialized_stem_convs_scale_by_fan_out() {
        let device = Default::default();
        let entry = small_entry()
            .with_initialization(true)
            .init::<TestBackend>(&device)
            .expect("valid entry");

        for (weight, out_channels) in [
            (entry.conv1.weight.val(), STEM_HIDDEN_CHANNELS),
            (entry.conv2.weight.val(), STEM_CHANNELS),
        ] {
            let n = weight.shape().num_elements() as f32;
            let variance = weight.powf_scalar(2.0).sum().into_scalar() / n;
            let expected = 2.0 / (3 * 3 * out_channels) as f32;
            assert!(
                (variance - expected).abs() / expected < 0.3,
                "variance {variance} too far from {expected}"
            );
        }
    }

    #[test]
    fn single_block_entry_uses_low_level_as_output() {
        let device = Default::default();
        let entry = EntryFlowConfig::new(1)
            .with_block_channels(vec![[64, 8]])
            .init::<TestBackend>(&device)
            .expect("valid entry");

        let (deep, low_level) = entry.forward(random_input([1, 1, 16, 16]));

        assert_eq!(deep.dims(), [1, 8, 2, 2]);
        assert_eq!(low_level.dims(), deep.dims());
    }

    #[test]
    fn entry_blocks_must_chain() {
        let config = EntryFlowConfig::new(3).with_block_channels(vec![[64, 128], [256, 728]]);

        match config.validate() {
            Err(XceptionError::ChannelMismatch {
                stage,
                expected,
                actual,
            }) => {
                assert_eq!(stage, "entry block 1");
                assert_eq!(expected, 128);
                assert_eq!(actual, 256);
            }
            other => panic!("Expected ChannelMismatch, got {other:?}"),
        }
    }

    #[test]
    fn first_entry_block_must_start_from_stem() {
        let config = EntryFlowConfig::new(3).with_block_channels(vec![[32, 128]]);

        assert!(matches!(
            config.validate(),
            Err(XceptionError::ChannelMismatch { expected: 64, .. })
        ));
        assert!(EntryFlowConfig::new(3)
            .with_block_channels(vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn default_entry_channels() {
        let config = EntryFlowConfig::new(3);

        assert!(config.validate().is_ok());
        assert_eq!(config.low_level_channels(), 128);
        assert_eq!(config.out_channels(), 728);
    }

    #[test]
    fn middle_flow_keeps_shape() {
        let device = Default::default();
        let middle = MiddleFlowConfig::new(16)
            .with_repeat(2)
            .init::<TestBackend>(&device)
            .expect("valid middle");

        assert_eq!(middle.num_blocks(), 2);
        assert_eq!(
            middle.forward(random_input([2, 16, 4, 4])).dims(),
            [2, 16, 4, 4]
        );
    }

    #[test]
    fn empty_middle_flow_doubles_input() {
        let device = Default::default();
        let middle = MiddleFlowConfig::new(4)
            .with_repeat(0)
            .init::<TestBackend>(&device)
            .expect("valid middle");
        let x = random_input([1, 4, 3, 3]);

        let diff = (middle.forward(x.clone()) - x * 2.0)
            .abs()
            .max()
            .into_scalar();

        assert!(diff < 1e-6);
    }

    #[test]
    fn exit_flow_downsamples_and_widens() {
        let device = Default::default();
        let exit = ExitFlowConfig::new()
            .with_in_channels(16)
            .with_block_out_channels(24)
            .with_exit1_channels(32)
            .with_exit2_channels(40)
            .init::<TestBackend>(&device)
            .expect("valid exit");

        let output = exit.forward(random_input([1, 16, 8, 8]));

        assert_eq!(output.dims(), [1, 40, 4, 4]);
        assert!(output.min().into_scalar() >= 0.0);
    }

    #[test]
    fn exit_flow_rejects_zero_dilation() {
        let device = Default::default();
        let result = ExitFlowConfig::new()
            .with_in_channels(8)
            .with_dilation(0)
            .init::<TestBackend>(&device);

        assert!(result.is_err());
    }
}
