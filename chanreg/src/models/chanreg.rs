//! # ChanReg Model Implementation
//!
//! This module defines the main `ChanRegNet` model: an Xception backbone whose deep feature
//! map feeds a global-pooling classifier, with the entry flow's low-level feature passed
//! through for segmentation decoders built on top of it.

use burn::prelude::*;
use xception::{XceptionBackbone, XceptionFeatures};

use super::{FeatureMapClassifier, FeatureMapClassifierConfig};
use crate::{
    config::ModelConfig,
    error::{ChanRegError, ChanRegResult},
};

/// Configuration for the `ChanRegNet` model.
#[derive(Config, Debug)]
pub struct ChanRegNetConfig {
    /// The detailed model configuration.
    pub config: ModelConfig,
}

impl ChanRegNetConfig {
    /// Initializes a `ChanRegNet` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ChanRegResult<ChanRegNet<B>> {
        self.config.validate()?;

        let backbone = self.config.backbone.init(device)?;
        let classifier = FeatureMapClassifierConfig::new(
            self.config.feature_channels(),
            self.config.head.num_classes,
        )
        .init(device);

        let model = ChanRegNet {
            backbone,
            classifier,
            in_channels: self.config.in_channels(),
        };

        tracing::info!(
            middle_blocks = self.config.backbone.layers,
            feature_channels = self.config.feature_channels(),
            num_classes = self.config.head.num_classes,
            output_stride = self.config.backbone.output_stride(),
            num_params = model.num_params(),
            "model initialized"
        );

        Ok(model)
    }
}

/// Everything produced by one forward pass.
#[derive(Debug, Clone)]
pub struct ChanRegOutput<B: Backend> {
    /// Deep feature map from the exit flow.
    pub features: Tensor<B, 4>,
    /// Rectified low-level feature from the entry flow.
    pub low_level: Tensor<B, 4>,
    /// Per-class log-probabilities, `[batch_size, num_classes]`.
    pub log_probs: Tensor<B, 2>,
}

/// The main ChanReg model.
#[derive(Module, Debug)]
pub struct ChanRegNet<B: Backend> {
    /// The backbone encoder.
    backbone: XceptionBackbone<B>,
    /// The classification head.
    classifier: FeatureMapClassifier<B>,
    /// Channels of the expected input.
    in_channels: usize,
}

impl<B: Backend> ChanRegNet<B> {
    /// Runs the backbone and the classifier.
    ///
    /// # Errors
    ///
    /// Returns `ChanRegError::InvalidTensorShape` if the input channels differ from the
    /// configured ones or a spatial axis is empty.
    pub fn forward(&self, x: Tensor<B, 4>) -> ChanRegResult<ChanRegOutput<B>> {
        let XceptionFeatures { out, low_level } = self.forward_features(x)?;
        let log_probs = self.classifier.forward(out.clone());

        Ok(ChanRegOutput {
            features: out,
            low_level,
            log_probs,
        })
    }

    /// Runs the backbone only.
    ///
    /// # Errors
    ///
    /// Returns `ChanRegError::InvalidTensorShape` on an incompatible input.
    pub fn forward_features(&self, x: Tensor<B, 4>) -> ChanRegResult<XceptionFeatures<B>> {
        self.check_input(&x)?;
        Ok(self.backbone.forward(x))
    }

    /// Per-class log-probabilities without input checks.
    pub fn forward_log_probs(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        self.classifier.forward(features.out)
    }

    /// Channels of the expected input.
    pub const fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Channels of the deep feature map.
    pub const fn feature_channels(&self) -> usize {
        self.backbone.output_channels()
    }

    /// Channels of the low-level feature.
    pub const fn low_level_channels(&self) -> usize {
        self.backbone.low_level_channels()
    }

    fn check_input(&self, x: &Tensor<B, 4>) -> ChanRegResult<()> {
        let [batch_size, channels, height, width] = x.dims();
        if channels != self.in_channels || batch_size == 0 || height == 0 || width == 0 {
            return Err(ChanRegError::InvalidTensorShape {
                expected: format!("[N > 0, {}, H > 0, W > 0]", self.in_channels),
                actual: format!("{:?}", x.dims()),
            });
        }
        Ok(())
    }
}
