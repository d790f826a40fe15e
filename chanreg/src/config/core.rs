//! Core configuration structures for ChanReg.
//!
//! `ModelConfig` gathers the backbone layout and the classification head. Every shape the
//! network produces can be derived from it without building any tensor.

use burn::prelude::*;
use xception::XceptionConfig;

use super::enums::BackboneVariant;
use crate::error::{ChanRegError, ChanRegResult};

/// Main configuration for the ChanReg model.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Backbone network configuration.
    #[config(default = "XceptionConfig::xception65()")]
    pub backbone: XceptionConfig,
    /// Classification head configuration.
    #[config(default = "HeadConfig::new()")]
    pub head: HeadConfig,
}

/// Classification head configuration.
#[derive(Config, Debug)]
pub struct HeadConfig {
    /// Number of output classes.
    #[config(default = "21")]
    pub num_classes: usize,
}

impl ModelConfig {
    /// Configuration for one of the named backbone layouts.
    #[must_use]
    pub fn from_variant(variant: &BackboneVariant) -> Self {
        Self::new().with_backbone(variant.backbone_config())
    }

    /// Validate the configuration and return appropriate errors for invalid settings.
    ///
    /// # Errors
    ///
    /// Returns `Err(ChanRegError::Backbone)` if the backbone stages do not line up.
    /// Returns `Err(ChanRegError::InvalidConfiguration)` if the head has no classes.
    pub fn validate(&self) -> ChanRegResult<()> {
        // 1. Backbone channel bookkeeping
        self.backbone.validate()?;

        // 2. Classification head
        if self.head.num_classes == 0 {
            return Err(ChanRegError::InvalidConfiguration {
                reason: "Number of classes must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Channels of the image the model expects.
    #[must_use]
    pub const fn in_channels(&self) -> usize {
        self.backbone.in_channels
    }

    /// Channels of the backbone output, also the classifier input.
    #[must_use]
    pub const fn feature_channels(&self) -> usize {
        self.backbone.out_channels
    }

    /// Expected `(features, low_level)` shapes for an input of `[batch, C, height, width]`.
    #[must_use]
    pub fn feature_shapes(
        &self,
        batch_size: usize,
        height: usize,
        width: usize,
    ) -> ([usize; 4], [usize; 4]) {
        let [out_h, out_w] = self.backbone.output_size(height, width);
        let [low_h, low_w] = self.backbone.low_level_size(height, width);
        (
            [batch_size, self.backbone.out_channels, out_h, out_w],
            [batch_size, self.backbone.low_level_channels(), low_h, low_w],
        )
    }
}
