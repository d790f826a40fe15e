//! Enumeration types for ChanReg configuration.

use burn::prelude::*;
use xception::XceptionConfig;

/// Defines the backbone layout.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum BackboneVariant {
    /// Xception-41: 8 middle flow blocks.
    Xception41,
    /// Xception-65: 16 middle flow blocks.
    Xception65,
}

impl BackboneVariant {
    /// Backbone configuration for this variant with default channels.
    #[must_use]
    pub fn backbone_config(&self) -> XceptionConfig {
        match self {
            Self::Xception41 => XceptionConfig::xception41(),
            Self::Xception65 => XceptionConfig::xception65(),
        }
    }

    /// Number of middle flow blocks of the variant.
    #[must_use]
    pub fn middle_blocks(&self) -> usize {
        self.backbone_config().layers
    }
}
