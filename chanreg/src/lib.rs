//! `ChanReg`: a modified Xception network for semantic segmentation with channel
//! regularization, built on Burn.
//!
//! The crate assembles the Xception backbone with a global-pooling classifier and exposes
//! the low-level entry-flow feature for segmentation decoders.

mod config;
mod error;
mod models;
#[cfg(feature = "train")]
mod training;

pub use config::{BackboneVariant, HeadConfig, ModelConfig};
pub use error::{ChanRegError, ChanRegResult};
pub use models::{
    ChanRegNet, ChanRegNetConfig, ChanRegNetRecord, ChanRegOutput, FeatureMapClassifier,
    FeatureMapClassifierConfig,
};
#[cfg(feature = "train")]
pub use training::{nll_loss, ClassificationBatch};
pub use xception;
