use thiserror::Error;
use xception::XceptionError;

/// The error type for `ChanReg-Burn` operations.
///
/// This enum covers configuration problems, backbone construction failures, and inputs
/// whose shape does not match the model they are fed to.
#[derive(Error, Debug)]
pub enum ChanRegError {
    /// Error for when an invalid model configuration is provided.
    /// This can happen if configuration parameters are logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// The backbone could not be assembled from its configuration.
    #[error("Backbone construction failed: {0}")]
    Backbone(#[from] XceptionError),

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },
}

/// A specialized `Result` type for `ChanReg-Burn` operations.
pub type ChanRegResult<T> = Result<T, ChanRegError>;
