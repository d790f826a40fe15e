use thiserror::Error;

/// Errors raised while building an Xception backbone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XceptionError {
    /// The requested layer layout cannot be assembled.
    #[error("Invalid Xception configuration: {reason}")]
    InvalidConfiguration {
        /// Why the layout is inconsistent.
        reason: String,
    },

    /// Two stages disagree on the number of channels flowing between them.
    #[error("Channel mismatch in {stage}: expected {expected}, got {actual}")]
    ChannelMismatch {
        /// The stage whose input does not line up.
        stage: String,
        /// Channels produced by the previous stage.
        expected: usize,
        /// Channels the stage was configured to accept.
        actual: usize,
    },
}

/// A specialized `Result` type for backbone construction.
pub type XceptionResult<T> = Result<T, XceptionError>;
