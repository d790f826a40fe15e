//! # Model Architectures
//!
//! This module aggregates the components of the ChanReg model:
//!
//! - `chanreg`: Defines the main `ChanRegNet` model, which couples the Xception backbone
//!   with the classification head.
//! - `classifier`: The global-pooling classification head.
//!
//! The components are re-exported for easy access from the parent `models` module.

pub mod chanreg;
pub mod classifier;

pub use chanreg::*;
pub use classifier::*;
