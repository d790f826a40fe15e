//! Configuration module for ChanReg.
//!
//! This module provides configuration structures and enums for the ChanReg model.
//! It is organized into two main submodules:
//! - `core`: Contains the main configuration structures
//! - `enums`: Contains all enumeration types used in configurations

pub mod core;
pub mod enums;

// Re-export all configuration structures from core
pub use core::{HeadConfig, ModelConfig};

// Re-export all enums from enums
pub use enums::BackboneVariant;
