//! Common utilities for the ChanReg programs.
//!
//! This module provides shared functionality used across
//! the different binaries.

pub mod backend;
pub mod logging;

// Re-export commonly used items
pub use backend::{
    create_device, get_backend_name, log_backend, SelectedBackend, SelectedDevice, BACKEND_NAME,
};
pub use logging::init_tracing;
