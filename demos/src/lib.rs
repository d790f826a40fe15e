//! ChanReg programs
//!
//! Command-line tools around the ChanReg model.
//!
//! ## Available Programs
//!
//! - `summary`: Print the backbone layout, parameter count and feature shapes
//! - `bench`: Time forward passes on a synthetic input
//! - `export`: Save freshly initialized weights and the matching configuration
//!
//! ## Usage
//!
//! ```bash
//! # Inspect the Xception-41 layout for 513x513 inputs
//! cargo run --bin summary -- --variant xception41 --height 513 --width 513
//!
//! # Benchmark on the GPU
//! cargo run --release --features wgpu --bin bench -- --iterations 20
//!
//! # Export weights and verify they reload
//! cargo run --bin export -- artifacts/chanreg --check
//! ```

pub mod common;
pub mod config;

// Re-export commonly used items
pub use common::{
    create_device, get_backend_name, init_tracing, log_backend, SelectedBackend, SelectedDevice,
};
pub use config::{
    load_model_config, parse_variant, save_model_config, BenchConfig, ExportConfig, ModelArgs,
    ModelSource, SummaryConfig,
};
