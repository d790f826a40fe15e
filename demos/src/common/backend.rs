//! Compile-time backend for the ChanReg programs.
//!
//! Exactly one backend is active per build: `cuda` wins over `wgpu`, and the CPU
//! `ndarray` backend is used when neither GPU feature is enabled. Every binary builds
//! its model on [`SelectedBackend`] and reports the choice through [`log_backend`].

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        /// Backend the programs run on.
        pub type SelectedBackend = burn::backend::Cuda;
        /// Device of [`SelectedBackend`].
        pub type SelectedDevice = burn::backend::cuda::CudaDevice;
        /// Human-readable backend name.
        pub const BACKEND_NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        pub type SelectedBackend = burn::backend::Wgpu;
        pub type SelectedDevice = burn::backend::wgpu::WgpuDevice;
        pub const BACKEND_NAME: &str = "WGPU (GPU)";
    } else {
        pub type SelectedBackend = burn::backend::NdArray;
        pub type SelectedDevice = burn::backend::ndarray::NdArrayDevice;
        pub const BACKEND_NAME: &str = "NdArray (CPU)";
    }
}

/// Default device of the selected backend.
pub fn create_device() -> SelectedDevice {
    SelectedDevice::default()
}

/// Name of the backend compiled into this build.
pub const fn get_backend_name() -> &'static str {
    BACKEND_NAME
}

/// Logs which backend and device a program is about to use.
pub fn log_backend(program: &str, device: &SelectedDevice) {
    tracing::info!(program, backend = BACKEND_NAME, ?device, "backend selected");
}
