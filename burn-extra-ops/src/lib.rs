//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that are commonly used in deep learning but are not
//! yet available in the core Burn framework.

use burn::prelude::*;

mod fixed_padding;

// Convenient re-exports
pub use fixed_padding::{
    effective_kernel_size, fixed_padding, fixed_padding_amounts, FixedPadding,
    FixedPaddingConfig,
};

/// Additional operations for Burn tensors
pub trait TensorExtraOps<B: Backend> {
    /// Zero-pad the spatial axes for a `kernel_size` kernel with `dilation`.
    fn fixed_padding(self, kernel_size: usize, dilation: usize) -> Self;
}

impl<B: Backend> TensorExtraOps<B> for Tensor<B, 4> {
    fn fixed_padding(self, kernel_size: usize, dilation: usize) -> Self {
        fixed_padding(self, kernel_size, dilation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        tensor::Tensor,
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_tensor_extra_ops() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::random(
            [2, 3, 4, 5],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let padded = tensor.clone().fixed_padding(3, 1);
        assert_eq!(padded.dims(), [2, 3, 6, 7]);

        let untouched = tensor.clone().fixed_padding(1, 1);
        assert_eq!(untouched.dims(), tensor.dims());
    }
}
