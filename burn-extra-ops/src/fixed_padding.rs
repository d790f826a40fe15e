//! # Fixed Padding
//!
//! Padding that depends only on the kernel size and dilation of the convolution that
//! follows it, never on the input size. A dilated kernel covers
//! `k + (k - 1) * (d - 1)` pixels, so padding by that extent minus one keeps a stride-1
//! convolution size-preserving and makes strided convolutions yield `ceil(size / stride)`.
//!
//! For even effective kernels the extra row and column go to the bottom and right.

use burn::prelude::*;

/// Number of input pixels covered by one kernel window along an axis.
pub const fn effective_kernel_size(kernel_size: usize, dilation: usize) -> usize {
    kernel_size + (kernel_size.saturating_sub(1)) * (dilation.saturating_sub(1))
}

/// Returns the `(begin, end)` padding applied to each spatial axis.
pub const fn fixed_padding_amounts(kernel_size: usize, dilation: usize) -> (usize, usize) {
    let pad_total = effective_kernel_size(kernel_size, dilation).saturating_sub(1);
    let pad_begin = pad_total / 2;
    (pad_begin, pad_total - pad_begin)
}

/// Zero-pads the height and width of `x` for a `kernel_size` kernel with `dilation`.
///
/// # Shapes
/// - input: `[batch_size, channels, height, width]`
/// - output: `[batch_size, channels, height + pad, width + pad]`
pub fn fixed_padding<B: Backend>(
    x: Tensor<B, 4>,
    kernel_size: usize,
    dilation: usize,
) -> Tensor<B, 4> {
    let (begin, end) = fixed_padding_amounts(kernel_size, dilation);
    if begin == 0 && end == 0 {
        return x;
    }

    // (left, right, top, bottom)
    x.pad((begin, end, begin, end), 0.0)
}

/// Configuration for the `FixedPadding` module.
#[derive(Config, Debug)]
pub struct FixedPaddingConfig {
    /// Kernel size of the convolution that follows.
    pub kernel_size: usize,
    /// Dilation of the convolution that follows.
    #[config(default = "1")]
    pub dilation: usize,
}

impl FixedPaddingConfig {
    /// Initializes a new `FixedPadding` module.
    pub const fn init<B: Backend>(&self) -> FixedPadding<B> {
        let (begin, end) = fixed_padding_amounts(self.kernel_size, self.dilation);
        FixedPadding {
            begin,
            end,
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Fixed padding as a parameter-free module.
#[derive(Module, Debug)]
pub struct FixedPadding<B: Backend> {
    begin: usize,
    end: usize,
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> FixedPadding<B> {
    /// Padding added before and after each spatial axis.
    pub const fn amounts(&self) -> (usize, usize) {
        (self.begin, self.end)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.begin == 0 && self.end == 0 {
            return x;
        }
        x.pad((self.begin, self.end, self.begin, self.end), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn effective_kernel_grows_with_dilation() {
        assert_eq!(effective_kernel_size(3, 1), 3);
        assert_eq!(effective_kernel_size(3, 2), 5);
        assert_eq!(effective_kernel_size(3, 4), 9);
        assert_eq!(effective_kernel_size(1, 6), 1);
    }

    #[test]
    fn padding_amounts_put_the_odd_pixel_at_the_end() {
        assert_eq!(fixed_padding_amounts(1, 1), (0, 0));
        assert_eq!(fixed_padding_amounts(3, 1), (1, 1));
        assert_eq!(fixed_padding_amounts(3, 2), (2, 2));
        assert_eq!(fixed_padding_amounts(2, 1), (0, 1));
        assert_eq!(fixed_padding_amounts(4, 1), (1, 2));
    }

    #[test]
    fn fixed_padding_pads_spatial_axes_only() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([2, 3, 5, 7], &device);

        let padded = fixed_padding(x, 3, 2);

        assert_eq!(padded.dims(), [2, 3, 9, 11]);
    }

    #[test]
    fn fixed_padding_fills_with_zeros() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &device);

        let padded = fixed_padding(x, 3, 1);

        // 4 ones in the middle of a 4x4 zero frame
        let total = padded.clone().sum().into_scalar();
        assert_eq!(total, 4.0);
        let corner = padded.slice([0..1, 0..1, 0..1, 0..1]).into_scalar();
        assert_eq!(corner, 0.0);
    }

    #[test]
    fn even_kernel_pads_bottom_and_right() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &device);

        let padded = fixed_padding(x, 2, 1);

        assert_eq!(padded.dims(), [1, 1, 3, 3]);
        let top_left = padded.clone().slice([0..1, 0..1, 0..2, 0..2]).sum().into_scalar();
        let last_row = padded.clone().slice([0..1, 0..1, 2..3, 0..3]).sum().into_scalar();
        let last_col = padded.slice([0..1, 0..1, 0..3, 2..3]).sum().into_scalar();
        assert_eq!(top_left, 4.0);
        assert_eq!(last_row, 0.0);
        assert_eq!(last_col, 0.0);
    }

    #[test]
    fn pointwise_kernel_is_left_untouched() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 4, 6, 6], &device);

        let module = FixedPaddingConfig::new(1).init::<TestBackend>();
        assert_eq!(module.amounts(), (0, 0));
        assert_eq!(module.forward(x).dims(), [1, 4, 6, 6]);
    }

    #[test]
    fn module_matches_free_function() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random(
            [1, 2, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let module = FixedPaddingConfig::new(3)
            .with_dilation(2)
            .init::<TestBackend>();
        let a = module.forward(x.clone());
        let b = fixed_padding(x, 3, 2);

        let diff = (a - b).abs().sum().into_scalar();
        assert_eq!(diff, 0.0);
    }
}
