//! Training functionality for ChanReg.
//!
//! This module implements the TrainStep and ValidStep traits for the ChanReg model,
//! enabling integration with the Burn training framework.

use burn::{
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::models::ChanRegNet;

/// A batch of images with one class index per image.
#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    /// `[batch_size, channels, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch_size]`, class indices
    pub targets: Tensor<B, 1, Int>,
}

/// Negative log-likelihood of `targets` under per-class `log_probs`, averaged over the batch.
///
/// # Shapes
/// - log_probs: `[batch_size, num_classes]`
/// - targets: `[batch_size]`
/// - output: `[1]`
pub fn nll_loss<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let picked = log_probs.gather(1, targets.unsqueeze_dim(1));
    picked.neg().mean()
}

impl<B: Backend> ChanRegNet<B> {
    /// Forward pass with loss, packaged for Burn's classification metrics.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward_log_probs(images);
        let loss = nll_loss(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<ClassificationBatch<B>, ClassificationOutput<B>>
    for ChanRegNet<B>
{
    fn step(&self, batch: ClassificationBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<ClassificationBatch<B>, ClassificationOutput<B>> for ChanRegNet<B> {
    fn step(&self, batch: ClassificationBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChanRegNetConfig, HeadConfig, ModelConfig};
    use burn::backend::{Autodiff, NdArray};
    use xception::XceptionConfig;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn slim_model<B: Backend>(device: &B::Device) -> ChanRegNet<B> {
        let config = ModelConfig::new()
            .with_backbone(
                XceptionConfig::new()
                    .with_layers(1)
                    .with_entry_block_channels(vec![[64, 8], [8, 12]])
                    .with_exit_block_channels(16)
                    .with_exit1_channels(16)
                    .with_out_channels(24),
            )
            .with_head(HeadConfig::new().with_num_classes(4));
        ChanRegNetConfig::new(config)
            .init(device)
            .expect("valid model")
    }

    #[test]
    fn nll_picks_target_log_probability() {
        let device = Default::default();
        let log_probs = Tensor::<TestBackend, 2>::from_floats(
            [[-0.5, -1.0, -2.0], [-3.0, -0.25, -1.5]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([2, 1], &device);

        let loss = nll_loss(log_probs, targets).into_scalar();

        assert!((loss - 1.125).abs() < 1e-6);
    }

    #[test]
    fn valid_step_reports_batch_outputs() {
        let device = Default::default();
        let model = slim_model::<TestBackend>(&device);
        let batch = ClassificationBatch {
            images: Tensor::random(
                [3, 3, 32, 32],
                burn::tensor::Distribution::Normal(0.0, 1.0),
                &device,
            ),
            targets: Tensor::from_ints([0, 3, 1], &device),
        };

        let output = ValidStep::step(&model, batch);

        assert_eq!(output.output.dims(), [3, 4]);
        assert_eq!(output.targets.dims(), [3]);
        assert!(output.loss.into_scalar() > 0.0);
    }

    #[test]
    fn train_step_produces_gradients() {
        let device = Default::default();
        let model = slim_model::<TestAutodiffBackend>(&device);
        let batch = ClassificationBatch {
            images: Tensor::random(
                [2, 3, 32, 32],
                burn::tensor::Distribution::Normal(0.0, 1.0),
                &device,
            ),
            targets: Tensor::from_ints([1, 2], &device),
        };

        let output = TrainStep::step(&model, batch);

        assert!(!output.grads.is_empty());
        assert!(output.item.loss.into_scalar().is_finite());
    }
}
