//! # Feature Map Classifier
//!
//! Global average pooling followed by a linear layer, producing per-class
//! log-probabilities from a backbone feature map.

use burn::{
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::log_softmax,
};

/// Configuration for the `FeatureMapClassifier` module.
#[derive(Config, Debug)]
pub struct FeatureMapClassifierConfig {
    /// Channels of the incoming feature map.
    pub in_activations: usize,
    /// Number of classes.
    pub out_classes: usize,
}

impl FeatureMapClassifierConfig {
    /// Initializes a new `FeatureMapClassifier` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> FeatureMapClassifier<B> {
        FeatureMapClassifier {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            linear: LinearConfig::new(self.in_activations, self.out_classes).init(device),
        }
    }
}

/// Classifies an image from its feature map.
#[derive(Module, Debug)]
pub struct FeatureMapClassifier<B: Backend> {
    pool: AdaptiveAvgPool2d,
    linear: Linear<B>,
}

impl<B: Backend> FeatureMapClassifier<B> {
    /// # Shapes
    /// - input: `[batch_size, in_activations, height, width]`
    /// - output: `[batch_size, out_classes]`, log-probabilities
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);

        log_softmax(self.linear.forward(x), 1)
    }
}
