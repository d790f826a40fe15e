//! Configuration for the ChanReg programs.
//!
//! Every program reads an optional JSON file holding a [`ModelConfig`]; command-line flags
//! then override the backbone variant and the number of classes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chanreg_burn::{BackboneVariant, ModelConfig};
use serde::{Deserialize, Serialize};

/// Command-line flags shared by every program to pick the model.
#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// JSON file with a serialized model configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backbone layout (xception41 or xception65)
    #[arg(long)]
    pub variant: Option<String>,

    /// Number of output classes
    #[arg(long)]
    pub num_classes: Option<usize>,
}

impl ModelArgs {
    /// Turns the flags into a [`ModelSource`].
    ///
    /// # Errors
    ///
    /// Returns an error if the variant name is unknown.
    pub fn source(&self) -> Result<ModelSource> {
        Ok(ModelSource {
            config_path: self.config.clone(),
            variant: self.variant.as_deref().map(parse_variant).transpose()?,
            num_classes: self.num_classes,
        })
    }
}

/// Where the model configuration comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSource {
    /// JSON file with a serialized `ModelConfig`.
    pub config_path: Option<PathBuf>,
    /// Backbone layout replacing the one in the file.
    pub variant: Option<BackboneVariant>,
    /// Number of classes replacing the one in the file.
    pub num_classes: Option<usize>,
}

impl ModelSource {
    /// Resolves the final model configuration and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the resulting
    /// configuration is invalid.
    pub fn resolve(&self) -> Result<ModelConfig> {
        let mut config = match &self.config_path {
            Some(path) => load_model_config(path)?,
            None => ModelConfig::new(),
        };

        if let Some(variant) = &self.variant {
            config.backbone = variant
                .backbone_config()
                .with_initialization(config.backbone.initialization);
        }
        if let Some(num_classes) = self.num_classes {
            config.head.num_classes = num_classes;
        }

        config.validate().context("Model configuration is invalid")?;
        Ok(config)
    }
}

/// Configuration for the summary program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Model configuration.
    pub model: ModelConfig,
    /// Input height used for the shape table.
    pub height: usize,
    /// Input width used for the shape table.
    pub width: usize,
    /// Whether to instantiate the model to count parameters.
    pub build: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::new(),
            height: 512,
            width: 512,
            build: true,
        }
    }
}

/// Configuration for the forward benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Model configuration.
    pub model: ModelConfig,
    /// Batch size of the synthetic input.
    pub batch_size: usize,
    /// Input height.
    pub height: usize,
    /// Input width.
    pub width: usize,
    /// Untimed iterations run first.
    pub warmup: usize,
    /// Timed iterations.
    pub iterations: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::new(),
            batch_size: 1,
            height: 224,
            width: 224,
            warmup: 2,
            iterations: 10,
        }
    }
}

/// Configuration for the weight export program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Model configuration.
    pub model: ModelConfig,
    /// Output path of the record, without extension.
    pub output: PathBuf,
    /// Reload the written record and compare one forward pass.
    pub check: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::new(),
            output: PathBuf::from("artifacts/chanreg"),
            check: false,
        }
    }
}

/// Reads a `ModelConfig` from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not hold a valid configuration.
pub fn load_model_config(path: &Path) -> Result<ModelConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Writes a `ModelConfig` as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file or its directory cannot be written.
pub fn save_model_config(config: &ModelConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

/// Parses a backbone name given on the command line.
///
/// # Errors
///
/// Returns an error for names other than `xception41` and `xception65`.
pub fn parse_variant(name: &str) -> Result<BackboneVariant> {
    match name.to_ascii_lowercase().as_str() {
        "xception41" | "41" => Ok(BackboneVariant::Xception41),
        "xception65" | "65" => Ok(BackboneVariant::Xception65),
        other => {
            anyhow::bail!("Unknown backbone variant '{other}', expected xception41 or xception65")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_variant_accepts_known_names() {
        assert_eq!(
            parse_variant("Xception41").unwrap(),
            BackboneVariant::Xception41
        );
        assert_eq!(parse_variant("65").unwrap(), BackboneVariant::Xception65);
        assert!(parse_variant("resnet50").is_err());
    }

    #[test]
    fn resolve_applies_overrides() {
        let source = ModelSource {
            config_path: None,
            variant: Some(BackboneVariant::Xception41),
            num_classes: Some(5),
        };
        let config = source.resolve().unwrap();
        assert_eq!(config.backbone.layers, 8);
        assert_eq!(config.head.num_classes, 5);
    }

    #[test]
    fn resolve_rejects_zero_classes() {
        let source = ModelSource {
            num_classes: Some(0),
            ..Default::default()
        };
        assert!(source.resolve().is_err());
    }

    #[test]
    fn model_config_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("chanreg-config-{}", std::process::id()));
        let path = dir.join("model.json");
        let config = ModelConfig::from_variant(&BackboneVariant::Xception41);

        save_model_config(&config, &path).unwrap();
        let loaded = load_model_config(&path).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(loaded.backbone.layers, 8);
        assert_eq!(loaded.head.num_classes, config.head.num_classes);
    }
}
