//! ChanReg weight export
//!
//! Initializes the model from a configuration, writes its record next to the JSON
//! configuration that rebuilds it, and optionally reloads the record to confirm both
//! copies produce the same output.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin export -- artifacts/chanreg --variant xception41 --num-classes 2
//! cargo run --bin export -- artifacts/chanreg --check
//! ```

use std::path::PathBuf;

use anyhow::Result;
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use chanreg_burn::{ChanRegNet, ChanRegNetConfig};
use chanreg_demos::{
    create_device, get_backend_name, init_tracing, log_backend, save_model_config, ExportConfig,
    ModelArgs, SelectedBackend, SelectedDevice,
};
use clap::Parser;

/// Spatial size of the input used by `--check`.
const CHECK_SIZE: usize = 64;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output path of the record (without extension)
    output: PathBuf,

    #[command(flatten)]
    model: ModelArgs,

    /// Use the variance-scaled weight initialization
    #[arg(long)]
    initialization: bool,

    /// Reload the written weights and compare one forward pass
    #[arg(long)]
    check: bool,

    /// Overwrite existing files
    #[arg(short, long)]
    force: bool,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let mut model_config = args.model.source()?.resolve()?;
    if args.initialization {
        model_config.backbone.initialization = true;
    }
    let config = ExportConfig {
        model: model_config,
        output: args.output,
        check: args.check,
    };

    let record_path = config.output.with_extension("mpk");
    let config_path = config.output.with_extension("json");
    if !args.force && (record_path.exists() || config_path.exists()) {
        anyhow::bail!(
            "Output already exists: {}. Use --force to overwrite.",
            config.output.display()
        );
    }

    let device = create_device();
    println!("Using backend: {}", get_backend_name());
    log_backend("export", &device);

    let model = ChanRegNetConfig::new(config.model.clone()).init::<SelectedBackend>(&device)?;

    save_model_config(&config.model, &config_path)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(config.output.clone(), &recorder)
        .map_err(|e| {
            anyhow::anyhow!("Failed to save model to {}: {e}", record_path.display())
        })?;
    println!("Model saved to: {}", record_path.display());
    println!("Config saved to: {}", config_path.display());

    if config.check {
        check_export(&config, &model, &device)?;
    }

    Ok(())
}

/// Rebuilds the model from the written files and compares its output with `model`.
fn check_export(
    config: &ExportConfig,
    model: &ChanRegNet<SelectedBackend>,
    device: &SelectedDevice,
) -> Result<()> {
    println!("Validating export...");

    let reloaded_config = chanreg_demos::load_model_config(&config.output.with_extension("json"))?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let reloaded = ChanRegNetConfig::new(reloaded_config)
        .init::<SelectedBackend>(device)?
        .load_file(config.output.clone(), &recorder, device)
        .map_err(|e| anyhow::anyhow!("Failed to reload exported model: {e}"))?;

    let input = Tensor::<SelectedBackend, 4>::ones(
        [1, config.model.in_channels(), CHECK_SIZE, CHECK_SIZE],
        device,
    );
    let expected = model.forward_log_probs(input.clone()).into_data();
    let actual = reloaded.forward_log_probs(input).into_data();

    let expected = expected
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read output: {e:?}"))?;
    let actual = actual
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read output: {e:?}"))?;
    let max_diff = expected
        .iter()
        .zip(&actual)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f32, f32::max);

    tracing::info!(max_diff, "reloaded model compared");
    if max_diff > 1e-5 {
        anyhow::bail!("Reloaded model differs from the exported one (max diff {max_diff})");
    }
    println!("Reloaded model matches (max diff {max_diff:e})");

    Ok(())
}
