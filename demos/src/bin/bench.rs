//! ChanReg forward benchmark
//!
//! Runs the backbone and classifier on a zero-filled input and reports the mean latency
//! of a forward pass on the selected backend.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin bench -- --height 513 --width 513 --iterations 20
//! cargo run --release --features wgpu --bin bench -- --batch-size 4
//! ```

use std::time::{Duration, Instant};

use anyhow::Result;
use burn::prelude::*;
use chanreg_burn::ChanRegNetConfig;
use chanreg_demos::{
    create_device, get_backend_name, init_tracing, log_backend, BenchConfig, ModelArgs,
    SelectedBackend,
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    model: ModelArgs,

    /// Batch size of the synthetic input
    #[arg(short, long, default_value = "1")]
    batch_size: usize,

    /// Input height
    #[arg(long, default_value = "224")]
    height: usize,

    /// Input width
    #[arg(long, default_value = "224")]
    width: usize,

    /// Untimed iterations
    #[arg(long, default_value = "2")]
    warmup: usize,

    /// Timed iterations
    #[arg(short, long, default_value = "10")]
    iterations: usize,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let config = BenchConfig {
        model: args.model.source()?.resolve()?,
        batch_size: args.batch_size,
        height: args.height,
        width: args.width,
        warmup: args.warmup,
        iterations: args.iterations,
    };
    if config.batch_size == 0 || config.iterations == 0 {
        anyhow::bail!("Batch size and iterations must be positive");
    }

    let device = create_device();
    println!("Using backend: {}", get_backend_name());
    log_backend("bench", &device);

    let model = ChanRegNetConfig::new(config.model.clone()).init::<SelectedBackend>(&device)?;
    let input = Tensor::<SelectedBackend, 4>::zeros(
        [
            config.batch_size,
            config.model.in_channels(),
            config.height,
            config.width,
        ],
        &device,
    );

    for step in 0..config.warmup {
        let log_probs = model.forward_log_probs(input.clone());
        // Reading the result forces asynchronous backends to finish the pass.
        let _ = log_probs.into_data();
        tracing::debug!(step, "warmup iteration done");
    }

    let mut total = Duration::ZERO;
    for step in 0..config.iterations {
        let start = Instant::now();
        let log_probs = model.forward_log_probs(input.clone());
        let _ = log_probs.into_data();
        let elapsed = start.elapsed();
        tracing::debug!(step, elapsed_ms = elapsed.as_secs_f64() * 1e3, "timed iteration");
        total += elapsed;
    }

    let mean = total / u32::try_from(config.iterations)?;
    println!(
        "Input [{}, {}, {}, {}]: {:.2} ms per forward ({} iterations)",
        config.batch_size,
        config.model.in_channels(),
        config.height,
        config.width,
        mean.as_secs_f64() * 1e3,
        config.iterations
    );

    Ok(())
}
