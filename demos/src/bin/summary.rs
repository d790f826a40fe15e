//! ChanReg model summary
//!
//! Prints the stage layout of the configured backbone, the spatial size and channels of
//! every stage for a given input size, and optionally the parameter count of the built
//! model.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin summary -- --variant xception41 --height 513 --width 513
//! cargo run --bin summary -- --config model.json --print-model
//! ```

use anyhow::Result;
use burn::module::Module;
use chanreg_burn::{
    xception::{halve, STEM_CHANNELS},
    ChanRegNetConfig,
};
use chanreg_demos::{
    create_device, init_tracing, log_backend, ModelArgs, SelectedBackend, SummaryConfig,
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    model: ModelArgs,

    /// Input height
    #[arg(long, default_value = "512")]
    height: usize,

    /// Input width
    #[arg(long, default_value = "512")]
    width: usize,

    /// Skip building the model (no parameter count)
    #[arg(long)]
    no_build: bool,

    /// Print the full module tree
    #[arg(long)]
    print_model: bool,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let config = SummaryConfig {
        model: args.model.source()?.resolve()?,
        height: args.height,
        width: args.width,
        build: !args.no_build,
    };

    print_layout(&config);

    if config.build {
        let device = create_device();
        log_backend("summary", &device);
        let model = ChanRegNetConfig::new(config.model.clone()).init::<SelectedBackend>(&device)?;

        if args.print_model {
            println!("{model}");
        }
        println!("Parameters: {}", model.num_params());
    }

    Ok(())
}

fn print_layout(config: &SummaryConfig) {
    let model = &config.model;
    let backbone = &model.backbone;
    let (features, low_level) = model.feature_shapes(1, config.height, config.width);

    println!(
        "Xception backbone: {} middle blocks, output stride {}, low-level stride {}",
        backbone.layers,
        backbone.output_stride(),
        backbone.low_level_stride()
    );
    println!(
        "Input: [1, {}, {}, {}]",
        model.in_channels(),
        config.height,
        config.width
    );
    println!();
    println!("{:<16} {:>8} {:>8} {:>8}", "stage", "channels", "height", "width");

    let row = |name: &str, channels: usize, halvings: usize| {
        println!(
            "{:<16} {:>8} {:>8} {:>8}",
            name,
            channels,
            halve(config.height, halvings),
            halve(config.width, halvings)
        );
    };

    row("stem", STEM_CHANNELS, 2);
    for (idx, [_, out]) in backbone.entry_block_channels.iter().enumerate() {
        row(&format!("entry block {idx}"), *out, 3 + idx);
    }

    let entry_halvings = 2 + backbone.entry_block_channels.len();
    row("middle flow", backbone.middle_channels(), entry_halvings);
    row("exit block", backbone.exit_block_channels, entry_halvings + 1);
    row("exit conv 1", backbone.exit1_channels, entry_halvings + 1);
    row("exit conv 2", backbone.exit1_channels, entry_halvings + 1);
    row("exit conv 3", backbone.out_channels, entry_halvings + 1);

    println!();
    println!("Features:  {features:?}");
    println!("Low-level: {low_level:?}");
    println!("Classes:   {}", model.head.num_classes);
}
