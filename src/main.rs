//! Tessera CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use tessera::gpu_lowering::{GpuLowering, GpuLoweringOptions, one_to_one_populator, wrap_target};
use tessera::sample::sample_module;
use tessera_ir::IrContext;
use tessera_ir::printer::print_op;
use tessera_ir::rewrite::{ConversionConfig, ConversionMode, RegionWrapper};

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::TRACE)
            .init();
    }

    let mut ctx = IrContext::new();
    let module = sample_module(&mut ctx);

    match cli.command {
        Command::Sample => {}
        Command::Streamify => {
            let summary = RegionWrapper::new(wrap_target()).run(&mut ctx, module);
            eprintln!(
                "wrapped {} operation(s) into {} region(s)",
                summary.wrapped_ops,
                summary.wrappers.len()
            );
        }
        Command::Lower {
            lower,
            no_streamify,
            full,
            max_passes,
            keep_casts,
        } => {
            let options = GpuLoweringOptions {
                streamify: !no_streamify,
                families: lower.clone(),
                mode: if full {
                    ConversionMode::Full
                } else {
                    ConversionMode::Partial
                },
                config: ConversionConfig::new()
                    .with_max_passes(max_passes)
                    .with_reconcile_casts(!keep_casts),
            };
            let mut lowering = GpuLowering::new(options);
            for family in lower {
                lowering.add_populator(family, one_to_one_populator(family));
            }
            match lowering.run(&mut ctx, module) {
                Ok(summary) => eprintln!("{summary:?}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    print!("{}", print_op(&ctx, module));
}
