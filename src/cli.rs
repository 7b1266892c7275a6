//! Command-line interface for the lowering demo.

use clap::{Parser, Subcommand};
use tessera::PatternFamily;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Legalize a sample lmhlo module to the gpu dialect", long_about = None)]
pub struct Cli {
    /// Print conversion traces to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the sample module
    Sample,
    /// Only run the streamify pre-pass
    Streamify,
    /// Lower the sample module
    Lower {
        /// Families lowered one-to-one into the `gpu` dialect
        #[arg(long, value_enum, value_delimiter = ',')]
        lower: Vec<PatternFamily>,
        /// Skip the streamify pre-pass
        #[arg(long)]
        no_streamify: bool,
        /// Require every operation to be explicitly legal
        #[arg(long)]
        full: bool,
        /// Give up after this many worklist passes
        #[arg(long, default_value_t = 32)]
        max_passes: usize,
        /// Keep unrealized casts instead of folding them
        #[arg(long)]
        keep_casts: bool,
    },
}
