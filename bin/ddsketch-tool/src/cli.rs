use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Inspect, query, and merge serialized quantile sketches.
///
/// Sketches are read as raw bytes from the given files. A path of `-` reads from standard input.
#[derive(Parser)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output. (Specify twice for more verbosity.)
    #[arg(global = true, short = 'v', long, action = ArgAction::Count, default_value_t = 0)]
    verbose: u8,

    /// Path to a YAML configuration file.
    #[arg(global = true, short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub action: Action,
}

impl Cli {
    /// Gets the configured log level based on the user-supplied verbosity level.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

#[derive(Subcommand)]
pub enum Action {
    /// Print a human-readable description of a sketch.
    Inspect(SingleInput),

    /// Print a sketch as JSON.
    Json(SingleInput),

    /// Estimate the value at a quantile.
    Quantile(QuantileArgs),

    /// Print the mean of all observations.
    Mean(SingleInput),

    /// Print the number of observations.
    Count(SingleInput),

    /// Print the sum of all observations.
    Total(SingleInput),

    /// Check whether sketches decode successfully.
    Validate(MultiInput),

    /// Merge two sketches.
    Merge(MergeArgs),

    /// Merge any number of sketches into one.
    Sum(SumArgs),
}

/// A single sketch input.
#[derive(Args)]
pub struct SingleInput {
    /// Path to the sketch, or `-` for standard input.
    pub input: PathBuf,
}

/// One or more sketch inputs.
#[derive(Args)]
pub struct MultiInput {
    /// Paths to the sketches.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

/// Quantile estimation arguments.
#[derive(Args)]
pub struct QuantileArgs {
    /// Quantile to estimate, nominally between 0 and 1.
    #[arg(allow_negative_numbers = true)]
    pub q: f64,

    /// Path to the sketch, or `-` for standard input.
    pub input: PathBuf,
}

/// Pairwise merge arguments.
#[derive(Args)]
pub struct MergeArgs {
    /// Path to the first sketch. When omitted, the second sketch is passed through.
    #[arg(long, required_unless_present = "right")]
    pub left: Option<PathBuf>,

    /// Path to the second sketch. When omitted, the first sketch is passed through.
    #[arg(long)]
    pub right: Option<PathBuf>,

    /// Where to write the merged sketch. Defaults to standard output.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Aggregate merge arguments.
#[derive(Args)]
pub struct SumArgs {
    /// Paths to the sketches to merge.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Skip inputs that fail to merge instead of aborting.
    #[arg(long)]
    pub skip_invalid: bool,

    /// Where to write the merged sketch. Defaults to standard output.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_quantile() {
        let cli = Cli::try_parse_from(["ddsketch", "quantile", "-0.5", "sketch.bin"]).unwrap();
        match cli.action {
            Action::Quantile(args) => {
                assert_eq!(args.q, -0.5);
                assert_eq!(args.input, PathBuf::from("sketch.bin"));
            }
            _ => panic!("expected quantile action"),
        }
    }

    #[test]
    fn verbosity_maps_to_level() {
        let cli = Cli::try_parse_from(["ddsketch", "-vv", "count", "-"]).unwrap();
        assert_eq!(cli.log_level(), LevelFilter::DEBUG);
    }
}
