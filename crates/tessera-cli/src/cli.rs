//! CLI - Command Line Interface Definitions
//!
//! Defines the CLI structure using clap derive macros.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Tessera - export vision encoders to graphs and quantize their weights
#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    author = "Tessera Development Team",
    version,
    about = "Export vision encoders to portable graphs and quantize their weights",
    long_about = "Tessera traces a vision encoder into a computation graph with a dynamic batch \
                  dimension, then rewrites the graph's float weights into 8-bit integers.\n\n\
                  Settings are read from tessera.toml when present; flags override file values."
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./tessera.toml when it exists)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trace the vision tower and write the float graph artifact
    Export(ExportArgs),

    /// Quantize the weights of an exported graph artifact
    Quantize(QuantizeArgs),

    /// Export, then quantize
    Pipeline(PipelineArgs),

    /// Show the contents of a graph artifact
    Inspect(InspectArgs),

    /// Run two graphs on the same random batch and report their drift
    Compare(CompareArgs),
}

// =============================================================================
// Shared Options
// =============================================================================

/// Model and sample options shared by `export` and `pipeline`.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelOptions {
    /// Image path or http(s) URL used as the trace sample
    #[arg(long, value_name = "SRC", conflicts_with = "synthetic")]
    pub image: Option<String>,

    /// Use a seeded synthetic image instead of loading one
    #[arg(long)]
    pub synthetic: bool,

    /// Vision tower preset (tiny, clip-vit-base-patch32, clip-vit-large-patch14)
    #[arg(long)]
    pub preset: Option<String>,

    /// Seed for parameter initialization and synthetic samples
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sample precision (f32, f16)
    #[arg(long)]
    pub precision: Option<String>,

    /// Skip verifying the trace against eager execution
    #[arg(long)]
    pub no_check: bool,
}

/// Quantization options shared by `quantize` and `pipeline`.
#[derive(Args, Debug, Clone, Default)]
pub struct QuantOptions {
    /// One scale and zero point per output channel
    #[arg(long)]
    pub per_channel: bool,

    /// Use the 7-bit reduced range
    #[arg(long)]
    pub reduce_range: bool,

    /// Fit zero points to each weight's range
    #[arg(long)]
    pub asymmetric: bool,

    /// Integer encoding (int8, uint8)
    #[arg(long, value_name = "TYPE")]
    pub weight_type: Option<String>,

    /// Rewrite format (operator, qdq)
    #[arg(long)]
    pub format: Option<String>,

    /// Comma-separated operator allow-list (MatMul,Gemm,Conv,Gather)
    #[arg(long, value_name = "OPS")]
    pub op_types: Option<String>,

    /// Node names never rewritten
    #[arg(long = "exclude", value_name = "NODE")]
    pub exclude: Vec<String>,
}

// =============================================================================
// Export Command
// =============================================================================

/// Arguments for the `export` command
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub model: ModelOptions,

    /// Artifact name (written as <NAME>.graph)
    #[arg(long, value_name = "NAME")]
    pub model_name: Option<String>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

// =============================================================================
// Quantize Command
// =============================================================================

/// Arguments for the `quantize` command
#[derive(Args, Debug)]
pub struct QuantizeArgs {
    #[command(flatten)]
    pub quant: QuantOptions,

    /// Name of the float artifact to read
    #[arg(long, value_name = "NAME")]
    pub original: Option<String>,

    /// Name of the quantized artifact to write
    #[arg(long, value_name = "NAME")]
    pub model_name: Option<String>,

    /// Directory holding both artifacts
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

// =============================================================================
// Pipeline Command
// =============================================================================

/// Arguments for the `pipeline` command
#[derive(Args, Debug)]
pub struct PipelineArgs {
    #[command(flatten)]
    pub model: ModelOptions,

    #[command(flatten)]
    pub quant: QuantOptions,

    /// Name of the float artifact
    #[arg(long, value_name = "NAME")]
    pub original: Option<String>,

    /// Name of the quantized artifact
    #[arg(long, value_name = "NAME")]
    pub model_name: Option<String>,

    /// Directory both artifacts are written to
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

// =============================================================================
// Inspect Command
// =============================================================================

/// Arguments for the `inspect` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Graph artifact to inspect
    pub file: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

// =============================================================================
// Compare Command
// =============================================================================

/// Arguments for the `compare` command
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Reference graph artifact
    pub original: PathBuf,

    /// Graph artifact to compare against the reference
    pub quantized: PathBuf,

    /// Number of inputs in the random batch
    #[arg(short, long, default_value = "4")]
    pub batch_size: usize,

    /// Seed for the random batch
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Print the comparison as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_quantize_flags() {
        let cli = Cli::parse_from([
            "tessera",
            "-v",
            "quantize",
            "--per-channel",
            "--weight-type",
            "uint8",
            "--exclude",
            "a",
            "--exclude",
            "b",
            "--dir",
            "out",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Quantize(args) => {
                assert!(args.quant.per_channel);
                assert_eq!(args.quant.weight_type.as_deref(), Some("uint8"));
                assert_eq!(args.quant.exclude, vec!["a", "b"]);
                assert_eq!(args.dir, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_image_conflicts_with_synthetic() {
        let res = Cli::try_parse_from(["tessera", "export", "--image", "a.png", "--synthetic"]);
        assert!(res.is_err());
    }
}
