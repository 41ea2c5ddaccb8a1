//! Compare - Graph Output Comparison Command
//!
//! @version 0.1.0
//! @author Tessera Development Team

use colored::Colorize;
use tessera::{compare_models, random_batch, Comparison};
use tessera_graph::GraphLoader;

use super::utils::{print_header, print_json, print_kv, spinner};
use crate::cli::CompareArgs;
use crate::error::{CliError, CliResult};

/// Relative error above which the comparison is flagged.
const RELATIVE_L2_WARNING: f32 = 0.1;

/// Execute the `compare` command
pub fn execute(args: CompareArgs) -> CliResult<()> {
    if args.batch_size == 0 {
        return Err(CliError::InvalidArgument("batch size must be at least 1".to_string()));
    }
    let original = GraphLoader::load(&args.original)?.into_model();
    let candidate = GraphLoader::load(&args.quantized)?.into_model();

    let input = original
        .graph
        .input
        .first()
        .ok_or_else(|| CliError::InvalidArgument("original graph declares no input".to_string()))?;
    let batch = random_batch(&input.shape, args.batch_size, args.seed)?;

    let pb = spinner("Running both graphs...", args.json);
    let comparison = compare_models(&original, &candidate, &batch);
    pb.finish_and_clear();
    let comparison = comparison?;

    if args.json {
        print_json(&comparison)
    } else {
        output_text(&args, &comparison);
        Ok(())
    }
}

fn output_text(args: &CompareArgs, cmp: &Comparison) {
    print_header("Output Comparison");
    print_kv("Original", &args.original.display().to_string());
    print_kv("Candidate", &args.quantized.display().to_string());
    print_kv("Batch", &format!("{} (seed {})", cmp.batch_size, args.seed));
    print_kv("Output shape", &format!("{:?}", cmp.output_shape));
    print_kv("Max abs diff", &format!("{:.6}", cmp.max_abs_diff));
    let rel = format!("{:.6}", cmp.relative_l2);
    let rel = if cmp.relative_l2 < RELATIVE_L2_WARNING {
        rel.green()
    } else {
        rel.red()
    };
    print_kv("Relative L2", &rel.to_string());
}
