//! Tessera CLI - Command Line Interface for Tessera
//!
//! The main entry point for the `tessera` command-line tool.
//!
//! # Commands
//! - `tessera export` - Trace the vision tower and write the float graph
//! - `tessera quantize` - Quantize the weights of an exported graph
//! - `tessera pipeline` - Export, then quantize
//! - `tessera inspect` - Show the contents of a graph artifact
//! - `tessera compare` - Compare two graphs on a random batch
//!
//! @version 0.1.0
//! @author Tessera Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use colored::Colorize;

mod cli;
mod commands;
mod config;
mod error;
mod logging;

use cli::{Cli, Commands};
use config::TesseraConfig;
use error::CliResult;

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let config = TesseraConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Export(args) => commands::export::execute(args, &config),
        Commands::Quantize(args) => commands::quantize::execute(args, &config),
        Commands::Pipeline(args) => commands::pipeline::execute(args, &config),
        Commands::Inspect(args) => commands::inspect::execute(args),
        Commands::Compare(args) => commands::compare::execute(args),
    }
}
