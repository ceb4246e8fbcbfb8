#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line front end of the change database pipeline.
//!
//! Every tool is a subcommand; running the binary without one opens an
//! interactive menu that prompts for the tool and its parameters.
//!
//! Uses `indicatif-log-bridge` (via [`changedb_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod interactive;

use clap::{Parser, Subcommand};

use crate::commands::{ExportArgs, JoinLabelsArgs, RunArgs, SelectArgs};

#[derive(Parser)]
#[command(name = "changedb", about = "Forest change patch database toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add attributes to every yearly patch file and build the cumulative
    /// database
    Run(RunArgs),
    /// Re-derive the attributes of edited patches and export them to CSV
    SelectPatches(SelectArgs),
    /// Overwrite event labels from the curated label table
    JoinLabels(JoinLabelsArgs),
    /// Validate and export finalised databases to CSV and/or GEE shapefiles
    Export(ExportArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = changedb_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::Run(args) => commands::run(&multi, &args)?,
        Commands::SelectPatches(args) => commands::select_patches(&multi, &args)?,
        Commands::JoinLabels(args) => commands::join_labels(&args)?,
        Commands::Export(args) => commands::export(&args)?,
    }

    Ok(())
}
