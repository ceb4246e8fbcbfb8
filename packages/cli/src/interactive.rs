#![allow(clippy::module_name_repetitions)]

//! Interactive menu for the change database toolchain.
//!
//! Prompts with `dialoguer` for the tool and its parameters, then runs the
//! same code as the matching subcommand.

use std::path::PathBuf;

use changedb_cli_utils::MultiProgress;
use changedb_enrich::attributes::{DEFAULT_CELL_SIZE, DEFAULT_ZONE_FIELD};
use dialoguer::{Confirm, Input, Select};

use crate::commands::{self, ExportArgs, JoinLabelsArgs, RunArgs, SelectArgs};

/// Top-level tools of the interactive menu.
enum Tool {
    Run,
    SelectPatches,
    JoinLabels,
    Export,
}

impl Tool {
    const ALL: &[Self] = &[Self::Run, Self::SelectPatches, Self::JoinLabels, Self::Export];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Add attributes and build the change database",
            Self::SelectPatches => "Re-attribute selected patches and export CSV",
            Self::JoinLabels => "Join curated labels to patches",
            Self::Export => "Export change databases (CSV / GEE)",
        }
    }
}

/// Where a yearly run starts.
enum StartMode {
    Fresh,
    Interrupted,
    FromYear,
}

impl StartMode {
    const ALL: &[Self] = &[Self::Fresh, Self::Interrupted, Self::FromYear];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Fresh => "New run",
            Self::Interrupted => "Resume an interrupted run",
            Self::FromYear => "Re-run from a given year",
        }
    }
}

/// Prompts for a tool and runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected tool fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Change Database Toolchain");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::Run => commands::run(multi, &prompt_run()?),
        Tool::SelectPatches => commands::select_patches(multi, &prompt_select()?),
        Tool::JoinLabels => commands::join_labels(&prompt_join_labels()?),
        Tool::Export => commands::export(&prompt_export()?),
    }
}

fn prompt_run() -> Result<RunArgs, Box<dyn std::error::Error>> {
    let inputs = prompt_path("Folder of change_YYYY patch files")?;
    let park = prompt_path("Park reference data folder")?;
    let out = prompt_path("Run folder for the change database")?;
    let mmu: u32 = Input::new()
        .with_prompt("Minimum mapping unit (30 m pixels)")
        .interact_text()?;
    let zone_field = prompt_zone_field()?;
    let cell_size = prompt_cell_size()?;
    let clip = Confirm::new()
        .with_prompt("Clip patches to the study area?")
        .default(false)
        .interact()?;
    let events = Confirm::new()
        .with_prompt("Add event fields and label masked patches?")
        .default(true)
        .interact()?;

    let labels: Vec<&str> = StartMode::ALL.iter().map(StartMode::label).collect();
    let mode = Select::new()
        .with_prompt("Start")
        .items(&labels)
        .default(0)
        .interact()?;
    let (resume, resume_year) = match StartMode::ALL[mode] {
        StartMode::Fresh => (false, None),
        StartMode::Interrupted => (true, None),
        StartMode::FromYear => {
            let year: i32 = Input::new().with_prompt("Year to re-run from").interact_text()?;
            (false, Some(year))
        }
    };

    Ok(RunArgs {
        inputs,
        park,
        out,
        mmu,
        zone_field,
        cell_size,
        clip,
        events,
        resume,
        resume_year,
    })
}

fn prompt_select() -> Result<SelectArgs, Box<dyn std::error::Error>> {
    let run = prompt_path("Run folder")?;
    let dataset: String = Input::new()
        .with_prompt("Change database name (e.g. OLYM_changeDB_1990_2020)")
        .interact_text()?;
    let patches: String = Input::new()
        .with_prompt("PatchNames to re-attribute (comma-separated)")
        .interact_text()?;
    let park = prompt_path("Park reference data folder")?;
    let mmu: u32 = Input::new()
        .with_prompt("Minimum mapping unit (30 m pixels)")
        .interact_text()?;
    let zone_field = prompt_zone_field()?;
    let cell_size = prompt_cell_size()?;
    let change_types = prompt_optional_path("Valid change types CSV (empty to skip)")?;
    let output = prompt_path("Output CSV")?;

    Ok(SelectArgs {
        run,
        dataset,
        patches: patches.split(',').map(|s| s.trim().to_owned()).collect(),
        park,
        mmu,
        zone_field,
        cell_size,
        change_types,
        output,
    })
}

fn prompt_join_labels() -> Result<JoinLabelsArgs, Box<dyn std::error::Error>> {
    let run = prompt_path("Run folder")?;
    let dataset: String = Input::new()
        .with_prompt("Change database name")
        .interact_text()?;
    let labels = prompt_path("Curated labels CSV")?;
    let backup = Confirm::new()
        .with_prompt("Back up the change database first?")
        .default(true)
        .interact()?;

    Ok(JoinLabelsArgs {
        run,
        dataset,
        labels,
        no_backup: !backup,
    })
}

fn prompt_export() -> Result<ExportArgs, Box<dyn std::error::Error>> {
    let run = prompt_path("Run folder")?;
    let datasets: String = Input::new()
        .with_prompt("Change databases to export (comma-separated, empty for all)")
        .allow_empty(true)
        .interact_text()?;
    let csv_dir = prompt_optional_path("CSV output folder (empty to skip)")?;
    let gee_dir = prompt_optional_path("GEE output folder (empty to skip)")?;
    let change_types = prompt_optional_path("Valid change types CSV (empty to skip)")?;

    Ok(ExportArgs {
        run,
        datasets: datasets
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        csv_dir,
        gee_dir,
        change_types,
    })
}

fn prompt_zone_field() -> Result<String, Box<dyn std::error::Error>> {
    Ok(Input::new()
        .with_prompt("Zone field")
        .default(DEFAULT_ZONE_FIELD.to_string())
        .interact_text()?)
}

fn prompt_cell_size() -> Result<f64, Box<dyn std::error::Error>> {
    Ok(Input::new()
        .with_prompt("Processing cell size (m)")
        .default(DEFAULT_CELL_SIZE)
        .interact_text()?)
}

fn prompt_path(prompt: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let input: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(PathBuf::from(input.trim()))
}

fn prompt_optional_path(prompt: &str) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    if input.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(input.trim())))
    }
}
