//! The tools of the change database toolchain, shared by the subcommands
//! and the interactive menu.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use changedb_cli_utils::{IndicatifProgress, MultiProgress};
use changedb_enrich::attributes::{DEFAULT_CELL_SIZE, DEFAULT_ZONE_FIELD};
use changedb_enrich::events::join_labels_to_patches;
use changedb_enrich::select::reattribute_selected;
use changedb_enrich::{AttributeOptions, ParkConfig, ParkLayers, Resume, RunOptions};
use changedb_export::{BatchTargets, export_csv, export_run};
use changedb_lookup::CsvLookup;
use changedb_store::Workspace;
use clap::Args;

/// Parameters of a yearly run.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory holding the `change_YYYY` patch files
    #[arg(long)]
    pub inputs: PathBuf,
    /// Park directory with reference layers (and optionally `park.toml`)
    #[arg(long)]
    pub park: PathBuf,
    /// Run directory receiving the cumulative dataset
    #[arg(long)]
    pub out: PathBuf,
    /// Minimum mapping unit in 30 m pixels
    #[arg(long)]
    pub mmu: u32,
    /// Column holding the within-year patch id
    #[arg(long, default_value = DEFAULT_ZONE_FIELD)]
    pub zone_field: String,
    /// Cell size of zonal geometry, in meters
    #[arg(long, default_value_t = DEFAULT_CELL_SIZE)]
    pub cell_size: f64,
    /// Clip patches to the park's study area first
    #[arg(long)]
    pub clip: bool,
    /// Add event fields and label patches in the mask
    #[arg(long)]
    pub events: bool,
    /// Continue an interrupted run
    #[arg(long, conflicts_with = "resume_year")]
    pub resume: bool,
    /// Re-run starting at this input year
    #[arg(long)]
    pub resume_year: Option<i32>,
}

impl RunArgs {
    const fn resume(&self) -> Resume {
        match (self.resume, self.resume_year) {
            (_, Some(year)) => Resume::FromYear(year),
            (true, None) => Resume::Interrupted,
            (false, None) => Resume::Fresh,
        }
    }

    fn attribute_options(&self) -> AttributeOptions {
        AttributeOptions {
            zone_field: self.zone_field.clone(),
            cell_size: self.cell_size,
            clip: self.clip,
            mmu: self.mmu,
        }
    }
}

/// Parameters of re-attributing selected patches.
#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    /// Run directory holding the finalised dataset
    #[arg(long)]
    pub run: PathBuf,
    /// Finalised dataset name (e.g. `OLYM_changeDB_1990_2020`)
    #[arg(long)]
    pub dataset: String,
    /// Comma-separated `PatchName`s to re-attribute
    #[arg(long, value_delimiter = ',', required = true)]
    pub patches: Vec<String>,
    /// Park directory with reference layers
    #[arg(long)]
    pub park: PathBuf,
    /// Minimum mapping unit in 30 m pixels
    #[arg(long)]
    pub mmu: u32,
    /// Column holding the within-year patch id
    #[arg(long, default_value = DEFAULT_ZONE_FIELD)]
    pub zone_field: String,
    /// Cell size of zonal geometry, in meters
    #[arg(long, default_value_t = DEFAULT_CELL_SIZE)]
    pub cell_size: f64,
    /// CSV of valid change types (`ChangeType` column)
    #[arg(long)]
    pub change_types: Option<PathBuf>,
    /// CSV receiving the re-attributed patches (`.csv` is appended if missing)
    #[arg(long)]
    pub output: PathBuf,
}

/// Parameters of joining curated labels.
#[derive(Args, Debug, Clone)]
pub struct JoinLabelsArgs {
    /// Run directory holding the finalised dataset
    #[arg(long)]
    pub run: PathBuf,
    /// Finalised dataset name
    #[arg(long)]
    pub dataset: String,
    /// CSV of curated labels keyed by `PatchName`
    #[arg(long)]
    pub labels: PathBuf,
    /// Skip the dated backup copy
    #[arg(long)]
    pub no_backup: bool,
}

/// Parameters of a batch export.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Run directory holding the finalised datasets
    #[arg(long)]
    pub run: PathBuf,
    /// Comma-separated dataset names (default: every finalised dataset)
    #[arg(long, value_delimiter = ',')]
    pub datasets: Vec<String>,
    /// Folder receiving CSVs (a `{PARK}` subfolder is used when present)
    #[arg(long)]
    pub csv_dir: Option<PathBuf>,
    /// Folder receiving GEE shapefile folders
    #[arg(long)]
    pub gee_dir: Option<PathBuf>,
    /// CSV of valid change types (`ChangeType` column)
    #[arg(long)]
    pub change_types: Option<PathBuf>,
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn load_park(dir: &Path, clip: bool) -> Result<ParkLayers, Box<dyn std::error::Error>> {
    let config = ParkConfig::load(dir)?;
    Ok(ParkLayers::load(config, clip)?)
}

/// Enriches every yearly input and finalises the cumulative dataset.
///
/// # Errors
///
/// Returns an error if the park or workspace cannot be opened or the run
/// fails.
pub fn run(multi: &MultiProgress, args: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let park = load_park(&args.park, args.clip)?;
    let workspace = Workspace::open(&args.out)?;
    let options = RunOptions {
        inputs_dir: args.inputs.clone(),
        attributes: args.attribute_options(),
        events: args.events,
        resume: args.resume(),
        processing_date: today(),
    };

    let progress = IndicatifProgress::run_progress(multi);
    let summary = changedb_enrich::run(&workspace, &park, &options, &progress)?;

    if summary.centroid_fallbacks > 0 {
        log::warn!(
            "{} patch(es) use centroid coordinates",
            summary.centroid_fallbacks
        );
    }
    log::info!(
        "Wrote {} with {} patches ({} year(s) processed) in {:.1}s",
        summary.dataset_name,
        summary.patches,
        summary.years.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Re-derives the attributes of selected patches and exports them to CSV.
///
/// # Errors
///
/// Returns an error if re-attribution fails or the selection does not
/// pass export validation.
pub fn select_patches(
    multi: &MultiProgress,
    args: &SelectArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let park = load_park(&args.park, false)?;
    let workspace = Workspace::open(&args.run)?;
    let names: BTreeSet<String> = args
        .patches
        .iter()
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .collect();
    let options = AttributeOptions {
        zone_field: args.zone_field.clone(),
        cell_size: args.cell_size,
        clip: false,
        mmu: args.mmu,
    };

    let stages = IndicatifProgress::stages_bar(multi, "Re-attributing selected patches");
    let selection =
        reattribute_selected(&workspace, &args.dataset, &names, &park, &options, &stages)?;
    stages.finish_and_clear();

    let lookup = CsvLookup::new(args.change_types.clone(), None);
    let path = export_csv(&selection, &lookup, &args.output)?;
    log::info!(
        "Re-attributed {} patch(es) of {}; CSV written to {}",
        selection.len(),
        args.dataset,
        path.display()
    );
    Ok(())
}

/// Overwrites the label fields of a finalised dataset from the curated
/// label table.
///
/// # Errors
///
/// Returns an error if the labels or dataset cannot be read or written.
pub fn join_labels(args: &JoinLabelsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = Workspace::open(&args.run)?;
    let lookup = CsvLookup::new(None, Some(args.labels.clone()));
    let backup_date = (!args.no_backup).then(today);
    let summary = join_labels_to_patches(&workspace, &args.dataset, &lookup, backup_date)?;
    if let Some(backup) = &summary.backup {
        log::info!("Backed up {} as {backup}", args.dataset);
    }
    log::info!(
        "Labeled {} patch(es) of {}, {} without a label",
        summary.matched,
        args.dataset,
        summary.unmatched
    );
    Ok(())
}

/// Exports finalised datasets to CSV and/or GEE shapefiles.
///
/// # Errors
///
/// Returns an error if no target is given or any dataset was not exported.
pub fn export(args: &ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = Workspace::open(&args.run)?;
    let lookup = CsvLookup::new(args.change_types.clone(), None);
    let targets = BatchTargets {
        csv_dir: args.csv_dir.clone(),
        gee_dir: args.gee_dir.clone(),
    };
    let summary = export_run(&workspace, &args.datasets, &lookup, &targets)?;
    for path in &summary.written {
        println!("{}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(extra: &[&str]) -> RunArgs {
        let mut argv = vec![
            "changedb", "--inputs", "in", "--park", "OLYM", "--out", "run", "--mmu", "11",
        ];
        argv.extend_from_slice(extra);
        Harness::try_parse_from(argv).unwrap().run
    }

    #[test]
    fn run_defaults() {
        let args = parse(&[]);
        assert_eq!(args.resume(), Resume::Fresh);
        let options = args.attribute_options();
        assert_eq!(options, AttributeOptions::new(11));
    }

    #[test]
    fn resume_flags() {
        assert_eq!(parse(&["--resume"]).resume(), Resume::Interrupted);
        assert_eq!(
            parse(&["--resume-year", "2005"]).resume(),
            Resume::FromYear(2005)
        );
        let argv = [
            "changedb", "--inputs", "in", "--park", "OLYM", "--out", "run", "--mmu", "11",
            "--resume", "--resume-year", "2005",
        ];
        assert!(Harness::try_parse_from(argv).is_err());
    }
}
