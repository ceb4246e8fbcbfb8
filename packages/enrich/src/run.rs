//! Multi-year run: enrich each yearly dataset, merge it into the cumulative
//! dataset and finalise the result.
//!
//! A run keeps its state in the workspace so it can be resumed:
//!
//! * `changeDB` in the run directory holds every year merged so far.
//! * `scratch/change_YYYY` holds the year being processed and the previous
//!   year, which is the overlap baseline.
//!
//! The previous year's scratch copy is deleted before the current year is
//! appended, so after an interruption the scratch directory holds at most
//! the last merged year and the year after it.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use changedb_patch_models::{ATTRIBUTE_FIELDS, Dataset, EVENT_FIELDS, Field};
use changedb_spatial::PlanarGeometry;
use changedb_store::paths::{CUMULATIVE_NAME, finalized_name, year_of, yearly_name};
use changedb_store::{Location, Workspace, YearlyInput, discover_inputs, read_input};
use chrono::NaiveDate;

use crate::EnrichError;
use crate::attributes::{AttributeOptions, add_attributes};
use crate::events::{add_event_fields, label_mask};
use crate::metrics::{add_paratio, sync_area_perim};
use crate::naming::add_park_patch_name;
use crate::overlap::{OverlapExclusion, flag_overlaps, init_overlap};
use crate::park::ParkLayers;
use crate::progress::{ProgressCallback, null_progress};

/// Where a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resume {
    /// From the first input year, with no cumulative dataset present.
    #[default]
    Fresh,
    /// Continue an interrupted run from the state left in the workspace.
    Interrupted,
    /// Re-run from an input year, using the cumulative dataset's records of
    /// the year before it as the overlap baseline.
    FromYear(i32),
}

/// Parameters of a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory of `change_YYYY` inputs.
    pub inputs_dir: PathBuf,
    /// Attribute derivation parameters.
    pub attributes: AttributeOptions,
    /// Add event fields and label mask patches.
    pub events: bool,
    /// Starting point.
    pub resume: Resume,
    /// Date stamped on automatic labels.
    pub processing_date: NaiveDate,
}

/// Progress handles of a run.
pub struct RunProgress {
    /// One unit per year.
    pub years: Arc<dyn ProgressCallback>,
    /// Attribute stages of the current year.
    pub stages: Arc<dyn ProgressCallback>,
}

impl RunProgress {
    /// Handles that report nothing.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            years: null_progress(),
            stages: null_progress(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Name of the finalised dataset.
    pub dataset_name: String,
    /// Years processed by this invocation.
    pub years: Vec<i32>,
    /// Patches in the finalised dataset.
    pub patches: usize,
    /// Patches whose coordinates fell back to the centroid.
    pub centroid_fallbacks: usize,
}

struct RunState {
    cumulative: Dataset,
    merged: BTreeSet<(i64, i64)>,
    previous: Option<Dataset>,
    pending: Option<Dataset>,
    queue: Vec<YearlyInput>,
    centroid_fallbacks: usize,
}

impl RunState {
    fn new(cumulative: Dataset, zone_field: &str) -> Self {
        let merged = cumulative
            .iter()
            .filter_map(|p| p.yod().zip(p.zone_id(zone_field)))
            .collect();
        Self {
            cumulative,
            merged,
            previous: None,
            pending: None,
            queue: Vec::new(),
            centroid_fallbacks: 0,
        }
    }
}

/// Runs the pipeline over every yearly input and finalises the cumulative
/// dataset as `{park}_changeDB_{start}_{end}`.
///
/// All resume checks happen before anything in the workspace changes.
///
/// # Errors
///
/// Returns [`EnrichError::Config`] if the inputs or the workspace do not
/// allow the requested start, [`EnrichError::DuplicatePatch`] if a year
/// would repeat a `(yod, zone id)` pair, or any error of the stages.
pub fn run(
    workspace: &Workspace,
    park: &ParkLayers,
    options: &RunOptions,
    progress: &RunProgress,
) -> Result<RunSummary, EnrichError> {
    let inputs = discover_inputs(&options.inputs_dir)?;
    if inputs.is_empty() {
        return Err(EnrichError::Config(format!(
            "no change_YYYY inputs in {}",
            options.inputs_dir.display()
        )));
    }
    let zone_field = options.attributes.zone_field.as_str();

    let mut state = match options.resume {
        Resume::Fresh => plan_fresh(workspace, inputs, zone_field)?,
        Resume::Interrupted => plan_interrupted(workspace, inputs, zone_field)?,
        Resume::FromYear(year) => plan_from_year(workspace, inputs, year, zone_field)?,
    };

    let queue = std::mem::take(&mut state.queue);
    let years: Vec<i32> = queue.iter().map(|i| i.year).collect();
    log::info!(
        "Processing {} year(s) for {}: {years:?}",
        queue.len(),
        park.code()
    );
    progress.years.set_total(queue.len() as u64);
    for input in &queue {
        progress.years.set_message(yearly_name(input.year));
        advance(workspace, park, options, &mut state, input, &progress.stages)?;
        progress.years.inc(1);
    }
    progress.stages.finish_and_clear();

    let centroid_fallbacks = state.centroid_fallbacks;
    let finalized = finalize(workspace, park, &options.attributes, state.cumulative)?;
    progress
        .years
        .finish(format!("{} ({} patches)", finalized.name, finalized.len()));
    Ok(RunSummary {
        dataset_name: finalized.name.clone(),
        years,
        patches: finalized.len(),
        centroid_fallbacks,
    })
}

fn require_cumulative(workspace: &Workspace) -> Result<Dataset, EnrichError> {
    if !workspace.exists(Location::Run, CUMULATIVE_NAME) {
        return Err(EnrichError::Config(format!(
            "cannot resume: {CUMULATIVE_NAME} does not exist in {}",
            workspace.root().display()
        )));
    }
    Ok(workspace.load(Location::Run, CUMULATIVE_NAME)?)
}

fn records_of(cumulative: &Dataset, year: i32) -> Dataset {
    cumulative.select(yearly_name(year), |p| p.yod() == Some(i64::from(year)))
}

fn plan_fresh(
    workspace: &Workspace,
    inputs: Vec<YearlyInput>,
    zone_field: &str,
) -> Result<RunState, EnrichError> {
    if workspace.exists(Location::Run, CUMULATIVE_NAME) {
        return Err(EnrichError::Config(format!(
            "{CUMULATIVE_NAME} already exists in {}; resume the run or remove it",
            workspace.root().display()
        )));
    }
    let cleared = workspace.clear_scratch()?;
    if cleared > 0 {
        log::info!("Cleared {cleared} dataset(s) from the scratch directory");
    }
    let mut state = RunState::new(Dataset::new(CUMULATIVE_NAME), zone_field);
    state.queue = inputs;
    Ok(state)
}

fn plan_interrupted(
    workspace: &Workspace,
    inputs: Vec<YearlyInput>,
    zone_field: &str,
) -> Result<RunState, EnrichError> {
    let cumulative = require_cumulative(workspace)?;
    let last = cumulative
        .years()
        .map(|(_, last)| last)
        .and_then(|last| i32::try_from(last).ok())
        .ok_or_else(|| {
            EnrichError::Config(format!(
                "cannot resume: {CUMULATIVE_NAME} has no year of disturbance"
            ))
        })?;
    let queue: Vec<YearlyInput> = inputs.into_iter().filter(|i| i.year > last).collect();
    let next = queue.first().map(|i| i.year);

    for name in workspace.list(Location::Scratch)? {
        if let Some(year) = year_of(&name)
            && year != last
            && Some(year) != next
        {
            return Err(EnrichError::Config(format!(
                "cannot resume: unexpected scratch dataset {name} (last merged year {last})"
            )));
        }
    }

    let baseline = yearly_name(last);
    let previous = if workspace.exists(Location::Scratch, &baseline) {
        workspace.load(Location::Scratch, &baseline)?
    } else {
        log::info!("Rebuilding the {last} baseline from {CUMULATIVE_NAME}");
        records_of(&cumulative, last)
    };

    let pending = match next {
        Some(year) if workspace.exists(Location::Scratch, &yearly_name(year)) => {
            let mut dataset = workspace.load(Location::Scratch, &yearly_name(year))?;
            let removed = dataset.delete_fields(ATTRIBUTE_FIELDS)
                + dataset.delete_fields(EVENT_FIELDS)
                + dataset.delete_fields(&[Field::OverlapPrv]);
            log::info!(
                "Resuming {} from scratch, {removed} derived field(s) removed",
                dataset.name
            );
            Some(dataset)
        }
        _ => None,
    };

    log::info!("Resuming after {last}, next year {next:?}");
    let mut state = RunState::new(cumulative, zone_field);
    state.previous = Some(previous);
    state.pending = pending;
    state.queue = queue;
    Ok(state)
}

/// Baseline is the cumulative records of the input year before `year`;
/// a cumulative dataset already holding `year` or later is refused.
fn plan_from_year(
    workspace: &Workspace,
    inputs: Vec<YearlyInput>,
    year: i32,
    zone_field: &str,
) -> Result<RunState, EnrichError> {
    let position = inputs
        .iter()
        .position(|i| i.year == year)
        .ok_or_else(|| EnrichError::Config(format!("no input for resume year {year}")))?;
    if position == 0 {
        return Err(EnrichError::Config(format!(
            "{year} is the first input year; start a fresh run instead"
        )));
    }
    let cumulative = require_cumulative(workspace)?;
    if let Some(later) = cumulative
        .iter()
        .filter_map(|p| p.yod())
        .find(|yod| *yod >= i64::from(year))
    {
        return Err(EnrichError::Config(format!(
            "cannot resume from {year}: {CUMULATIVE_NAME} already holds patches of {later}"
        )));
    }
    let prior = inputs[position - 1].year;
    let previous = records_of(&cumulative, prior);
    if previous.is_empty() {
        return Err(EnrichError::Config(format!(
            "cannot resume from {year}: {CUMULATIVE_NAME} has no patches of {prior}"
        )));
    }

    workspace.clear_scratch()?;
    log::info!(
        "Resuming from {year} with {} patches of {prior} as the baseline",
        previous.len()
    );
    let mut state = RunState::new(cumulative, zone_field);
    state.previous = Some(previous);
    state.queue = inputs[position..].to_vec();
    Ok(state)
}

/// Enriches one year and merges it into the cumulative dataset.
fn advance(
    workspace: &Workspace,
    park: &ParkLayers,
    options: &RunOptions,
    state: &mut RunState,
    input: &YearlyInput,
    stages: &Arc<dyn ProgressCallback>,
) -> Result<(), EnrichError> {
    let mut dataset = if let Some(pending) = state.pending.take() {
        pending
    } else {
        let dataset = read_input(input)?;
        workspace.save(Location::Scratch, &dataset)?;
        dataset
    };

    let attributes = add_attributes(&mut dataset, park, &options.attributes, stages)?;
    state.centroid_fallbacks += attributes.centroid_fallbacks.len();
    sync_area_perim(&mut dataset, &PlanarGeometry)?;
    add_paratio(&mut dataset)?;

    if options.events {
        add_event_fields(&mut dataset)?;
        label_mask(&mut dataset, park.water.as_ref(), options.processing_date)?;
    }

    init_overlap(&mut dataset)?;
    if let Some(previous) = &state.previous {
        let exclusion = OverlapExclusion::for_run(options.events, park.has_mask());
        flag_overlaps(&mut dataset, previous, exclusion)?;
    }
    workspace.save(Location::Scratch, &dataset)?;

    if let Some(previous) = state.previous.take() {
        workspace.delete(Location::Scratch, &previous.name)?;
    }
    merge(state, &dataset, &options.attributes.zone_field)?;
    workspace.save(Location::Run, &state.cumulative)?;
    log::info!(
        "Merged {} patches of {} into {CUMULATIVE_NAME} ({} total)",
        dataset.len(),
        dataset.name,
        state.cumulative.len()
    );
    state.previous = Some(dataset);
    Ok(())
}

fn merge(state: &mut RunState, dataset: &Dataset, zone_field: &str) -> Result<(), EnrichError> {
    let mut keys = BTreeSet::new();
    for key in dataset
        .iter()
        .filter_map(|p| p.yod().zip(p.zone_id(zone_field)))
    {
        if state.merged.contains(&key) || !keys.insert(key) {
            return Err(EnrichError::DuplicatePatch {
                dataset: state.cumulative.name.clone(),
                year: key.0,
                zone_id: key.1,
            });
        }
    }
    state.cumulative.append(dataset.clone())?;
    state.merged.extend(keys);
    Ok(())
}

/// Names every patch and stores the dataset under its final name.
fn finalize(
    workspace: &Workspace,
    park: &ParkLayers,
    options: &AttributeOptions,
    mut cumulative: Dataset,
) -> Result<Dataset, EnrichError> {
    let years = cumulative.years().ok_or_else(|| {
        EnrichError::Config(format!("{CUMULATIVE_NAME} has no patches to finalise"))
    })?;
    add_park_patch_name(
        &mut cumulative,
        park.code(),
        options.mmu,
        years,
        &options.zone_field,
    )?;

    let mut seen = BTreeSet::new();
    let duplicates = cumulative
        .iter()
        .filter_map(|p| p.patch_name())
        .filter(|name| !seen.insert(*name))
        .count();
    if duplicates > 0 {
        log::warn!("{duplicates} PatchName(s) are not unique; export will refuse them");
    }

    cumulative.name = finalized_name(park.code(), years.0, years.1);
    workspace.save(Location::Run, &cumulative)?;
    workspace.delete(Location::Run, CUMULATIVE_NAME)?;
    workspace.clear_scratch()?;
    log::info!(
        "Finalised {} with {} patches",
        cumulative.name,
        cumulative.len()
    );
    Ok(cumulative)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use changedb_patch_models::Patch;

    use super::*;
    use crate::fixtures::{park, yearly};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    fn dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("changedb_enrich_run_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    /// 2001-2003 inputs. 2002/1 overlaps 2001/1, 2003/2 overlaps 2002/1 and
    /// 2003/1 lies in the water body.
    fn write_inputs(root: &Path) -> PathBuf {
        let inputs = root.join("inputs");
        let store = Workspace::open(&inputs).unwrap();
        for ds in [
            yearly(2001, &[(1, 0.0, 0.0, 60.0), (2, 180.0, 30.0, 60.0)]),
            yearly(2002, &[(1, 30.0, 0.0, 60.0), (2, 60.0, 150.0, 30.0)]),
            yearly(2003, &[(1, 250.0, 10.0, 30.0), (2, 40.0, 10.0, 30.0)]),
        ] {
            store.save(Location::Run, &ds).unwrap();
        }
        inputs
    }

    fn options(inputs: PathBuf, resume: Resume) -> RunOptions {
        RunOptions {
            inputs_dir: inputs,
            attributes: AttributeOptions::new(1),
            events: true,
            resume,
            processing_date: date(),
        }
    }

    fn fresh_run(name: &str) -> (Workspace, Dataset) {
        let root = dir(name);
        let inputs = write_inputs(&root);
        let ws = Workspace::open(&root.join("run")).unwrap();
        let summary = run(&ws, &park(), &options(inputs, Resume::Fresh), &RunProgress::silent())
            .unwrap();
        assert_eq!(summary.dataset_name, "TEST_changeDB_2001_2003");
        assert_eq!(summary.years, vec![2001, 2002, 2003]);
        let finalized = ws.load(Location::Run, &summary.dataset_name).unwrap();
        (ws, finalized)
    }

    fn find(ds: &Dataset, yod: i64, id: i64) -> &Patch {
        ds.iter()
            .find(|p| p.yod() == Some(yod) && p.zone_id("annualID") == Some(id))
            .unwrap()
    }

    #[test]
    fn fresh_run_merges_and_finalises() {
        let (ws, ds) = fresh_run("fresh");
        assert_eq!(ds.len(), 6);
        assert!(!ws.exists(Location::Run, CUMULATIVE_NAME));
        assert!(ws.list(Location::Scratch).unwrap().is_empty());

        let overlap = |yod, id| find(&ds, yod, id).integer(Field::OverlapPrv);
        assert_eq!(overlap(2001, 1), Some(0));
        assert_eq!(overlap(2001, 2), Some(0));
        assert_eq!(overlap(2002, 1), Some(1));
        assert_eq!(overlap(2002, 2), Some(0));
        assert_eq!(overlap(2003, 2), Some(1));

        let water = find(&ds, 2003, 1);
        assert_eq!(water.field(Field::EventType).as_str(), Some("Mask"));
        assert_eq!(water.integer(Field::OverlapPrv), Some(0));
        assert_eq!(
            find(&ds, 2001, 2).patch_name(),
            Some("TEST_1_2_2001_2003_2001_2")
        );
        assert!(ds.iter().all(|p| p.field(Field::Park).as_str() == Some("TEST")));
        assert!(ds.iter().all(|p| p.field(Field::Paratio).as_f64().is_some()));
    }

    #[test]
    fn fresh_run_refuses_existing_cumulative_dataset() {
        let root = dir("refuse");
        let inputs = write_inputs(&root);
        let ws = Workspace::open(&root.join("run")).unwrap();
        ws.save(Location::Run, &Dataset::new(CUMULATIVE_NAME)).unwrap();
        let err = run(&ws, &park(), &options(inputs, Resume::Fresh), &RunProgress::silent())
            .unwrap_err();
        assert!(matches!(err, EnrichError::Config(_)));
    }

    /// Leaves the workspace as a run interrupted while enriching 2003.
    fn interrupted_after_2002(name: &str) -> (Workspace, RunOptions) {
        let root = dir(name);
        let inputs = write_inputs(&root);
        let ws = Workspace::open(&root.join("run")).unwrap();
        let opts = options(inputs.clone(), Resume::Interrupted);
        let park = park();

        let all = discover_inputs(&inputs).unwrap();
        let mut state = plan_fresh(&ws, all.clone(), "annualID").unwrap();
        let stages = null_progress();
        for input in &all[..2] {
            advance(&ws, &park, &opts, &mut state, input, &stages).unwrap();
        }
        let mut partial = read_input(&all[2]).unwrap();
        add_attributes(&mut partial, &park, &opts.attributes, &stages).unwrap();
        ws.save(Location::Scratch, &partial).unwrap();
        (ws, opts)
    }

    #[test]
    fn resume_after_interruption_matches_full_run() {
        let (_, expected) = fresh_run("reference_interrupted");
        let (ws, opts) = interrupted_after_2002("interrupted");
        assert_eq!(
            ws.list(Location::Scratch).unwrap(),
            vec!["change_2002".to_owned(), "change_2003".to_owned()]
        );
        let summary = run(&ws, &park(), &opts, &RunProgress::silent()).unwrap();
        assert_eq!(summary.years, vec![2003]);
        let resumed = ws.load(Location::Run, &summary.dataset_name).unwrap();
        assert_eq!(resumed, expected);
    }

    #[test]
    fn resume_rebuilds_missing_baseline_from_cumulative() {
        let (_, expected) = fresh_run("reference_rebuilt");
        let (ws, opts) = interrupted_after_2002("rebuilt");
        ws.delete(Location::Scratch, "change_2002").unwrap();
        let summary = run(&ws, &park(), &opts, &RunProgress::silent()).unwrap();
        let resumed = ws.load(Location::Run, &summary.dataset_name).unwrap();
        assert_eq!(resumed, expected);
    }

    #[test]
    fn resume_from_year_uses_cumulative_records() {
        let (_, expected) = fresh_run("reference_from_year");
        let (ws, opts) = interrupted_after_2002("from_year");
        let opts = RunOptions {
            resume: Resume::FromYear(2003),
            ..opts
        };
        let summary = run(&ws, &park(), &opts, &RunProgress::silent()).unwrap();
        let resumed = ws.load(Location::Run, &summary.dataset_name).unwrap();
        assert_eq!(resumed, expected);
    }

    #[test]
    fn resume_guards_fail_before_touching_the_workspace() {
        let (ws, opts) = interrupted_after_2002("guards");
        let before = ws.list(Location::Scratch).unwrap();
        for resume in [Resume::FromYear(2002), Resume::FromYear(2001), Resume::FromYear(1999)] {
            let opts = RunOptions {
                resume,
                ..opts.clone()
            };
            let err = run(&ws, &park(), &opts, &RunProgress::silent()).unwrap_err();
            assert!(matches!(err, EnrichError::Config(_)), "{resume:?}");
        }
        assert_eq!(ws.list(Location::Scratch).unwrap(), before);

        ws.delete(Location::Run, CUMULATIVE_NAME).unwrap();
        let err = run(&ws, &park(), &opts, &RunProgress::silent()).unwrap_err();
        assert!(matches!(err, EnrichError::Config(_)));
    }

    #[test]
    fn duplicate_zone_ids_in_one_year_are_refused() {
        let root = dir("duplicate");
        let inputs = root.join("inputs");
        let store = Workspace::open(&inputs).unwrap();
        store
            .save(
                Location::Run,
                &yearly(2001, &[(1, 0.0, 0.0, 30.0), (1, 60.0, 0.0, 30.0)]),
            )
            .unwrap();
        let ws = Workspace::open(&root.join("run")).unwrap();
        let err = run(&ws, &park(), &options(inputs, Resume::Fresh), &RunProgress::silent())
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::DuplicatePatch {
                year: 2001,
                zone_id: 1,
                ..
            }
        ));
    }
}
