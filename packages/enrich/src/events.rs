//! Event classification fields.
//!
//! Yearly enrichment adds the empty event schema and auto-labels mask
//! patches. Curated labels are joined later, as a maintenance pass over a
//! finalised dataset, by [`join_labels_to_patches`].

use std::collections::BTreeMap;

use changedb_lookup::{EventLabel, LookupService};
use changedb_patch_models::{
    CHANGE_TYPE_ANNUAL_VARIABILITY, Dataset, EVENT_FIELDS, EVENT_TYPE_MASK, Field, FieldValue,
    LABEL_FIELDS, LABELED_BY_GEOPROCESSING, Patch,
};
use changedb_spatial::{Probe, ReferenceLayer, SpatialRelationship};
use changedb_store::{Location, Workspace};
use chrono::NaiveDate;

use crate::EnrichError;

/// Confidence stamped on mask labels.
pub const MASK_CONFIDENCE: i64 = 2;

/// Adds the event fields, all `Null` except `Split = 0`.
///
/// # Errors
///
/// Returns a schema error if `Split` cannot be written.
pub fn add_event_fields(dataset: &mut Dataset) -> Result<(), EnrichError> {
    for field in EVENT_FIELDS {
        dataset.add_known(*field);
    }
    dataset.calculate(Field::Split.as_ref(), |_| FieldValue::Integer(0))?;
    Ok(())
}

/// Whether a patch falls under the mask rule: flagged `InMask = 1`, or
/// completely within a water feature.
fn is_masked(patch: &Patch, water: Option<&ReferenceLayer>) -> bool {
    patch.integer(Field::InMask) == Some(1)
        || water.is_some_and(|w| {
            w.selects(
                &Probe::Footprint(&patch.geometry),
                SpatialRelationship::CompletelyWithin,
            )
        })
}

/// Labels mask patches as annual variability: `EventType = "Mask"`,
/// `ChangeType = "Annual Variability"`, `Confidence = 2`, `EventDate`,
/// `LabeledBy = "Geoprocessing"`, `PriorRun = 0`, `PostDist = 0`.
///
/// Parks without an elevation mask have a null `InMask` and are labeled by
/// the water mask only. Returns the number of labeled patches.
///
/// # Errors
///
/// Returns a schema error if the event fields are missing.
pub fn label_mask(
    dataset: &mut Dataset,
    water: Option<&ReferenceLayer>,
    date: NaiveDate,
) -> Result<usize, EnrichError> {
    let masked: Vec<usize> = dataset
        .iter()
        .enumerate()
        .filter_map(|(i, p)| is_masked(p, water).then_some(i))
        .collect();

    let event_date = date.format("%Y-%m-%d").to_string();
    for &i in &masked {
        dataset.set(i, Field::EventType, EVENT_TYPE_MASK)?;
        dataset.set(i, Field::ChangeType, CHANGE_TYPE_ANNUAL_VARIABILITY)?;
        dataset.set(i, Field::Confidence, MASK_CONFIDENCE)?;
        dataset.set(i, Field::EventDate, event_date.as_str())?;
        dataset.set(i, Field::LabeledBy, LABELED_BY_GEOPROCESSING)?;
        dataset.set(i, Field::PriorRun, 0)?;
        dataset.set(i, Field::PostDist, 0)?;
    }
    log::info!(
        "Labeled {} of {} patches in {} as {EVENT_TYPE_MASK}",
        masked.len(),
        dataset.len(),
        dataset.name
    );
    Ok(masked.len())
}

/// Outcome of a label join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelJoinSummary {
    /// Patches that received a label.
    pub matched: usize,
    /// Patches without a label (their label fields are now `Null`).
    pub unmatched: usize,
    /// Backup written before the join.
    pub backup: Option<String>,
}

/// Overwrites the label fields of every patch from `labels`, keyed by
/// `PatchName`.
///
/// Existing values are replaced, and patches missing from the table end up
/// with null label fields. Missing label fields are added first. When a
/// `PatchName` appears more than once in the table the first row wins.
///
/// # Errors
///
/// Returns a schema error if a field cannot be written.
pub fn join_labels(
    dataset: &mut Dataset,
    labels: &[EventLabel],
) -> Result<LabelJoinSummary, EnrichError> {
    let mut by_name: BTreeMap<&str, &EventLabel> = BTreeMap::new();
    for label in labels {
        by_name.entry(label.patch_name.as_str()).or_insert(label);
    }
    for field in LABEL_FIELDS {
        dataset.add_known(*field);
    }

    let mut summary = LabelJoinSummary::default();
    for field in LABEL_FIELDS {
        dataset.calculate(field.as_ref(), |patch| {
            patch
                .patch_name()
                .and_then(|name| by_name.get(name))
                .map_or(FieldValue::Null, |label| label.value(*field))
        })?;
    }
    for patch in dataset.iter() {
        if patch.patch_name().is_some_and(|n| by_name.contains_key(n)) {
            summary.matched += 1;
        } else {
            summary.unmatched += 1;
        }
    }
    log::info!(
        "Joined labels onto {}: {} matched, {} without a label",
        dataset.name,
        summary.matched,
        summary.unmatched
    );
    Ok(summary)
}

/// Joins the curated labels onto a finalised dataset of the run directory
/// and saves it, optionally writing a dated backup first.
///
/// # Errors
///
/// Returns an error if the dataset or labels cannot be read, the dataset
/// has no `PatchName`, or the result cannot be saved.
pub fn join_labels_to_patches(
    workspace: &Workspace,
    name: &str,
    lookup: &dyn LookupService,
    backup_date: Option<NaiveDate>,
) -> Result<LabelJoinSummary, EnrichError> {
    let mut dataset = workspace.load(Location::Run, name)?;
    if !dataset.has_field(Field::PatchName.as_ref()) {
        return Err(EnrichError::Config(format!(
            "{name} has no PatchName; finalise the run before joining labels"
        )));
    }
    let labels = lookup.event_labels()?;

    let backup = backup_date
        .map(|date| workspace.backup(name, date))
        .transpose()?;
    let mut summary = join_labels(&mut dataset, &labels)?;
    workspace.save(Location::Run, &dataset)?;
    summary.backup = backup;
    Ok(summary)
}
