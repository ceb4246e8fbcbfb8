//! `OverlapPrv`: whether a patch overlaps a patch of the previous year.

use std::collections::BTreeMap;

use changedb_patch_models::{Dataset, Field, FieldValue, Patch};
use changedb_spatial::{LayerFeature, ReferenceLayer};

use crate::EnrichError;

/// Shared area, in square meters, above which two patches overlap. Patches
/// that only share a border have zero shared area.
pub const MIN_OVERLAP_AREA_M2: f64 = 1.0;

/// Patches left out of the comparison, in both years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapExclusion {
    /// Patches that already carry an `EventType`.
    Labeled,
    /// Patches not flagged `InMask = 0`.
    InMask,
    /// Nothing is excluded.
    Nothing,
}

impl OverlapExclusion {
    /// Exclusion rule for a run: labeled patches when event labeling is on,
    /// otherwise in-mask patches for parks that have a mask.
    #[must_use]
    pub const fn for_run(events: bool, has_mask: bool) -> Self {
        match (events, has_mask) {
            (true, _) => Self::Labeled,
            (false, true) => Self::InMask,
            (false, false) => Self::Nothing,
        }
    }

    /// Whether a patch takes part in the comparison.
    #[must_use]
    pub fn includes(self, patch: &Patch) -> bool {
        match self {
            Self::Labeled => patch.field(Field::EventType).is_null(),
            Self::InMask => patch.integer(Field::InMask) == Some(0),
            Self::Nothing => true,
        }
    }
}

/// Adds `OverlapPrv` set to 0 on every patch.
///
/// # Errors
///
/// Returns a schema error if the field cannot be written.
pub fn init_overlap(dataset: &mut Dataset) -> Result<(), EnrichError> {
    dataset.add_known(Field::OverlapPrv);
    dataset.calculate(Field::OverlapPrv.as_ref(), |_| FieldValue::Integer(0))?;
    Ok(())
}

/// Sets `OverlapPrv = 1` on every included patch of `current` that shares
/// more than [`MIN_OVERLAP_AREA_M2`] with an included patch of `previous`.
///
/// Returns the number of flagged patches.
///
/// # Errors
///
/// Returns a schema error if `current` has no `OverlapPrv` field.
pub fn flag_overlaps(
    current: &mut Dataset,
    previous: &Dataset,
    exclusion: OverlapExclusion,
) -> Result<usize, EnrichError> {
    let features: Vec<LayerFeature> = previous
        .iter()
        .filter(|p| exclusion.includes(p))
        .map(|p| LayerFeature::new(p.geometry.clone(), BTreeMap::new()))
        .collect();
    let earlier = ReferenceLayer::from_features(previous.name.clone(), features);

    let mut flagged = 0;
    current.calculate_where(
        Field::OverlapPrv.as_ref(),
        |p| exclusion.includes(p) && earlier.overlaps(&p.geometry, MIN_OVERLAP_AREA_M2),
        |_| {
            flagged += 1;
            FieldValue::Integer(1)
        },
    )?;
    log::info!(
        "{flagged} of {} patches in {} overlap {}",
        current.len(),
        current.name,
        previous.name
    );
    Ok(flagged)
}
