//! Re-attribution of hand-picked patches of a finalised dataset.
//!
//! Used after patches were edited (split, merged, reshaped): the selected
//! patches are copied to scratch, their attributes re-derived without a
//! clip, and the copies replace the originals. `Park`, `PatchName`, event
//! fields and `OverlapPrv` are carried over unchanged.

use std::collections::BTreeSet;
use std::sync::Arc;

use changedb_patch_models::{Dataset, Field, Patch};
use changedb_spatial::PlanarGeometry;
use changedb_store::{Location, Workspace};

use crate::EnrichError;
use crate::attributes::{AttributeOptions, add_attributes};
use crate::metrics::{add_paratio, sync_area_perim};
use crate::park::ParkLayers;
use crate::progress::ProgressCallback;

/// Scratch name of the selection taken from `dataset_name`.
#[must_use]
pub fn selection_name(dataset_name: &str) -> String {
    format!("select_{dataset_name}")
}

/// Re-derives the attributes of the patches of `dataset_name` whose
/// `PatchName` is in `patch_names`, writes them back in place of the
/// originals and returns them.
///
/// Names that match nothing are reported in a warning.
///
/// # Errors
///
/// Returns [`EnrichError::Config`] if the dataset has no `PatchName` or no
/// patch matches, or any error of the attribute stages or the store.
pub fn reattribute_selected(
    workspace: &Workspace,
    dataset_name: &str,
    patch_names: &BTreeSet<String>,
    park: &ParkLayers,
    options: &AttributeOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Dataset, EnrichError> {
    let mut cumulative = workspace.load(Location::Run, dataset_name)?;
    if !cumulative.has_field(Field::PatchName.as_ref()) {
        return Err(EnrichError::Config(format!(
            "{dataset_name} has no PatchName to select patches by"
        )));
    }
    let is_selected = |p: &Patch| p.patch_name().is_some_and(|n| patch_names.contains(n));

    let mut selection = cumulative.select(selection_name(dataset_name), is_selected);
    let found: BTreeSet<&str> = selection.iter().filter_map(|p| p.patch_name()).collect();
    let missing: Vec<&str> = patch_names
        .iter()
        .map(String::as_str)
        .filter(|n| !found.contains(n))
        .collect();
    if !missing.is_empty() {
        log::warn!("{} patch name(s) not found in {dataset_name}: {missing:?}", missing.len());
    }
    if selection.is_empty() {
        return Err(EnrichError::Config(format!(
            "none of the {} requested patches exist in {dataset_name}",
            patch_names.len()
        )));
    }
    workspace.save(Location::Scratch, &selection)?;

    let options = AttributeOptions {
        clip: false,
        ..options.clone()
    };
    add_attributes(&mut selection, park, &options, progress)?;
    sync_area_perim(&mut selection, &PlanarGeometry)?;
    add_paratio(&mut selection)?;

    for spec in selection.fields() {
        if !cumulative.has_field(&spec.name) {
            cumulative.add_field(spec.clone());
        }
    }
    let removed = cumulative.retain(|p| !is_selected(p));
    cumulative.append(selection.clone())?;
    workspace.save(Location::Run, &cumulative)?;
    workspace.delete(Location::Scratch, &selection.name)?;
    log::info!(
        "Re-attributed {} patches of {dataset_name} ({removed} replaced)",
        selection.len()
    );
    Ok(selection)
}
