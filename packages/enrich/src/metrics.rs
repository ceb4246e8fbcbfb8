//! Shape metrics: area/perimeter, paratio, zonal geometry and the study
//! area clip.

use std::collections::BTreeMap;

use changedb_patch_models::{Dataset, Field, FieldValue, Patch};
use changedb_spatial::{GeometryOps, ReferenceLayer, ZonalGeometry, zonal_geometry};
use geo::{BooleanOps as _, MultiPolygon};

use crate::EnrichError;

/// Side of one Landsat pixel in meters; the minimum mapping unit is
/// counted in pixels of this size.
pub const PIXEL_SIZE_M: f64 = 30.0;

/// Coefficient of the perimeter in the paratio denominator.
pub const PARATIO_COEFFICIENT: f64 = 0.282;

/// A zone: year of disturbance and zone id. Zone ids repeat across years,
/// so a cumulative selection needs both.
pub type ZoneKey = (Option<i64>, i64);

/// Zone of a patch, `None` without a zone id.
#[must_use]
pub fn zone_key(patch: &Patch, zone_field: &str) -> Option<ZoneKey> {
    patch.zone_id(zone_field).map(|zone| (patch.yod(), zone))
}

/// Zone footprints keyed by [`ZoneKey`]. Patches sharing a key form one
/// zone. Patches without a zone id are skipped.
#[must_use]
pub fn zone_footprints(
    dataset: &Dataset,
    zone_field: &str,
) -> BTreeMap<ZoneKey, MultiPolygon<f64>> {
    let mut zones: BTreeMap<ZoneKey, MultiPolygon<f64>> = BTreeMap::new();
    for patch in dataset {
        if let Some(key) = zone_key(patch, zone_field) {
            zones
                .entry(key)
                .or_insert_with(|| MultiPolygon(vec![]))
                .0
                .extend(patch.geometry.0.iter().cloned());
        }
    }
    zones
}

#[allow(clippy::float_cmp)]
fn synced(stored: &FieldValue, measured: f64) -> FieldValue {
    if stored.as_f64() == Some(measured) {
        stored.clone()
    } else {
        FieldValue::Double(measured.round_ties_even())
    }
}

/// Brings `area` and `perim` in line with the geometry.
///
/// A stored value that already equals the measured one is kept; anything
/// else is replaced by the measured value rounded to a whole number. The
/// fields are added when missing.
///
/// # Errors
///
/// Returns a schema error if a field cannot be written.
pub fn sync_area_perim(
    dataset: &mut Dataset,
    geometry: &impl GeometryOps,
) -> Result<(), EnrichError> {
    dataset.add_known(Field::Area);
    dataset.add_known(Field::Perim);
    dataset.calculate(Field::Area.as_ref(), |p| {
        synced(p.field(Field::Area), geometry.area(&p.geometry))
    })?;
    dataset.calculate(Field::Perim.as_ref(), |p| {
        synced(p.field(Field::Perim), geometry.perimeter(&p.geometry))
    })?;
    Ok(())
}

/// Shape compactness `area / (0.282 * perim)^2`, `None` without a
/// positive perimeter.
#[must_use]
pub fn paratio(area: f64, perim: f64) -> Option<f64> {
    (perim > 0.0).then(|| area / (PARATIO_COEFFICIENT * perim).powi(2))
}

/// Adds `paratio` from the stored `area` and `perim`.
///
/// Must run after [`sync_area_perim`].
///
/// # Errors
///
/// Returns a schema error if the field cannot be written.
pub fn add_paratio(dataset: &mut Dataset) -> Result<(), EnrichError> {
    dataset.add_known(Field::Paratio);
    dataset.calculate(Field::Paratio.as_ref(), |p: &Patch| {
        let area = p.field(Field::Area).as_f64();
        let perim = p.field(Field::Perim).as_f64();
        area.zip(perim).and_then(|(a, l)| paratio(a, l)).into()
    })?;
    Ok(())
}

/// Adds `THICKNESS`, `MAJORAXIS`, `MINORAXIS` and `ORIENTATION`, computed
/// once per zone on a grid of `cell_size` and joined back by zone id.
///
/// # Errors
///
/// Returns a schema error if a field cannot be written.
pub fn add_zonal_geometry(
    dataset: &mut Dataset,
    zone_field: &str,
    cell_size: f64,
) -> Result<(), EnrichError> {
    let descriptors: BTreeMap<ZoneKey, _> = zone_footprints(dataset, zone_field)
        .into_iter()
        .filter_map(|(zone, footprint)| zonal_geometry(&footprint, cell_size).map(|g| (zone, g)))
        .collect();

    let columns: [(Field, fn(&ZonalGeometry) -> f64); 4] = [
        (Field::Thickness, |g: &ZonalGeometry| g.thickness),
        (Field::MajorAxis, |g: &ZonalGeometry| g.major_axis),
        (Field::MinorAxis, |g: &ZonalGeometry| g.minor_axis),
        (Field::Orientation, |g: &ZonalGeometry| g.orientation),
    ];
    for (field, value_of) in columns {
        dataset.add_known(field);
        dataset.calculate(field.as_ref(), |p| {
            zone_key(p, zone_field)
                .and_then(|key| descriptors.get(&key))
                .map(value_of)
                .into()
        })?;
    }
    Ok(())
}

/// Clips every patch to the study area and drops patches left smaller than
/// the minimum mapping unit (`mmu` pixels of 30 x 30 m), then syncs
/// `area`/`perim`.
///
/// Returns the number of dropped patches.
///
/// # Errors
///
/// Returns a schema error if `area`/`perim` cannot be written.
pub fn clip_to_study_area(
    dataset: &mut Dataset,
    study_area: &ReferenceLayer,
    mmu: u32,
    geometry: &impl GeometryOps,
) -> Result<usize, EnrichError> {
    let boundary = study_area.union();
    for patch in dataset.patches_mut() {
        patch.geometry = patch.geometry.intersection(&boundary);
    }
    let mmu_area = PIXEL_SIZE_M * PIXEL_SIZE_M * f64::from(mmu);
    let removed = dataset.retain(|p| geometry.area(&p.geometry) >= mmu_area);
    log::info!(
        "Clipped {} to {}: {removed} patches below {mmu_area} m² removed, {} remain",
        dataset.name,
        study_area.name(),
        dataset.len()
    );
    sync_area_perim(dataset, geometry)?;
    Ok(removed)
}
