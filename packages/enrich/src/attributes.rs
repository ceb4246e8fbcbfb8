//! The ordered attribute stages applied to one yearly dataset.

use std::sync::Arc;

use changedb_patch_models::{ATTRIBUTE_FIELDS, Dataset, Field};
use changedb_spatial::{PlanarGeometry, ZonalStatistic};

use crate::EnrichError;
use crate::coords::{CoordinateSystems, add_coordinates};
use crate::joiner::{
    EAST_WEST_COLUMN, LAND_MGMT_COLUMN, ProbeBy, WATERSHED_COLUMN, WILD_NAME_COLUMN,
    add_vegetation, add_zonal_statistic, flag_membership, join_attributes,
};
use crate::metrics::{add_zonal_geometry, clip_to_study_area};
use crate::park::ParkLayers;
use crate::progress::ProgressCallback;

/// Default zone field.
pub const DEFAULT_ZONE_FIELD: &str = "annualID";

/// Default processing cell size in meters.
pub const DEFAULT_CELL_SIZE: f64 = 30.0;

/// Parameters of attribute derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeOptions {
    /// Column holding the zone id of each patch.
    pub zone_field: String,
    /// Cell size of zonal geometry, in meters.
    pub cell_size: f64,
    /// Clip patches to the study area first.
    pub clip: bool,
    /// Minimum mapping unit in 30 m pixels.
    pub mmu: u32,
}

impl AttributeOptions {
    /// Options with the default zone field and cell size, without clipping.
    #[must_use]
    pub fn new(mmu: u32) -> Self {
        Self {
            zone_field: DEFAULT_ZONE_FIELD.to_owned(),
            cell_size: DEFAULT_CELL_SIZE,
            clip: false,
            mmu,
        }
    }
}

/// What attribute derivation did besides adding fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSummary {
    /// Zone ids whose coordinates come from the centroid.
    pub centroid_fallbacks: Vec<i64>,
    /// Patches dropped by the clip.
    pub clipped: usize,
}

const STAGES: u64 = 8;

/// Derives every attribute of a yearly dataset from the park's reference
/// data.
///
/// Previously derived attribute fields are deleted first, so the stages
/// always start from a clean schema. Stages run in a fixed order: clip,
/// coordinates, land management and wilderness, watershed, membership
/// flags, east/west, mask, vegetation, terrain and zonal geometry.
///
/// # Errors
///
/// Returns [`EnrichError::Config`] when clipping without a study area
/// layer, [`EnrichError::Geometry`] if a patch has no representative point,
/// or a schema error if a field cannot be written.
pub fn add_attributes(
    dataset: &mut Dataset,
    park: &ParkLayers,
    options: &AttributeOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<AttributeSummary, EnrichError> {
    let zone_field = options.zone_field.as_str();
    let relationships = park.config.relationships;
    let mut summary = AttributeSummary::default();

    progress.set_total(STAGES);
    progress.set_position(0);

    let removed = dataset.delete_fields(ATTRIBUTE_FIELDS);
    if removed > 0 {
        log::debug!("Deleted {removed} existing attribute fields from {}", dataset.name);
    }

    if options.clip {
        progress.set_message(format!("{}: clipping to study area", dataset.name));
        let study_area = park.study_area.as_ref().ok_or_else(|| {
            EnrichError::Config(format!(
                "park {} has no study area layer to clip to",
                park.code()
            ))
        })?;
        summary.clipped = clip_to_study_area(dataset, study_area, options.mmu, &PlanarGeometry)?;
    }
    progress.inc(1);

    progress.set_message(format!("{}: coordinates", dataset.name));
    summary.centroid_fallbacks = add_coordinates(
        dataset,
        &PlanarGeometry,
        CoordinateSystems::conus(park.config.utm()),
        zone_field,
    )?;
    progress.inc(1);

    progress.set_message(format!("{}: land management and watersheds", dataset.name));
    join_attributes(
        dataset,
        Some(&park.land_mgmt),
        relationships.land_mgmt,
        &[
            (Field::LandMgmt, LAND_MGMT_COLUMN),
            (Field::WildName, WILD_NAME_COLUMN),
        ],
    )?;
    join_attributes(
        dataset,
        Some(&park.watershed),
        relationships.watershed,
        &[(Field::Watershed, WATERSHED_COLUMN)],
    )?;
    progress.inc(1);

    progress.set_message(format!("{}: park, buffer and protected areas", dataset.name));
    flag_membership(
        dataset,
        Field::InPark,
        Some(&park.boundary),
        relationships.in_park,
        ProbeBy::Point,
    )?;
    flag_membership(
        dataset,
        Field::InBuffer,
        Some(&park.buffer),
        relationships.in_buffer,
        ProbeBy::Point,
    )?;
    flag_membership(
        dataset,
        Field::Protected,
        park.protected.as_ref(),
        relationships.protected,
        ProbeBy::Point,
    )?;
    join_attributes(
        dataset,
        park.east_west.as_ref(),
        relationships.east_west,
        &[(Field::EastWest, EAST_WEST_COLUMN)],
    )?;
    progress.inc(1);

    progress.set_message(format!("{}: elevation mask", dataset.name));
    if let Some(in_mask) = flag_membership(
        dataset,
        Field::InMask,
        park.mask.as_ref(),
        relationships.in_mask,
        ProbeBy::Footprint,
    )? {
        log::info!("{in_mask} patches of {} lie in the elevation mask", dataset.name);
    }
    progress.inc(1);

    progress.set_message(format!("{}: vegetation", dataset.name));
    add_vegetation(
        dataset,
        &park.vegetation,
        park.veg_table.as_ref(),
        &park.config.veg_prefix(),
        zone_field,
    )?;
    progress.inc(1);

    progress.set_message(format!("{}: terrain", dataset.name));
    let terrain = [
        (Field::ElevMean, &park.dem, ZonalStatistic::Mean),
        (Field::SlopeMean, &park.slope, ZonalStatistic::Mean),
        (Field::Aspect, &park.aspect, ZonalStatistic::Majority),
    ];
    for (field, raster, statistic) in terrain {
        add_zonal_statistic(dataset, field, raster, statistic, zone_field)?;
    }
    progress.inc(1);

    progress.set_message(format!("{}: zonal geometry", dataset.name));
    add_zonal_geometry(dataset, zone_field, options.cell_size)?;
    progress.inc(1);

    log::info!(
        "Derived attributes for {} patches of {}",
        dataset.len(),
        dataset.name
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{park, yearly};
    use crate::progress::null_progress;

    fn options() -> AttributeOptions {
        AttributeOptions::new(1)
    }

    #[test]
    fn every_stage_adds_its_fields() {
        let park = park();
        let mut ds = yearly(2001, &[(1, 0.0, 0.0, 60.0), (2, 180.0, 30.0, 60.0)]);
        let summary = add_attributes(&mut ds, &park, &options(), &null_progress()).unwrap();
        assert!(summary.centroid_fallbacks.is_empty());
        assert_eq!(summary.clipped, 0);
        for field in ATTRIBUTE_FIELDS {
            if *field != Field::Paratio {
                assert!(ds.has_field(field.as_ref()), "{field} missing");
            }
        }

        let west = &ds.patches()[0];
        assert_eq!(west.integer(Field::InPark), Some(1));
        assert_eq!(west.integer(Field::InBuffer), Some(1));
        assert_eq!(west.integer(Field::Protected), Some(0));
        assert_eq!(west.integer(Field::InMask), Some(0));
        assert_eq!(west.field(Field::EastWest).as_str(), Some("West"));
        assert_eq!(west.field(Field::Watershed).as_str(), Some("West Creek"));
        assert_eq!(west.field(Field::LandMgmt).as_str(), Some("NPS"));
        assert_eq!(west.field(Field::VegCode).as_str(), Some("DFWH"));
        assert_eq!(west.field(Field::ElevMean).as_f64(), Some(1085.0));
        assert_eq!(west.field(Field::SlopeMean).as_f64(), Some(0.5));
        assert_eq!(west.integer(Field::Aspect), Some(90));
        assert!(west.field(Field::Thickness).as_f64().is_some());

        let east = &ds.patches()[1];
        assert_eq!(east.integer(Field::InPark), Some(0));
        assert_eq!(east.integer(Field::Protected), Some(1));
        assert_eq!(east.field(Field::EastWest).as_str(), Some("East"));
        assert!(east.field(Field::LandMgmt).is_null());
        assert_eq!(east.field(Field::VegCode).as_str(), Some("SSPR"));
        assert_eq!(east.integer(Field::Aspect), Some(270));
    }

    #[test]
    fn rederiving_replaces_stale_values() {
        let park = park();
        let mut ds = yearly(2001, &[(1, 0.0, 0.0, 60.0)]);
        ds.add_known(Field::VegCode);
        ds.set(0, Field::VegCode, "OLD").unwrap();
        add_attributes(&mut ds, &park, &options(), &null_progress()).unwrap();
        let once = ds.clone();
        add_attributes(&mut ds, &park, &options(), &null_progress()).unwrap();
        assert_eq!(ds.patches()[0].field(Field::VegCode).as_str(), Some("DFWH"));
        assert_eq!(ds, once);
    }

    #[test]
    fn parks_without_optional_layers_get_null_fields() {
        let mut park = park();
        park.protected = None;
        park.east_west = None;
        park.mask = None;
        park.veg_table = None;
        let mut ds = yearly(2001, &[(1, 0.0, 0.0, 60.0)]);
        add_attributes(&mut ds, &park, &options(), &null_progress()).unwrap();
        let patch = &ds.patches()[0];
        assert!(patch.field(Field::Protected).is_null());
        assert!(patch.field(Field::EastWest).is_null());
        assert!(patch.field(Field::InMask).is_null());
        assert_eq!(patch.field(Field::VegCode).as_str(), Some("T03"));
    }

    #[test]
    fn clip_runs_before_everything_else() {
        let park = park();
        let mut ds = yearly(2001, &[(1, 0.0, 0.0, 60.0), (2, 230.0, 100.0, 30.0)]);
        let opts = AttributeOptions {
            clip: true,
            ..options()
        };
        let summary = add_attributes(&mut ds, &park, &opts, &null_progress()).unwrap();
        assert_eq!(summary.clipped, 1);
        assert_eq!(ds.len(), 1);
        assert!(ds.patches()[0].field(Field::CoordType).as_str().is_some());
    }

    #[test]
    fn clip_without_study_area_is_a_config_error() {
        let mut park = park();
        park.study_area = None;
        let mut ds = yearly(2001, &[(1, 0.0, 0.0, 60.0)]);
        let opts = AttributeOptions {
            clip: true,
            ..options()
        };
        let err = add_attributes(&mut ds, &park, &opts, &null_progress()).unwrap_err();
        assert!(matches!(err, EnrichError::Config(_)));
    }
}
