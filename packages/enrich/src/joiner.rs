//! Joins reference layers and rasters onto patches.
//!
//! Vector layers are probed with each patch's representative point (or its
//! whole footprint for the mask); rasters are summarised per zone, where a
//! zone is every footprint sharing one zone id.

use std::collections::BTreeMap;

use changedb_lookup::VegetationTable;
use changedb_lookup::vegetation::synthesized_code;
use changedb_patch_models::{Dataset, Field, FieldValue, Patch};
use changedb_spatial::{Probe, Raster, ReferenceLayer, SpatialRelationship, ZonalStatistic};

use crate::EnrichError;
use crate::coords::representative_point;
use crate::metrics::{ZoneKey, zone_footprints, zone_key};

/// Land management column of the land management/wilderness layer.
pub const LAND_MGMT_COLUMN: &str = "MANAGER";

/// Wilderness name column of the land management/wilderness layer.
pub const WILD_NAME_COLUMN: &str = "WildName";

/// Watershed name column of the watershed layer.
pub const WATERSHED_COLUMN: &str = "NAME";

/// Side-of-crest column of the east/west layer.
pub const EAST_WEST_COLUMN: &str = "EastWest";

/// How a patch is tested against a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeBy {
    /// The stored representative point, or the footprint when the patch
    /// has no coordinates yet.
    Point,
    /// The whole footprint.
    Footprint,
}

fn probe(patch: &Patch, by: ProbeBy) -> Probe<'_> {
    match (by, representative_point(patch)) {
        (ProbeBy::Point, Some(point)) => Probe::Point(point),
        _ => Probe::Footprint(&patch.geometry),
    }
}

/// Adds a 0/1 membership flag: 1 where the layer selects the patch under
/// `relationship`, 0 everywhere else.
///
/// When the park has no such layer the field is still added, left `Null`,
/// and `None` is returned. Otherwise returns the number of patches flagged
/// 1.
///
/// # Errors
///
/// Returns a schema error if the field cannot be written.
pub fn flag_membership(
    dataset: &mut Dataset,
    field: Field,
    layer: Option<&ReferenceLayer>,
    relationship: SpatialRelationship,
    by: ProbeBy,
) -> Result<Option<usize>, EnrichError> {
    dataset.add_known(field);
    let Some(layer) = layer else {
        log::debug!("No layer for {field}; leaving it null on {}", dataset.name);
        return Ok(None);
    };

    let mut selected = 0;
    dataset.calculate(field.as_ref(), |patch| {
        let hit = layer.selects(&probe(patch, by), relationship);
        selected += usize::from(hit);
        FieldValue::Integer(i64::from(hit))
    })?;
    log::debug!(
        "{field}: {selected} of {} patches selected by {}",
        dataset.len(),
        layer.name()
    );
    Ok(Some(selected))
}

/// Copies attribute columns of the feature matched by each patch's
/// representative point. Unmatched patches, and every patch when the park
/// has no such layer, get `Null`.
///
/// `columns` pairs each target field with the layer column it is copied
/// from. Returns the number of matched patches.
///
/// # Errors
///
/// Returns a schema error if a field cannot be written.
pub fn join_attributes(
    dataset: &mut Dataset,
    layer: Option<&ReferenceLayer>,
    relationship: SpatialRelationship,
    columns: &[(Field, &str)],
) -> Result<usize, EnrichError> {
    for (field, _) in columns {
        dataset.add_known(*field);
    }
    let Some(layer) = layer else {
        return Ok(0);
    };

    let values: Vec<Option<Vec<FieldValue>>> = dataset
        .iter()
        .map(|patch| {
            layer
                .find(&probe(patch, ProbeBy::Point), relationship)
                .map(|feature| {
                    columns
                        .iter()
                        .map(|(_, column)| feature.attribute(column).clone())
                        .collect()
                })
        })
        .collect();

    let mut matched = 0;
    for (i, row) in values.into_iter().enumerate() {
        let Some(row) = row else {
            continue;
        };
        matched += 1;
        for ((field, _), value) in columns.iter().zip(row) {
            dataset.set(i, *field, value)?;
        }
    }
    log::debug!(
        "Joined {} from {}: {matched} of {} patches matched",
        columns
            .iter()
            .map(|(f, _)| f.as_ref())
            .collect::<Vec<_>>()
            .join(", "),
        layer.name(),
        dataset.len()
    );
    Ok(matched)
}

/// Summarises a raster per zone and stores the result in `field`.
///
/// Zones covering no data cell get `Null`.
///
/// # Errors
///
/// Returns a schema error if the field cannot be written.
pub fn add_zonal_statistic(
    dataset: &mut Dataset,
    field: Field,
    raster: &Raster,
    statistic: ZonalStatistic,
    zone_field: &str,
) -> Result<(), EnrichError> {
    dataset.add_known(field);
    let values = zonal_values(dataset, raster, statistic, zone_field);
    dataset.calculate(field.as_ref(), |patch| {
        zone_key(patch, zone_field)
            .and_then(|key| values.get(&key).copied())
            .into()
    })?;
    Ok(())
}

fn zonal_values(
    dataset: &Dataset,
    raster: &Raster,
    statistic: ZonalStatistic,
    zone_field: &str,
) -> BTreeMap<ZoneKey, f64> {
    zone_footprints(dataset, zone_field)
        .into_iter()
        .filter_map(|(zone, footprint)| {
            changedb_spatial::zonal_statistic(raster, &footprint, statistic).map(|v| (zone, v))
        })
        .collect()
}

/// Adds `VegValue` (majority vegetation raster value per zone) and
/// `VegCode`.
///
/// With a vegetation table the code is looked up by value; without one it
/// is synthesized from `prefix` and the zero-padded value.
///
/// # Errors
///
/// Returns a schema error if a field cannot be written.
pub fn add_vegetation(
    dataset: &mut Dataset,
    raster: &Raster,
    table: Option<&VegetationTable>,
    prefix: &str,
    zone_field: &str,
) -> Result<(), EnrichError> {
    add_zonal_statistic(
        dataset,
        Field::VegValue,
        raster,
        ZonalStatistic::Majority,
        zone_field,
    )?;
    dataset.add_known(Field::VegCode);
    dataset.calculate(Field::VegCode.as_ref(), |patch| {
        let Some(value) = patch.integer(Field::VegValue) else {
            return FieldValue::Null;
        };
        match table {
            Some(table) => table.code(value).map(str::to_owned).into(),
            None => synthesized_code(prefix, value).into(),
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use changedb_spatial::PlanarGeometry;
    use changedb_spatial::projection::Utm;

    use super::*;
    use crate::coords::{CoordinateSystems, add_coordinates};
    use crate::fixtures::{park, yearly};

    fn located(squares: &[(i64, f64, f64, f64)]) -> Dataset {
        let mut ds = yearly(2001, squares);
        add_coordinates(
            &mut ds,
            &PlanarGeometry,
            CoordinateSystems::conus(Utm::nad83_north(10)),
            "annualID",
        )
        .unwrap();
        ds
    }

    #[test]
    fn membership_flags_are_never_null() {
        let park = park();
        let mut ds = located(&[(1, 30.0, 30.0, 30.0), (2, 210.0, 30.0, 30.0)]);
        let selected = flag_membership(
            &mut ds,
            Field::InPark,
            Some(&park.boundary),
            SpatialRelationship::Intersect,
            ProbeBy::Point,
        )
        .unwrap();
        assert_eq!(selected, Some(1));
        let flags: Vec<Option<i64>> = ds.iter().map(|p| p.integer(Field::InPark)).collect();
        assert_eq!(flags, vec![Some(1), Some(0)]);
    }

    #[test]
    fn absent_layer_leaves_nulls() {
        let mut ds = located(&[(1, 30.0, 30.0, 30.0)]);
        assert_eq!(
            flag_membership(
                &mut ds,
                Field::Protected,
                None,
                SpatialRelationship::Intersect,
                ProbeBy::Point
            )
            .unwrap(),
            None
        );
        assert!(ds.has_field("Protected"));
        assert!(ds.patches()[0].field(Field::Protected).is_null());
    }

    #[test]
    fn mask_is_tested_with_the_footprint() {
        let park = park();
        // Central point inside the mask strip, footprint straddling its edge.
        let mut ds = located(&[(1, 30.0, 250.0, 30.0), (2, 30.0, 225.0, 30.0)]);
        flag_membership(
            &mut ds,
            Field::InMask,
            park.mask.as_ref(),
            SpatialRelationship::CompletelyWithin,
            ProbeBy::Footprint,
        )
        .unwrap();
        let flags: Vec<Option<i64>> = ds.iter().map(|p| p.integer(Field::InMask)).collect();
        assert_eq!(flags, vec![Some(1), Some(0)]);
    }

    #[test]
    fn categorical_attributes_are_copied() {
        let park = park();
        let mut ds = located(&[(1, 30.0, 30.0, 30.0), (2, 210.0, 30.0, 30.0)]);
        let matched = join_attributes(
            &mut ds,
            Some(&park.land_mgmt),
            SpatialRelationship::CompletelyWithin,
            &[
                (Field::LandMgmt, LAND_MGMT_COLUMN),
                (Field::WildName, WILD_NAME_COLUMN),
            ],
        )
        .unwrap();
        assert_eq!(matched, 1);
        let first = &ds.patches()[0];
        assert_eq!(first.field(Field::LandMgmt).as_str(), Some("NPS"));
        assert_eq!(first.field(Field::WildName).as_str(), Some("Test Wilderness"));
        assert!(ds.patches()[1].field(Field::LandMgmt).is_null());

        join_attributes(
            &mut ds,
            Some(&park.watershed),
            SpatialRelationship::Intersect,
            &[(Field::Watershed, WATERSHED_COLUMN)],
        )
        .unwrap();
        assert_eq!(ds.patches()[1].field(Field::Watershed).as_str(), Some("East Creek"));
    }

    #[test]
    fn terrain_statistics_per_zone() {
        let park = park();
        // Rows 8-9 from the top, columns 0-1.
        let mut ds = located(&[(1, 0.0, 0.0, 60.0)]);
        add_zonal_statistic(&mut ds, Field::ElevMean, &park.dem, ZonalStatistic::Mean, "annualID")
            .unwrap();
        add_zonal_statistic(&mut ds, Field::Aspect, &park.aspect, ZonalStatistic::Majority, "annualID")
            .unwrap();
        let patch = &ds.patches()[0];
        assert_eq!(patch.field(Field::ElevMean).as_f64(), Some(1085.0));
        assert_eq!(patch.integer(Field::Aspect), Some(90));
    }

    #[test]
    fn vegetation_codes_from_table_or_synthesized() {
        let park = park();
        let mut ds = located(&[(1, 0.0, 0.0, 60.0), (2, 240.0, 0.0, 60.0)]);
        add_vegetation(&mut ds, &park.vegetation, park.veg_table.as_ref(), "T", "annualID").unwrap();
        let codes: Vec<Option<&str>> = ds.iter().map(|p| p.field(Field::VegCode).as_str()).collect();
        assert_eq!(codes, vec![Some("DFWH"), Some("SSPR")]);

        add_vegetation(&mut ds, &park.vegetation, None, "L", "annualID").unwrap();
        let codes: Vec<Option<&str>> = ds.iter().map(|p| p.field(Field::VegCode).as_str()).collect();
        assert_eq!(codes, vec![Some("L03"), Some("L04")]);
        assert_eq!(ds.patches()[0].integer(Field::VegValue), Some(3));
    }
}
