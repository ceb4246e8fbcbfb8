//! Representative point coordinates of each patch.
//!
//! The central point (guaranteed to lie on the patch) is computed for every
//! patch in one pass. Patches where it cannot be computed go on a worklist
//! and are retried one at a time with the centroid, so one bad geometry
//! never stops the rest of the dataset.

use std::collections::VecDeque;

use changedb_patch_models::{CoordType, DATUM_NAD83, Dataset, Field, FieldValue, Patch};
use changedb_spatial::GeometryOps;
use changedb_spatial::projection::{Albers, Utm};
use geo::Point;

use crate::EnrichError;

/// Coordinate fields in the order they are added.
pub const COORDINATE_FIELDS: &[Field] = &[
    Field::CoordType,
    Field::XCoordM,
    Field::YCoordM,
    Field::UtmX,
    Field::UtmY,
    Field::Longitude,
    Field::Latitude,
    Field::Datum,
];

/// Projections the representative point is expressed in.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateSystems {
    /// Equal-area system of the patch geometries.
    pub albers: Albers,
    /// UTM system of `UTMX`/`UTMY`.
    pub utm: Utm,
}

impl CoordinateSystems {
    /// CONUS Albers patches with the given UTM zone.
    #[must_use]
    pub const fn conus(utm: Utm) -> Self {
        Self {
            albers: Albers::CONUS,
            utm,
        }
    }
}

/// Adds `CoordType`, `X_Coord_m`/`Y_Coord_m` (Albers), `UTMX`/`UTMY`,
/// `Longitude`/`Latitude` and `Datum` to every patch.
///
/// Returns the zone ids of the patches that fell back to their centroid.
///
/// # Errors
///
/// Returns [`EnrichError::Geometry`] if a patch has neither a central point
/// nor a centroid, or a schema error if a field cannot be written.
pub fn add_coordinates(
    dataset: &mut Dataset,
    geometry: &impl GeometryOps,
    systems: CoordinateSystems,
    zone_field: &str,
) -> Result<Vec<i64>, EnrichError> {
    for field in COORDINATE_FIELDS {
        dataset.add_known(*field);
    }

    let mut points: Vec<Option<(Point<f64>, CoordType)>> = dataset
        .iter()
        .map(|p| {
            geometry
                .central_point(&p.geometry)
                .map(|pt| (pt, CoordType::CentralPoint))
        })
        .collect();

    let mut worklist: VecDeque<usize> = points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.is_none().then_some(i))
        .collect();
    let mut fallbacks = Vec::new();
    while let Some(i) = worklist.pop_front() {
        let patch = &dataset.patches()[i];
        let centroid = geometry
            .centroid(&patch.geometry)
            .ok_or_else(|| EnrichError::Geometry {
                dataset: dataset.name.clone(),
                zone_id: patch.zone_id(zone_field),
            })?;
        points[i] = Some((centroid, CoordType::Centroid));
        if let Some(id) = patch.zone_id(zone_field) {
            fallbacks.push(id);
        }
    }

    if !fallbacks.is_empty() {
        log::warn!(
            "The central point could not be calculated for patch(es) from {} with {zone_field}(s) {fallbacks:?}. Centroid(s) calculated instead.",
            dataset.name
        );
    }

    for (i, point) in points.into_iter().enumerate() {
        let Some((point, coord_type)) = point else {
            continue;
        };
        for (field, value) in coordinate_values(point, coord_type, systems) {
            dataset.set(i, field, value)?;
        }
    }
    Ok(fallbacks)
}

fn coordinate_values(
    point: Point<f64>,
    coord_type: CoordType,
    systems: CoordinateSystems,
) -> [(Field, FieldValue); 8] {
    let (lon, lat) = systems.albers.inverse(point.x(), point.y());
    let (utm_x, utm_y) = systems.utm.forward(lon, lat);
    [
        (Field::CoordType, coord_type.to_string().into()),
        (Field::XCoordM, point.x().into()),
        (Field::YCoordM, point.y().into()),
        (Field::UtmX, utm_x.into()),
        (Field::UtmY, utm_y.into()),
        (Field::Longitude, lon.into()),
        (Field::Latitude, lat.into()),
        (Field::Datum, DATUM_NAD83.into()),
    ]
}

/// Representative point stored on a patch by [`add_coordinates`].
#[must_use]
pub fn representative_point(patch: &Patch) -> Option<Point<f64>> {
    let x = patch.field(Field::XCoordM).as_f64()?;
    let y = patch.field(Field::YCoordM).as_f64()?;
    Some(Point::new(x, y))
}

#[cfg(test)]
mod tests {
    use changedb_spatial::PlanarGeometry;
    use changedb_spatial::geometry::rectangle;
    use geo::MultiPolygon;

    use super::*;
    use crate::fixtures::yearly;

    /// Delegates to [`PlanarGeometry`] but refuses central points for
    /// patches wider than 100 m.
    struct FlakyCentralPoint;

    impl GeometryOps for FlakyCentralPoint {
        fn central_point(&self, footprint: &MultiPolygon<f64>) -> Option<Point<f64>> {
            (PlanarGeometry.area(footprint) < 100.0 * 100.0)
                .then(|| PlanarGeometry.central_point(footprint))
                .flatten()
        }

        fn centroid(&self, footprint: &MultiPolygon<f64>) -> Option<Point<f64>> {
            PlanarGeometry.centroid(footprint)
        }

        fn area(&self, footprint: &MultiPolygon<f64>) -> f64 {
            PlanarGeometry.area(footprint)
        }

        fn perimeter(&self, footprint: &MultiPolygon<f64>) -> f64 {
            PlanarGeometry.perimeter(footprint)
        }
    }

    fn systems() -> CoordinateSystems {
        CoordinateSystems::conus(Utm::nad83_north(10))
    }

    #[test]
    fn every_patch_gets_coordinates() {
        let mut ds = yearly(2001, &[(1, 0.0, 0.0, 30.0), (2, 60.0, 0.0, 60.0)]);
        let fallbacks = add_coordinates(&mut ds, &PlanarGeometry, systems(), "annualID").unwrap();
        assert!(fallbacks.is_empty());
        for patch in &ds {
            assert_eq!(patch.field(Field::CoordType).as_str(), Some("Central point"));
            assert_eq!(patch.field(Field::Datum).as_str(), Some("NAD83"));
            for field in &COORDINATE_FIELDS[1..7] {
                assert!(patch.field(*field).as_f64().is_some(), "{field} is null");
            }
            let point = representative_point(patch).unwrap();
            assert!(geo::Intersects::intersects(&patch.geometry, &point));
        }
    }

    #[test]
    fn failing_patches_fall_back_to_centroid_individually() {
        let mut ds = yearly(
            2001,
            &[(1, 0.0, 0.0, 30.0), (2, 0.0, 100.0, 150.0), (3, 60.0, 0.0, 30.0), (4, 200.0, 0.0, 120.0)],
        );
        let fallbacks = add_coordinates(&mut ds, &FlakyCentralPoint, systems(), "annualID").unwrap();
        assert_eq!(fallbacks, vec![2, 4]);
        let types: Vec<&str> = ds
            .iter()
            .map(|p| p.field(Field::CoordType).as_str().unwrap())
            .collect();
        assert_eq!(types, ["Central point", "Centroid", "Central point", "Centroid"]);
        let centroid = representative_point(&ds.patches()[1]).unwrap();
        assert!((centroid.x() - 75.0).abs() < 1e-9);
        assert!((centroid.y() - 175.0).abs() < 1e-9);
    }

    #[test]
    fn albers_point_maps_to_lat_lon_and_utm() {
        let systems = systems();
        // A point in the Olympic Mountains.
        let (x, y) = systems.albers.forward(-123.5, 47.8);
        let mut ds = yearly(2001, &[]);
        ds.push(Patch::new(rectangle(x - 15.0, y - 15.0, x + 15.0, y + 15.0)).with("annualID", 1));
        add_coordinates(&mut ds, &PlanarGeometry, systems, "annualID").unwrap();
        let patch = &ds.patches()[0];
        let lon = patch.field(Field::Longitude).as_f64().unwrap();
        let lat = patch.field(Field::Latitude).as_f64().unwrap();
        assert!((lon + 123.5).abs() < 1e-6);
        assert!((lat - 47.8).abs() < 1e-6);
        let utm_x = patch.field(Field::UtmX).as_f64().unwrap();
        let utm_y = patch.field(Field::UtmY).as_f64().unwrap();
        // West of the zone 10 central meridian (-123) and ~5,300 km north.
        assert!(utm_x < 500_000.0 && utm_x > 450_000.0);
        assert!(utm_y > 5_290_000.0 && utm_y < 5_300_000.0);
    }

    #[test]
    fn empty_geometry_is_a_geometry_error() {
        let mut ds = yearly(2001, &[]);
        ds.push(Patch::new(MultiPolygon(vec![])).with("annualID", 9));
        let err = add_coordinates(&mut ds, &PlanarGeometry, systems(), "annualID").unwrap_err();
        assert!(matches!(err, EnrichError::Geometry { zone_id: Some(9), .. }));
    }
}
