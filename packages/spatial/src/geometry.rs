//! Planar geometry primitives for patch footprints.

use geo::{Area as _, BoundingRect as _, Centroid as _, InteriorPoint as _, Intersects as _};
use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use rstar::AABB;

/// Geometry calculations the pipeline needs per patch.
///
/// Implementations return `None` when a value cannot be computed for a
/// geometry (empty or degenerate footprints) instead of failing the whole
/// dataset.
pub trait GeometryOps {
    /// A point guaranteed to lie on the footprint.
    fn central_point(&self, footprint: &MultiPolygon<f64>) -> Option<Point<f64>>;

    /// Center of mass of the footprint (may fall outside concave shapes).
    fn centroid(&self, footprint: &MultiPolygon<f64>) -> Option<Point<f64>>;

    /// Planar area in square map units.
    fn area(&self, footprint: &MultiPolygon<f64>) -> f64;

    /// Total length of all rings in map units.
    fn perimeter(&self, footprint: &MultiPolygon<f64>) -> f64;
}

/// [`GeometryOps`] over projected planar coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarGeometry;

impl GeometryOps for PlanarGeometry {
    fn central_point(&self, footprint: &MultiPolygon<f64>) -> Option<Point<f64>> {
        let point = footprint.interior_point()?;
        (coord_is_finite(point.0) && footprint.intersects(&point)).then_some(point)
    }

    fn centroid(&self, footprint: &MultiPolygon<f64>) -> Option<Point<f64>> {
        footprint.centroid().filter(|p| coord_is_finite(p.0))
    }

    fn area(&self, footprint: &MultiPolygon<f64>) -> f64 {
        footprint.unsigned_area()
    }

    fn perimeter(&self, footprint: &MultiPolygon<f64>) -> f64 {
        footprint
            .iter()
            .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
            .map(ring_length)
            .sum()
    }
}

fn coord_is_finite(c: Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

fn ring_length(ring: &LineString<f64>) -> f64 {
    ring.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

/// Shortest distance from `point` to any ring of `footprint`.
#[must_use]
pub fn distance_to_boundary(point: Coord<f64>, footprint: &MultiPolygon<f64>) -> f64 {
    footprint
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .flat_map(LineString::lines)
        .map(|line| point_segment_distance(point, line.start, line.end))
        .fold(f64::INFINITY, f64::min)
}

/// Distance from `p` to the segment `a`-`b`.
#[must_use]
pub fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx.mul_add(dx, dy * dy);
    let t = if len2 > 0.0 {
        ((p.x - a.x).mul_add(dx, (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = t.mul_add(dx, a.x);
    let cy = t.mul_add(dy, a.y);
    (p.x - cx).hypot(p.y - cy)
}

/// Parse a `GeoJSON` geometry string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        multipolygon_from_geojson(geom)
    } else {
        None
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`], if it is areal.
#[must_use]
pub fn multipolygon_from_geojson(geom: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: Geometry<f64> = geom.try_into().ok()?;
    match geo_geom {
        Geometry::MultiPolygon(mp) => Some(mp),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Axis-aligned rectangle as a single-polygon [`MultiPolygon`].
#[must_use]
pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![Polygon::new(
        LineString::from(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]),
        vec![],
    )])
}
