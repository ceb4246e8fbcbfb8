//! Zonal statistics and zonal geometry over patch footprints.
//!
//! Each patch footprint is a zone. Statistics read the raster cells whose
//! centers fall on the footprint; zonal geometry rasterizes the footprint on
//! a grid of the processing cell size snapped to the coordinate origin.

use geo::{BoundingRect as _, Coord, Intersects as _, MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::geometry::distance_to_boundary;
use crate::raster::Raster;

/// Statistic summarising a zone's cell values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ZonalStatistic {
    /// Arithmetic mean.
    Mean,
    /// Most frequent value; ties go to the smallest value.
    Majority,
}

/// Computes a statistic over the raster cells under a footprint.
///
/// Returns `None` when no data cell center falls on the footprint.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn zonal_statistic(
    raster: &Raster,
    footprint: &MultiPolygon<f64>,
    statistic: ZonalStatistic,
) -> Option<f64> {
    let mut values = raster.cells_in(footprint);
    if values.is_empty() {
        return None;
    }
    match statistic {
        ZonalStatistic::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        ZonalStatistic::Majority => {
            values.sort_by(f64::total_cmp);
            let mut best = (values[0], 0_usize);
            let mut run = (values[0], 0_usize);
            for v in values {
                if v.total_cmp(&run.0).is_eq() {
                    run.1 += 1;
                } else {
                    run = (v, 1);
                }
                if run.1 > best.1 {
                    best = run;
                }
            }
            Some(best.0)
        }
    }
}

/// Shape descriptors of a rasterized zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalGeometry {
    /// Largest distance from a zone cell center to the zone boundary.
    pub thickness: f64,
    /// Semi-major axis of the ellipse with the zone's area and second
    /// moments.
    pub major_axis: f64,
    /// Semi-minor axis of that ellipse.
    pub minor_axis: f64,
    /// Angle of the major axis in degrees, counterclockwise from the
    /// x-axis, in `[0, 180)`.
    pub orientation: f64,
}

/// Rasterizes a footprint on a `cell_size` grid anchored at the origin and
/// derives its ellipse descriptors and thickness.
///
/// Returns `None` when the footprint covers no cell center.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::similar_names
)]
pub fn zonal_geometry(footprint: &MultiPolygon<f64>, cell_size: f64) -> Option<ZonalGeometry> {
    if cell_size <= 0.0 {
        return None;
    }
    let rect = footprint.bounding_rect()?;
    let c0 = (rect.min().x / cell_size).floor() as i64;
    let c1 = (rect.max().x / cell_size).floor() as i64;
    let r0 = (rect.min().y / cell_size).floor() as i64;
    let r1 = (rect.max().y / cell_size).floor() as i64;

    let mut centers: Vec<Coord<f64>> = Vec::new();
    for r in r0..=r1 {
        for c in c0..=c1 {
            let center = Coord {
                x: (c as f64 + 0.5) * cell_size,
                y: (r as f64 + 0.5) * cell_size,
            };
            if footprint.intersects(&Point(center)) {
                centers.push(center);
            }
        }
    }
    if centers.is_empty() {
        return None;
    }

    let n = centers.len() as f64;
    let mx = centers.iter().map(|c| c.x).sum::<f64>() / n;
    let my = centers.iter().map(|c| c.y).sum::<f64>() / n;
    // Each cell contributes its own spread (a uniform square has variance
    // s^2 / 12 along each axis).
    let cell_var = cell_size * cell_size / 12.0;
    let sxx = centers.iter().map(|c| (c.x - mx).powi(2)).sum::<f64>() / n + cell_var;
    let syy = centers.iter().map(|c| (c.y - my).powi(2)).sum::<f64>() / n + cell_var;
    let sxy = centers.iter().map(|c| (c.x - mx) * (c.y - my)).sum::<f64>() / n;

    let half_trace = (sxx + syy) / 2.0;
    let root = ((sxx - syy) / 2.0).hypot(sxy);
    let lambda1 = half_trace + root;
    let lambda2 = (half_trace - root).max(0.0);

    // A uniform ellipse with semi-axes a, b has axis variances a^2/4, b^2/4.
    let mut a = 2.0 * lambda1.sqrt();
    let mut b = 2.0 * lambda2.sqrt();
    let area = n * cell_size * cell_size;
    if a > 0.0 && b > 0.0 {
        let k = (area / (std::f64::consts::PI * a * b)).sqrt();
        a *= k;
        b *= k;
    }

    let mut orientation = (0.5 * (2.0 * sxy).atan2(sxx - syy)).to_degrees();
    if orientation < 0.0 {
        orientation += 180.0;
    }
    if orientation >= 180.0 {
        orientation -= 180.0;
    }

    let thickness = centers
        .iter()
        .map(|c| distance_to_boundary(*c, footprint))
        .fold(0.0, f64::max);

    Some(ZonalGeometry {
        thickness,
        major_axis: a,
        minor_axis: b,
        orientation,
    })
}
