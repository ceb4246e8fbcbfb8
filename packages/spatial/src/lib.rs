#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-process geospatial provider for patch enrichment.
//!
//! Reference polygon layers are loaded from `GeoJSON` into R-tree indexes
//! for point-in-polygon, intersect and nearest lookups. Rasters are read
//! from `GeoTIFF` for zonal statistics. Projections to the equal-area,
//! UTM and geographic systems are computed in pure Rust.

pub mod geometry;
pub mod layer;
pub mod projection;
pub mod raster;
pub mod zonal;

use std::path::PathBuf;

pub use geometry::{GeometryOps, PlanarGeometry};
pub use layer::{LayerFeature, Probe, ReferenceLayer, SpatialRelationship};
pub use raster::Raster;
pub use zonal::{ZonalGeometry, ZonalStatistic, zonal_geometry, zonal_statistic};

/// Errors from loading spatial reference data.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Reading a file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A layer file is not valid `GeoJSON`.
    #[error("invalid GeoJSON in {path}: {source}")]
    GeoJson {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: Box<geojson::Error>,
    },
    /// A layer file is valid `GeoJSON` but not a feature collection.
    #[error("{path} is not a GeoJSON FeatureCollection")]
    NotAFeatureCollection {
        /// File path.
        path: PathBuf,
    },
    /// TIFF decoding or encoding failed.
    #[error("TIFF error in {path}: {source}")]
    Tiff {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: tiff::TiffError,
    },
    /// A TIFF has no pixel-scale/tiepoint georeferencing.
    #[error("{path} has no GeoTIFF georeferencing tags")]
    MissingGeoreference {
        /// File path.
        path: PathBuf,
    },
    /// A TIFF uses a pixel type that cannot be read as numbers.
    #[error("{path} has an unsupported pixel type")]
    UnsupportedPixelType {
        /// File path.
        path: PathBuf,
    },
    /// Raster data does not match its declared dimensions.
    #[error("raster holds {actual} cells, expected {expected}")]
    RasterShape {
        /// `cols * rows`.
        expected: usize,
        /// Cells supplied.
        actual: usize,
    },
}
