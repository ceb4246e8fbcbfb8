#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Attribute enrichment for yearly change patches.
//!
//! Each yearly dataset passes through the same ordered stages: field reset,
//! optional clip to the study area, representative coordinates, reference
//! layer joins, vegetation and terrain statistics, zonal geometry, shape
//! ratio, event fields and the overlap flag against the previous year.
//! [`run()`] folds the enriched years into the cumulative dataset and
//! finalises it with `Park` and `PatchName`; [`select`] re-derives the
//! attributes of hand-picked patches of a finalised dataset, and
//! [`events::join_labels_to_patches`] applies curated labels afterwards.

pub mod attributes;
pub mod coords;
pub mod events;
pub mod joiner;
pub mod metrics;
pub mod naming;
pub mod overlap;
pub mod park;
pub mod progress;
pub mod run;
pub mod select;

use std::path::PathBuf;

use changedb_lookup::LookupError;
use changedb_patch_models::SchemaError;
use changedb_spatial::SpatialError;
use changedb_store::StoreError;

pub use attributes::{AttributeOptions, add_attributes};
pub use park::{LayerKind, ParkConfig, ParkLayers, Relationships};
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use run::{Resume, RunOptions, RunProgress, RunSummary, run};

/// Errors from enrichment and run orchestration.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Fatal configuration problem, raised before any dataset is modified.
    #[error("configuration error: {0}")]
    Config(String),
    /// Neither a central point nor a centroid exists for a patch.
    #[error("no representative point for patch {zone_id:?} of {dataset}")]
    Geometry {
        /// Dataset name.
        dataset: String,
        /// Zone identifier of the patch, when it has one.
        zone_id: Option<i64>,
    },
    /// A yearly patch would duplicate a `(yod, zone id)` pair already merged.
    #[error("{dataset} already holds patch {zone_id} of {year}")]
    DuplicatePatch {
        /// Cumulative dataset name.
        dataset: String,
        /// Year of disturbance.
        year: i64,
        /// Zone identifier.
        zone_id: i64,
    },
    /// Reading the park configuration failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The park configuration file is not valid TOML.
    #[error("invalid park configuration {path}: {source}")]
    ParkConfig {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Dataset store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reference layer or raster failure.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
    /// Lookup service failure.
    #[error(transparent)]
    Lookup(#[from] LookupError),
    /// A value did not fit the dataset schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
