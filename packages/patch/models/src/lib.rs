#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Patch and dataset types for the forest change database.
//!
//! A patch is one polygon of detected land-cover change for one year. Yearly
//! datasets are enriched with derived attributes and folded into a
//! cumulative multi-year dataset, whose records are identified by
//! `PatchName`.

pub mod dataset;
pub mod field;

pub use dataset::{Dataset, Patch, SchemaError};
pub use field::{
    ATTRIBUTE_FIELDS, EVENT_FIELDS, Field, FieldSpec, FieldType, FieldValue, LABEL_FIELDS,
};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// `EventType` stamped on patches auto-labeled by the mask rule.
pub const EVENT_TYPE_MASK: &str = "Mask";

/// `EventType` of model-generated labels, excluded from GEE export.
pub const EVENT_TYPE_MODEL: &str = "Model";

/// `ChangeType` stamped on mask-labeled patches.
pub const CHANGE_TYPE_ANNUAL_VARIABILITY: &str = "Annual Variability";

/// `LabeledBy` stamped on automatically labeled patches.
pub const LABELED_BY_GEOPROCESSING: &str = "Geoprocessing";

/// Datum of stored UTM and geographic coordinates.
pub const DATUM_NAD83: &str = "NAD83";

/// Datum of latitude/longitude in GEE exports.
pub const DATUM_WGS84: &str = "WGS84";

/// Which representative point was used for a patch's coordinates.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum CoordType {
    /// A point guaranteed to lie inside the polygon.
    #[strum(serialize = "Central point")]
    #[serde(rename = "Central point")]
    CentralPoint,
    /// The polygon's center of mass, used when no interior point exists.
    #[strum(serialize = "Centroid")]
    #[serde(rename = "Centroid")]
    Centroid,
}
