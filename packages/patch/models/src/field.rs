//! Typed attribute fields.
//!
//! Every attribute the pipeline derives is a [`Field`] variant with a fixed
//! [`FieldSpec`] (storage type and text length). Stages look fields up
//! through this table instead of assembling names and expressions as
//! strings at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Storage type of a column in a patch dataset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FieldType {
    /// 16-bit integer (flags, small codes, years).
    Short,
    /// 32-bit integer.
    Long,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Text with a maximum length.
    Text,
}

impl FieldType {
    /// Whether values of this type are stored as integers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Short | Self::Long)
    }

    /// Whether values of this type are numeric.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// Name, type and (for text) length of a dataset column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name as stored.
    pub name: String,
    /// Storage type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Maximum text length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
}

impl FieldSpec {
    /// Creates a non-text column spec.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            length: None,
        }
    }

    /// Creates a text column spec with a maximum length.
    #[must_use]
    pub fn text(name: impl Into<String>, length: u16) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
            length: Some(length),
        }
    }
}

/// A single attribute value.
///
/// The underlying store cannot always represent null, so exported data may
/// carry sentinel zeros or single-space strings; [`FieldValue::is_blank`]
/// treats both `Null` and whitespace-only text as empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// No value.
    #[default]
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Double(f64),
    /// Text value.
    Text(String),
}

impl FieldValue {
    /// Shared null value handed out for absent attributes.
    pub const NULL: Self = Self::Null;

    /// Whether the value is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is `Null` or whitespace-only text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Integer(_) | Self::Double(_) => false,
        }
    }

    /// Integer view of the value.
    ///
    /// Doubles convert only when they hold a whole number; numeric text is
    /// parsed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Double(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Double(_) | Self::Null => None,
        }
    }

    /// Floating point view of the value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// Text view of the value (only for `Text`).
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value to the representation used by `field_type`.
    ///
    /// Values that cannot be represented become `Null`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn coerce(self, field_type: FieldType) -> Self {
        match (self, field_type) {
            (Self::Null, _) => Self::Null,
            (Self::Integer(v), FieldType::Short | FieldType::Long) => Self::Integer(v),
            (Self::Double(v), FieldType::Short | FieldType::Long) => {
                if v.is_finite() {
                    Self::Integer(v.round_ties_even() as i64)
                } else {
                    Self::Null
                }
            }
            (Self::Text(s), FieldType::Short | FieldType::Long) => {
                s.trim().parse().map_or(Self::Null, Self::Integer)
            }
            (value @ Self::Integer(_), FieldType::Float | FieldType::Double) => {
                value.as_f64().map_or(Self::Null, Self::Double)
            }
            (Self::Double(v), FieldType::Float | FieldType::Double) => Self::Double(v),
            (Self::Text(s), FieldType::Float | FieldType::Double) => {
                s.trim().parse().map_or(Self::Null, Self::Double)
            }
            (Self::Text(s), FieldType::Text) => Self::Text(s),
            (value, FieldType::Text) => Self::Text(value.to_string()),
        }
    }
}

impl FieldValue {
    /// Converts a JSON property value.
    ///
    /// Booleans become 0/1; arrays and objects are stored as their JSON text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Integer(i64::from(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Double))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Converts to a JSON property value. Non-finite doubles become null.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(v) => serde_json::Value::from(*v),
            Self::Double(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Attribute fields known to the pipeline.
///
/// The `Display`/`AsRef<str>` form is the stored column name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
pub enum Field {
    // ── Source fields ───────────────────────────────────
    /// Within-year unique patch identifier (zone id).
    #[strum(serialize = "annualID")]
    AnnualId,
    /// Year of disturbance.
    #[strum(serialize = "yod")]
    Yod,
    /// Within-year index used in the patch name.
    #[strum(serialize = "index")]
    Index,
    /// Patch area in square meters.
    #[strum(serialize = "area")]
    Area,
    /// Patch perimeter in meters.
    #[strum(serialize = "perim")]
    Perim,

    // ── Coordinates ─────────────────────────────────────
    /// Which representative point was used.
    CoordType,
    /// Equal-area X of the representative point.
    #[strum(serialize = "X_Coord_m")]
    XCoordM,
    /// Equal-area Y of the representative point.
    #[strum(serialize = "Y_Coord_m")]
    YCoordM,
    /// UTM easting.
    #[strum(serialize = "UTMX")]
    UtmX,
    /// UTM northing.
    #[strum(serialize = "UTMY")]
    UtmY,
    /// Geographic latitude.
    Latitude,
    /// Geographic longitude.
    Longitude,
    /// Datum of the UTM and geographic coordinates.
    Datum,
    /// Datum of exported latitude/longitude.
    #[strum(serialize = "LLDatum")]
    LlDatum,

    // ── Reference layers ────────────────────────────────
    /// Wilderness name.
    WildName,
    /// Land management agency.
    LandMgmt,
    /// Watershed name.
    Watershed,
    /// Inside the park boundary.
    InPark,
    /// Inside the park buffer.
    InBuffer,
    /// Completely inside the elevation mask.
    InMask,
    /// Inside a protected area.
    Protected,
    /// East or west of the crest.
    EastWest,
    /// Majority vegetation raster value.
    VegValue,
    /// Vegetation code.
    VegCode,
    /// Mean elevation.
    ElevMean,
    /// Mean slope.
    SlopeMean,
    /// Majority aspect class.
    Aspect,

    // ── Shape metrics ───────────────────────────────────
    /// Perimeter/area shape ratio.
    #[strum(serialize = "paratio")]
    Paratio,
    /// Zonal thickness.
    #[strum(serialize = "THICKNESS")]
    Thickness,
    /// Zonal major axis.
    #[strum(serialize = "MAJORAXIS")]
    MajorAxis,
    /// Zonal minor axis.
    #[strum(serialize = "MINORAXIS")]
    MinorAxis,
    /// Zonal orientation in degrees.
    #[strum(serialize = "ORIENTATION")]
    Orientation,

    // ── Events ──────────────────────────────────────────
    /// Disturbance event type.
    EventType,
    /// Change type.
    ChangeType,
    /// Label confidence, 1-3.
    Confidence,
    /// Alternate change type.
    AltType,
    /// Free text change description.
    ChangeDesc,
    /// Date the label was assigned.
    EventDate,
    /// Who assigned the label.
    LabeledBy,
    /// Disturbance seen in a prior run.
    PriorRun,
    /// Post-disturbance flag.
    PostDist,
    /// Named disturbance.
    DistName,
    /// Year of the named disturbance.
    DistYear,
    /// Patch was split.
    Split,
    /// Map patch reference.
    MapPatch,

    // ── Cumulative dataset ──────────────────────────────
    /// Overlaps the previous year's patches.
    OverlapPrv,
    /// Four-letter park code.
    Park,
    /// Global patch identity.
    PatchName,
}

impl Field {
    /// Storage spec for this field.
    #[must_use]
    pub fn spec(self) -> FieldSpec {
        let name = self.as_ref();
        match self {
            Self::AnnualId | Self::Area | Self::Perim | Self::VegValue => {
                FieldSpec::new(name, FieldType::Long)
            }
            Self::Yod
            | Self::InPark
            | Self::InBuffer
            | Self::InMask
            | Self::Protected
            | Self::Aspect
            | Self::Confidence
            | Self::PriorRun
            | Self::PostDist
            | Self::DistYear
            | Self::Split
            | Self::OverlapPrv => FieldSpec::new(name, FieldType::Short),
            Self::ElevMean | Self::SlopeMean => FieldSpec::new(name, FieldType::Float),
            Self::XCoordM
            | Self::YCoordM
            | Self::UtmX
            | Self::UtmY
            | Self::Latitude
            | Self::Longitude
            | Self::Paratio
            | Self::Thickness
            | Self::MajorAxis
            | Self::MinorAxis
            | Self::Orientation => FieldSpec::new(name, FieldType::Double),
            Self::Index => FieldSpec::text(name, 10),
            Self::CoordType => FieldSpec::text(name, 13),
            Self::Datum | Self::LlDatum => FieldSpec::text(name, 5),
            Self::EastWest | Self::VegCode | Self::Park => FieldSpec::text(name, 4),
            Self::EventType | Self::EventDate => FieldSpec::text(name, 10),
            Self::ChangeType | Self::AltType => FieldSpec::text(name, 25),
            Self::LandMgmt | Self::Watershed | Self::LabeledBy | Self::MapPatch | Self::PatchName => {
                FieldSpec::text(name, 50)
            }
            Self::WildName | Self::DistName => FieldSpec::text(name, 100),
            Self::ChangeDesc => FieldSpec::text(name, 500),
        }
    }
}

/// Fields derived by attribute enrichment.
///
/// These are deleted before attributes are (re)derived so every stage adds
/// its fields to a clean schema.
pub const ATTRIBUTE_FIELDS: &[Field] = &[
    Field::CoordType,
    Field::XCoordM,
    Field::YCoordM,
    Field::UtmX,
    Field::UtmY,
    Field::Latitude,
    Field::Longitude,
    Field::Datum,
    Field::WildName,
    Field::LandMgmt,
    Field::Watershed,
    Field::InPark,
    Field::InBuffer,
    Field::InMask,
    Field::Protected,
    Field::EastWest,
    Field::VegValue,
    Field::VegCode,
    Field::ElevMean,
    Field::SlopeMean,
    Field::Aspect,
    Field::Thickness,
    Field::MajorAxis,
    Field::MinorAxis,
    Field::Orientation,
    Field::Paratio,
];

/// Event classification fields, in schema order.
pub const EVENT_FIELDS: &[Field] = &[
    Field::EventType,
    Field::ChangeType,
    Field::Confidence,
    Field::AltType,
    Field::ChangeDesc,
    Field::EventDate,
    Field::LabeledBy,
    Field::PriorRun,
    Field::PostDist,
    Field::DistName,
    Field::DistYear,
    Field::Split,
    Field::MapPatch,
];

/// Event fields supplied by the curated label table.
pub const LABEL_FIELDS: &[Field] = &[
    Field::EventType,
    Field::ChangeType,
    Field::Confidence,
    Field::AltType,
    Field::ChangeDesc,
    Field::DistYear,
    Field::DistName,
];

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn field_names_round_trip() {
        assert_eq!(Field::XCoordM.as_ref(), "X_Coord_m");
        assert_eq!(Field::AnnualId.to_string(), "annualID");
        assert_eq!(Field::from_str("ORIENTATION").unwrap(), Field::Orientation);
        assert_eq!(Field::from_str("EventType").unwrap(), Field::EventType);
    }

    #[test]
    fn specs_have_expected_types() {
        assert_eq!(Field::Confidence.spec().field_type, FieldType::Short);
        assert_eq!(Field::CoordType.spec().length, Some(13));
        assert_eq!(Field::ElevMean.spec().field_type, FieldType::Float);
    }

    #[test]
    fn blank_values() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::from(" ").is_blank());
        assert!(!FieldValue::from("Dist").is_blank());
        assert!(!FieldValue::Integer(0).is_blank());
    }

    #[test]
    fn coerce_rounds_half_to_even() {
        assert_eq!(
            FieldValue::Double(2.5).coerce(FieldType::Long),
            FieldValue::Integer(2)
        );
        assert_eq!(
            FieldValue::Double(3.5).coerce(FieldType::Long),
            FieldValue::Integer(4)
        );
        assert_eq!(
            FieldValue::Integer(7).coerce(FieldType::Text),
            FieldValue::from("7")
        );
        assert_eq!(
            FieldValue::from("x").coerce(FieldType::Short),
            FieldValue::Null
        );
    }

    #[test]
    fn integer_views() {
        assert_eq!(FieldValue::Double(2001.0).as_i64(), Some(2001));
        assert_eq!(FieldValue::Double(2001.5).as_i64(), None);
        assert_eq!(FieldValue::from(" 42 ").as_i64(), Some(42));
    }
}
