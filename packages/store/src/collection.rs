//! Dataset persistence as `GeoJSON` feature collections.
//!
//! The column schema travels in a `fields` foreign member so column types,
//! lengths and order survive a save/load cycle. Collections without that
//! member get a schema inferred from their properties.

use std::collections::BTreeMap;
use std::str::FromStr as _;

use changedb_patch_models::{Dataset, Field, FieldSpec, FieldType, FieldValue, Patch};
use changedb_spatial::geometry::multipolygon_from_geojson;
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};

/// Maximum text length used for inferred text columns.
const INFERRED_TEXT_LENGTH: u16 = 254;

/// Converts a dataset into a feature collection.
///
/// # Errors
///
/// Returns an error if the schema cannot be serialized.
pub fn to_feature_collection(dataset: &Dataset) -> Result<FeatureCollection, serde_json::Error> {
    let features = dataset
        .iter()
        .map(|patch| {
            let properties: JsonObject = dataset
                .fields()
                .iter()
                .map(|spec| (spec.name.clone(), patch.get(&spec.name).to_json()))
                .collect();
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&patch.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let mut foreign = JsonObject::new();
    foreign.insert(
        "name".to_owned(),
        serde_json::Value::String(dataset.name.clone()),
    );
    foreign.insert("fields".to_owned(), serde_json::to_value(dataset.fields())?);

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign),
    })
}

/// Why a feature collection could not be turned into a dataset.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The document is not a feature collection.
    #[error("not a FeatureCollection")]
    NotAFeatureCollection,
    /// The `fields` member is malformed.
    #[error("invalid field schema: {0}")]
    Schema(#[from] serde_json::Error),
    /// A feature has no areal geometry.
    #[error("feature {0} has no polygon geometry")]
    Geometry(usize),
}

/// Builds a dataset from a parsed `GeoJSON` document.
///
/// # Errors
///
/// Returns an error if the document is not a feature collection of
/// polygons or its schema member is malformed.
pub fn from_geojson(name: &str, geojson: GeoJson) -> Result<Dataset, ConversionError> {
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(ConversionError::NotAFeatureCollection);
    };

    let declared = collection
        .foreign_members
        .as_ref()
        .and_then(|fm| fm.get("fields"))
        .cloned()
        .map(serde_json::from_value::<Vec<FieldSpec>>)
        .transpose()?;

    let mut rows = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let geometry: MultiPolygon<f64> = feature
            .geometry
            .and_then(multipolygon_from_geojson)
            .ok_or(ConversionError::Geometry(i))?;
        let attributes: BTreeMap<String, FieldValue> = feature
            .properties
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect();
        rows.push((geometry, attributes));
    }

    let fields = declared.unwrap_or_else(|| infer_fields(rows.iter().map(|(_, a)| a)));
    let mut dataset = Dataset::with_fields(name, fields);
    for (geometry, attributes) in rows {
        dataset.push(Patch {
            geometry,
            attributes,
        });
    }
    Ok(dataset)
}

/// Infers column specs from attribute maps, sorted by column name.
///
/// Known field names use their registered spec; other columns are typed from
/// their values.
pub fn infer_fields<'a>(
    rows: impl Iterator<Item = &'a BTreeMap<String, FieldValue>>,
) -> Vec<FieldSpec> {
    let mut kinds: BTreeMap<String, Option<FieldType>> = BTreeMap::new();
    for attributes in rows {
        for (name, value) in attributes {
            let seen = kinds.entry(name.clone()).or_insert(None);
            let kind = match value {
                FieldValue::Null => continue,
                FieldValue::Integer(_) => FieldType::Long,
                FieldValue::Double(_) => FieldType::Double,
                FieldValue::Text(_) => FieldType::Text,
            };
            *seen = Some(match (*seen, kind) {
                (None, k) => k,
                (Some(FieldType::Long), FieldType::Double)
                | (Some(FieldType::Double), FieldType::Long) => FieldType::Double,
                (Some(prev), k) if prev == k => k,
                _ => FieldType::Text,
            });
        }
    }

    kinds
        .into_iter()
        .map(|(name, kind)| {
            if let Ok(field) = Field::from_str(&name) {
                return field.spec();
            }
            match kind.unwrap_or(FieldType::Text) {
                FieldType::Text => FieldSpec::text(name, INFERRED_TEXT_LENGTH),
                other => FieldSpec::new(name, other),
            }
        })
        .collect()
}
