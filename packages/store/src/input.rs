//! Discovery and reading of yearly patch inputs (`change_YYYY.shp` or
//! `change_YYYY.geojson`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

use changedb_patch_models::{Dataset, Field, FieldSpec, FieldType, FieldValue, Patch};
use geo::{Contains as _, Coord, LineString, MultiPolygon, Polygon};
use shapefile::dbase;

use crate::StoreError;
use crate::collection::from_geojson;
use crate::paths::{DATASET_EXTENSION, year_of};

/// One yearly patch file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearlyInput {
    /// Year encoded in the file name.
    pub year: i32,
    /// File path.
    pub path: PathBuf,
}

/// Lists the yearly inputs of a directory in chronological order.
///
/// When both a shapefile and a `GeoJSON` file exist for a year, the
/// shapefile wins.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn discover_inputs(dir: &Path) -> Result<Vec<YearlyInput>, StoreError> {
    let entries = std::fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut by_year: BTreeMap<i32, PathBuf> = BTreeMap::new();
    for entry in entries {
        let path = entry
            .map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(year) = year_of(stem) else {
            continue;
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("shp") => {
                by_year.insert(year, path);
            }
            Some(ext) if ext == DATASET_EXTENSION => {
                by_year.entry(year).or_insert(path);
            }
            _ => {}
        }
    }

    Ok(by_year
        .into_iter()
        .map(|(year, path)| YearlyInput { year, path })
        .collect())
}

/// Reads a yearly input into a dataset named after the file stem.
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds non-polygon shapes.
pub fn read_input(input: &YearlyInput) -> Result<Dataset, StoreError> {
    let name = crate::paths::yearly_name(input.year);
    let dataset = match input.path.extension().and_then(|e| e.to_str()) {
        Some("shp") => read_shapefile(&name, &input.path)?,
        _ => {
            let text = std::fs::read_to_string(&input.path).map_err(|source| StoreError::Io {
                path: input.path.clone(),
                source,
            })?;
            let geojson = text.parse().map_err(|source| StoreError::GeoJson {
                path: input.path.clone(),
                source: Box::new(source),
            })?;
            from_geojson(&name, geojson).map_err(|source| StoreError::InvalidDataset {
                path: input.path.clone(),
                source,
            })?
        }
    };
    log::info!(
        "Read {} patches for {} from {}",
        dataset.len(),
        input.year,
        input.path.display()
    );
    Ok(dataset)
}

/// Reads a polygon shapefile and its attribute table.
///
/// # Errors
///
/// Returns an error if the shapefile or its `.dbf` cannot be read.
pub fn read_shapefile(name: &str, path: &Path) -> Result<Dataset, StoreError> {
    let shp_err = |source: shapefile::Error| StoreError::Shapefile {
        path: path.to_path_buf(),
        source,
    };

    let dbf = path.with_extension("dbf");
    let table = dbase::Reader::from_path(&dbf).map_err(|source| StoreError::Dbase {
        path: dbf.clone(),
        source,
    })?;
    let fields: Vec<FieldSpec> = table
        .fields()
        .iter()
        .map(|info| field_spec_for(info.name(), info.field_type(), info.length()))
        .collect();
    drop(table);

    let shapes =
        shapefile::read_as::<_, shapefile::Polygon, dbase::Record>(path).map_err(shp_err)?;
    let mut dataset = Dataset::with_fields(name, fields);
    for (polygon, record) in shapes {
        let mut attributes = BTreeMap::new();
        for spec in dataset.fields() {
            let value = record.get(&spec.name).map(dbase_value).unwrap_or_default();
            attributes.insert(spec.name.clone(), value);
        }
        dataset.push(Patch {
            geometry: to_multipolygon(&polygon),
            attributes,
        });
    }
    Ok(dataset)
}

fn field_spec_for(name: &str, field_type: dbase::FieldType, length: u8) -> FieldSpec {
    if let Ok(field) = Field::from_str(name) {
        return field.spec();
    }
    match field_type {
        dbase::FieldType::Character | dbase::FieldType::Memo | dbase::FieldType::Date => {
            FieldSpec::text(name, u16::from(length.max(1)))
        }
        dbase::FieldType::Integer | dbase::FieldType::Logical => {
            FieldSpec::new(name, FieldType::Long)
        }
        _ => FieldSpec::new(name, FieldType::Double),
    }
}

fn dbase_value(value: &dbase::FieldValue) -> FieldValue {
    match value {
        dbase::FieldValue::Character(s) => s.clone().into(),
        dbase::FieldValue::Numeric(v) => (*v).into(),
        dbase::FieldValue::Float(v) => v.map(f64::from).into(),
        dbase::FieldValue::Integer(v) => FieldValue::Integer(i64::from(*v)),
        dbase::FieldValue::Double(v) | dbase::FieldValue::Currency(v) => FieldValue::Double(*v),
        dbase::FieldValue::Logical(v) => v.map(i64::from).into(),
        dbase::FieldValue::Memo(s) => FieldValue::Text(s.clone()),
        dbase::FieldValue::Date(d) => d
            .map(|d| format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
            .into(),
        _ => FieldValue::Null,
    }
}

/// Converts shapefile rings into polygons, attaching each hole to the outer
/// ring that contains it.
fn to_multipolygon(polygon: &shapefile::Polygon) -> MultiPolygon<f64> {
    let ring_of = |points: &[shapefile::Point]| -> LineString<f64> {
        points.iter().map(|p| Coord { x: p.x, y: p.y }).collect()
    };

    let mut outers: Vec<Polygon<f64>> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();
    for ring in polygon.rings() {
        match ring {
            shapefile::PolygonRing::Outer(points) => {
                outers.push(Polygon::new(ring_of(points), vec![]));
            }
            shapefile::PolygonRing::Inner(points) => holes.push(ring_of(points)),
        }
    }

    for hole in holes {
        let owner = hole.0.first().and_then(|first| {
            outers
                .iter()
                .position(|outer| outer.contains(&geo::Point(*first)))
        });
        if let Some(i) = owner.or_else(|| outers.len().checked_sub(1)) {
            outers[i].interiors_push(hole);
        }
    }
    MultiPolygon(outers)
}
