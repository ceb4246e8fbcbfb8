//! Shapefile export of labeled disturbances for Earth Engine.
//!
//! Geometry stays in the equal-area projection of the database (the `.prj`
//! sidecar says so) while `Latitude`/`Longitude` are recomputed from the
//! stored equal-area coordinates and stamped `LLDatum = WGS84`. DBF column
//! names are cut to the format's ten characters.

use std::path::{Path, PathBuf};

use changedb_lookup::LookupService;
use changedb_patch_models::{DATUM_WGS84, Dataset, Field, FieldSpec, FieldType, FieldValue};
use changedb_spatial::projection::{ALBERS_CONUS_ESRI_WKT, Albers};
use changedb_store::paths::ensure_dir;
use geo::MultiPolygon;
use shapefile::dbase;

use crate::fields::GEE_FIELDS;
use crate::table::{ExportRow, ExportTable, extract, retain_events};
use crate::validate::{ExportKind, validate};
use crate::{ExportError, io_error, unique_path};

/// Longest column name a `.dbf` header holds.
pub const DBF_NAME_LENGTH: usize = 10;

const DBF_TEXT_LENGTH: u8 = 254;
const DBF_INTEGER_LENGTH: u8 = 10;
const DBF_DECIMAL_LENGTH: u8 = 20;
const DBF_DECIMALS: u8 = 8;

/// Column name as stored in the `.dbf` (`ORIENTATION` becomes `ORIENTATIO`).
#[must_use]
pub fn dbf_name(name: &str) -> &str {
    name.char_indices()
        .nth(DBF_NAME_LENGTH)
        .map_or(name, |(end, _)| &name[..end])
}

/// Folder receiving the GEE export of a dataset (`{name}_GEE`, suffixed
/// `_1`, `_2`, ... when taken).
#[must_use]
pub fn gee_folder(out_dir: &Path, dataset_name: &str) -> PathBuf {
    unique_path(&out_dir.join(format!("{dataset_name}_GEE")))
}

/// Replaces `Latitude`/`Longitude` with WGS84 degrees unprojected from
/// `X_Coord_m`/`Y_Coord_m` and adds `LLDatum`.
///
/// NAD83 and WGS84 are treated as the same datum.
pub fn add_wgs84_coordinates(table: &mut ExportTable) {
    let x = table.column(Field::XCoordM.as_ref());
    let y = table.column(Field::YCoordM.as_ref());
    let geographic = move |row: &ExportRow| {
        let x = x.and_then(|i| row.values[i].as_f64())?;
        let y = y.and_then(|i| row.values[i].as_f64())?;
        Some(Albers::CONUS.inverse(x, y))
    };
    table.set_column(Field::Latitude.spec(), |row| {
        geographic(row).map(|(_, lat)| lat).into()
    });
    table.set_column(Field::Longitude.spec(), |row| {
        geographic(row).map(|(lon, _)| lon).into()
    });
    table.set_column(Field::LlDatum.spec(), |_| DATUM_WGS84.into());
}

fn field_name(name: &str) -> Result<dbase::FieldName, ExportError> {
    dbase::FieldName::try_from(dbf_name(name))
        .map_err(|_| ExportError::FieldName(name.to_owned()))
}

fn text_length(spec: &FieldSpec) -> u8 {
    spec.length
        .and_then(|l| u8::try_from(l).ok())
        .unwrap_or(DBF_TEXT_LENGTH)
        .clamp(1, DBF_TEXT_LENGTH)
}

fn table_builder(columns: &[FieldSpec]) -> Result<dbase::TableWriterBuilder, ExportError> {
    let mut builder = dbase::TableWriterBuilder::new();
    for column in columns {
        let name = field_name(&column.name)?;
        builder = match column.field_type {
            FieldType::Text => builder.add_character_field(name, text_length(column)),
            FieldType::Short | FieldType::Long => {
                builder.add_numeric_field(name, DBF_INTEGER_LENGTH, 0)
            }
            FieldType::Float | FieldType::Double => {
                builder.add_numeric_field(name, DBF_DECIMAL_LENGTH, DBF_DECIMALS)
            }
        };
    }
    Ok(builder)
}

fn dbf_value(spec: &FieldSpec, value: &FieldValue) -> dbase::FieldValue {
    match spec.field_type {
        FieldType::Text => {
            let limit = usize::from(text_length(spec));
            dbase::FieldValue::Character(
                (!value.is_null()).then(|| value.to_string().chars().take(limit).collect()),
            )
        }
        FieldType::Short | FieldType::Long => {
            dbase::FieldValue::Numeric(value.as_f64().map(f64::round))
        }
        FieldType::Float | FieldType::Double => {
            let scale = 10_f64.powi(i32::from(DBF_DECIMALS));
            dbase::FieldValue::Numeric(value.as_f64().map(|v| (v * scale).round() / scale))
        }
    }
}

fn to_shape(geometry: &MultiPolygon<f64>) -> Option<shapefile::Polygon> {
    let ring = |line: &geo::LineString<f64>| -> Vec<shapefile::Point> {
        line.coords()
            .map(|c| shapefile::Point::new(c.x, c.y))
            .collect()
    };
    let mut rings = Vec::new();
    for polygon in geometry {
        if polygon.exterior().0.is_empty() {
            continue;
        }
        rings.push(shapefile::PolygonRing::Outer(ring(polygon.exterior())));
        for hole in polygon.interiors() {
            rings.push(shapefile::PolygonRing::Inner(ring(hole)));
        }
    }
    (!rings.is_empty()).then(|| shapefile::Polygon::with_rings(rings))
}

/// Writes `table` as `{folder}/{table.name}.shp` with its `.dbf` and an
/// equal-area `.prj`.
///
/// # Errors
///
/// Returns an error if a patch has no geometry or a file cannot be
/// written.
pub fn write_shapefile(table: &ExportTable, folder: &Path) -> Result<PathBuf, ExportError> {
    let shapes = table
        .rows
        .iter()
        .map(|row| {
            to_shape(&row.geometry).ok_or_else(|| ExportError::EmptyGeometry {
                dataset: table.name.clone(),
                patch_name: table
                    .value(row, Field::PatchName.as_ref())
                    .as_str()
                    .map(str::to_owned),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    ensure_dir(folder).map_err(|e| io_error(folder, e))?;
    let path = folder.join(format!("{}.shp", table.name));
    let shp_err = |source: shapefile::Error| ExportError::Shapefile {
        path: path.clone(),
        source,
    };

    let mut writer =
        shapefile::Writer::from_path(&path, table_builder(&table.columns)?).map_err(shp_err)?;
    for (row, shape) in table.rows.iter().zip(&shapes) {
        let mut record = dbase::Record::default();
        for (spec, value) in table.columns.iter().zip(&row.values) {
            record.insert(dbf_name(&spec.name).to_owned(), dbf_value(spec, value));
        }
        writer
            .write_shape_and_record(shape, &record)
            .map_err(shp_err)?;
    }
    drop(writer);

    let prj = path.with_extension("prj");
    std::fs::write(&prj, ALBERS_CONUS_ESRI_WKT).map_err(|e| io_error(&prj, e))?;
    Ok(path)
}

/// Extracts the labeled disturbances of `dataset`, validates them and
/// writes them to a fresh `{name}_GEE` folder under `out_dir`.
///
/// Nothing is written when validation fails.
///
/// # Errors
///
/// Returns [`ExportError::Validation`] with every violation if the dataset
/// fails validation, or a lookup or write error.
pub fn export_gee(
    dataset: &Dataset,
    lookup: &dyn LookupService,
    out_dir: &Path,
) -> Result<PathBuf, ExportError> {
    let mut table = extract(dataset, GEE_FIELDS);
    let dropped = retain_events(&mut table);
    log::info!(
        "{}: {} labeled patches to export, {dropped} without an exportable event",
        dataset.name,
        table.len()
    );
    validate(&table, ExportKind::Gee, lookup)?.into_result()?;
    if table.is_empty() {
        log::warn!("{} has no labeled disturbances, writing an empty shapefile", dataset.name);
    }

    add_wgs84_coordinates(&mut table);
    let path = write_shapefile(&table, &gee_folder(out_dir, &dataset.name))?;
    log::info!("Exported {} patches to {}", table.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::str::FromStr as _;

    use changedb_lookup::{EventLabel, LookupError};
    use changedb_patch_models::Patch;
    use changedb_spatial::geometry::rectangle;

    use super::*;
    use crate::fields::{GEE_OPTIONAL_FIELDS, SHAPE_AREA, SHAPE_LENGTH};

    struct Vocabulary;

    impl LookupService for Vocabulary {
        fn change_types(&self) -> Result<BTreeSet<String>, LookupError> {
            Ok(["Fire".to_owned(), "Insect".to_owned()].into())
        }

        fn event_labels(&self) -> Result<Vec<EventLabel>, LookupError> {
            Ok(Vec::new())
        }
    }

    fn out_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("changedb_export_gee_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A dataset carrying every GEE column, each filled with a plausible
    /// value.
    fn complete(rows: &[(&str, &str, i64, Option<&str>)]) -> Dataset {
        let mut ds = Dataset::new("OLYM_changeDB_2001_2003");
        for name in GEE_FIELDS {
            if *name == SHAPE_AREA || *name == SHAPE_LENGTH {
                continue;
            }
            let spec = Field::from_str(name)
                .map_or_else(|_| FieldSpec::new(*name, FieldType::Double), Field::spec);
            ds.add_field(spec);
        }
        let (x, y) = Albers::CONUS.forward(-123.5, 47.8);
        for &(name, event, confidence, alt) in rows {
            let mut patch = Patch::new(rectangle(x, y, x + 30.0, y + 60.0));
            for spec in ds.fields() {
                let value: FieldValue = match spec.field_type {
                    FieldType::Text => "x".into(),
                    _ => 1.into(),
                };
                patch = patch.with(spec.name.clone(), value);
            }
            patch = patch
                .with("PatchName", name)
                .with("EventType", event)
                .with("ChangeType", "Fire")
                .with("Confidence", confidence)
                .with("AltType", alt)
                .with("DistName", None::<&str>)
                .with("X_Coord_m", x + 15.0)
                .with("Y_Coord_m", y + 30.0)
                .with("Latitude", 0.0)
                .with("Longitude", 0.0);
            ds.push(patch);
        }
        ds
    }

    #[test]
    fn empty_geometry_writes_nothing() {
        let mut table = extract(
            &complete(&[("a", "Dist", 3, None), ("b", "Dist", 3, None)]),
            GEE_FIELDS,
        );
        table.rows[1].geometry = MultiPolygon(vec![]);
        let folder = out_dir("empty_geometry").join("OLYM_changeDB_2001_2003_GEE");
        let err = write_shapefile(&table, &folder).unwrap_err();
        assert!(matches!(
            err,
            ExportError::EmptyGeometry { patch_name: Some(ref name), .. } if name == "b"
        ));
        assert!(!folder.exists());
    }

    #[test]
    fn dbf_names_are_cut_to_ten_characters() {
        assert_eq!(dbf_name("ORIENTATION"), "ORIENTATIO");
        assert_eq!(dbf_name("Shape_Length"), "Shape_Leng");
        assert_eq!(dbf_name("Shape_Area"), "Shape_Area");
        assert_eq!(dbf_name("yod"), "yod");
        let cut: BTreeSet<&str> = GEE_FIELDS.iter().map(|n| dbf_name(n)).collect();
        assert_eq!(cut.len(), GEE_FIELDS.len());
        assert!(GEE_OPTIONAL_FIELDS.iter().all(|n| dbf_name(n) == *n));
    }

    #[test]
    fn coordinates_are_recomputed_in_wgs84() {
        let mut table = extract(&complete(&[("a", "Dist", 3, None)]), GEE_FIELDS);
        add_wgs84_coordinates(&mut table);
        let row = &table.rows[0];
        let lat = table.value(row, "Latitude").as_f64().unwrap();
        let lon = table.value(row, "Longitude").as_f64().unwrap();
        assert!((lat - 47.8).abs() < 0.01, "{lat}");
        assert!((lon + 123.5).abs() < 0.01, "{lon}");
        assert_eq!(table.value(row, "LLDatum").as_str(), Some("WGS84"));
    }

    #[test]
    fn writes_labeled_disturbances_only() {
        let dir = out_dir("written");
        let ds = complete(&[
            ("a", "Dist", 3, None),
            ("b", "Mask", 2, None),
            ("c", "Model", 3, None),
            ("d", "Dist", 2, Some("Insect")),
        ]);
        let path = export_gee(&ds, &Vocabulary, &dir).unwrap();
        assert_eq!(
            path,
            dir.join("OLYM_changeDB_2001_2003_GEE")
                .join("OLYM_changeDB_2001_2003.shp")
        );
        assert!(path.with_extension("prj").exists());

        let shapes = shapefile::read_as::<_, shapefile::Polygon, dbase::Record>(&path).unwrap();
        let names: Vec<String> = shapes
            .iter()
            .filter_map(|(_, record)| match record.get("PatchName") {
                Some(dbase::FieldValue::Character(Some(name))) => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["a", "d"]);
        let (_, record) = &shapes[0];
        assert!(record.get("ORIENTATIO").is_some());
        assert!(record.get("Shape_Leng").is_some());
        assert!(matches!(
            record.get("LLDatum"),
            Some(dbase::FieldValue::Character(Some(d))) if d == "WGS84"
        ));

        let again = export_gee(&ds, &Vocabulary, &dir).unwrap();
        assert_eq!(again.parent().unwrap(), dir.join("OLYM_changeDB_2001_2003_GEE_1"));
    }

    #[test]
    fn low_confidence_without_alt_type_is_refused() {
        let dir = out_dir("refused");
        let ds = complete(&[("a", "Dist", 1, None)]);
        let err = export_gee(&ds, &Vocabulary, &dir).unwrap_err();
        let ExportError::Validation(report) = err else {
            panic!("expected a validation error");
        };
        assert!(
            report
                .violations
                .iter()
                .any(|v| matches!(v, crate::Violation::MissingAltType { .. }))
        );
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }
}
