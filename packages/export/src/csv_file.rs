//! CSV export for loading into the relational database.

use std::path::{Path, PathBuf};

use changedb_lookup::LookupService;
use changedb_patch_models::Dataset;
use changedb_store::paths::{CUMULATIVE_NAME, ensure_dir};

use crate::fields::CSV_FIELDS;
use crate::table::{ExportTable, clean, extract};
use crate::validate::{ExportKind, validate};
use crate::{ExportError, io_error, unique_path};

/// Folder used when the output folder has no per-park subfolder.
pub const DEFAULT_CSV_FOLDER: &str = "Patches_CSV";

/// Park code and year span of a finalised dataset name
/// (`OLYM_changeDB_1990_2020` gives `("OLYM", "1990_2020")`).
fn park_and_years(dataset_name: &str) -> Option<(&str, &str)> {
    dataset_name
        .split_once(&format!("_{CUMULATIVE_NAME}_"))
        .filter(|(park, years)| !park.is_empty() && !years.is_empty())
}

/// File name of the CSV export of a dataset (`OLYM_patches_1990_2020.csv`).
#[must_use]
pub fn csv_file_name(dataset_name: &str) -> String {
    park_and_years(dataset_name).map_or_else(
        || format!("{dataset_name}_patches.csv"),
        |(park, years)| format!("{park}_patches_{years}.csv"),
    )
}

/// Folder under `out_dir` receiving the CSV of a dataset.
///
/// A subfolder named after the park is used when it already exists;
/// otherwise `Patches_CSV` is created.
///
/// # Errors
///
/// Returns an I/O error if the default folder cannot be created.
pub fn csv_folder(out_dir: &Path, dataset_name: &str) -> Result<PathBuf, ExportError> {
    if let Some((park, _)) = park_and_years(dataset_name) {
        let park_dir = out_dir.join(park);
        if park_dir.is_dir() {
            return Ok(park_dir);
        }
    }
    let folder = out_dir.join(DEFAULT_CSV_FOLDER);
    ensure_dir(&folder).map_err(|e| io_error(&folder, e))?;
    Ok(folder)
}

/// Writes a validated table. Nulls are written as empty fields and every
/// non-numeric field is quoted.
///
/// # Errors
///
/// Returns a CSV error if the file cannot be written.
pub fn write_csv(table: &ExportTable, path: &Path) -> Result<(), ExportError> {
    let csv_err = |source: csv::Error| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_path(path)
        .map_err(csv_err)?;
    writer
        .write_record(table.columns.iter().map(|c| c.name.as_str()))
        .map_err(csv_err)?;
    for row in &table.rows {
        writer
            .write_record(row.values.iter().map(ToString::to_string))
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| io_error(path, e))?;
    Ok(())
}

/// Extracts, cleans and validates `dataset`, then writes it to `path`.
///
/// `path` gets a `.csv` extension when it has none. Nothing is written
/// when validation fails.
///
/// # Errors
///
/// Returns [`ExportError::Validation`] with every violation if the dataset
/// fails validation, or a lookup or write error.
pub fn export_csv(
    dataset: &Dataset,
    lookup: &dyn LookupService,
    path: &Path,
) -> Result<PathBuf, ExportError> {
    let mut table = extract(dataset, CSV_FIELDS);
    clean(&mut table);
    validate(&table, ExportKind::Csv, lookup)?.into_result()?;

    let path = if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension("csv")
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).map_err(|e| io_error(parent, e))?;
    }
    write_csv(&table, &path)?;
    log::info!("Exported {} patches to {}", table.len(), path.display());
    Ok(path)
}

/// Exports `dataset` to a fresh file in its CSV folder under `out_dir`.
///
/// An existing file of the same name gets a numeric suffix instead of
/// being overwritten.
///
/// # Errors
///
/// See [`export_csv`].
pub fn export_csv_to_dir(
    dataset: &Dataset,
    lookup: &dyn LookupService,
    out_dir: &Path,
) -> Result<PathBuf, ExportError> {
    let folder = csv_folder(out_dir, &dataset.name)?;
    let path = unique_path(&folder.join(csv_file_name(&dataset.name)));
    export_csv(dataset, lookup, &path)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use changedb_lookup::{EventLabel, LookupError};
    use changedb_patch_models::{Field, Patch};
    use changedb_spatial::geometry::rectangle;

    use super::*;

    struct Vocabulary;

    impl LookupService for Vocabulary {
        fn change_types(&self) -> Result<BTreeSet<String>, LookupError> {
            Ok(["Fire".to_owned()].into())
        }

        fn event_labels(&self) -> Result<Vec<EventLabel>, LookupError> {
            Ok(Vec::new())
        }
    }

    fn out_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("changedb_export_csv_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn dataset(names: &[&str]) -> Dataset {
        let mut ds = Dataset::new("OLYM_changeDB_2001_2003");
        for field in [
            Field::Park,
            Field::PatchName,
            Field::Yod,
            Field::EventType,
            Field::ChangeType,
            Field::Confidence,
            Field::ChangeDesc,
        ] {
            ds.add_known(field);
        }
        for name in names {
            ds.push(
                Patch::new(rectangle(0.0, 0.0, 30.0, 30.0))
                    .with("Park", "OLYM")
                    .with("PatchName", *name)
                    .with("yod", 2002)
                    .with("EventType", "Dist")
                    .with("ChangeType", "Fire")
                    .with("Confidence", 3)
                    .with("ChangeDesc", "burned\nslope"),
            );
        }
        ds
    }

    #[test]
    fn names_follow_park_and_years() {
        assert_eq!(
            csv_file_name("OLYM_changeDB_1990_2020"),
            "OLYM_patches_1990_2020.csv"
        );
        assert_eq!(csv_file_name("select_x"), "select_x_patches.csv");
    }

    #[test]
    fn writes_quoted_rows_in_column_order() {
        let dir = out_dir("rows");
        let path = export_csv_to_dir(&dataset(&["a", "b"]), &Vocabulary, &dir).unwrap();
        assert_eq!(
            path,
            dir.join(DEFAULT_CSV_FOLDER).join("OLYM_patches_2001_2003.csv")
        );

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("\"Park\",\"PatchName\",\"yod\",\"annualID\""));
        assert_eq!(header.split(',').count(), CSV_FIELDS.len());
        let first = lines.next().unwrap();
        assert!(first.starts_with("\"OLYM\",\"a\",2002,\"\""));
        assert!(first.contains("\"burned slope\""));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn park_folder_and_collisions() {
        let dir = out_dir("collisions");
        std::fs::create_dir_all(dir.join("OLYM")).unwrap();
        let ds = dataset(&["a"]);
        let first = export_csv_to_dir(&ds, &Vocabulary, &dir).unwrap();
        let second = export_csv_to_dir(&ds, &Vocabulary, &dir).unwrap();
        assert_eq!(first, dir.join("OLYM").join("OLYM_patches_2001_2003.csv"));
        assert_eq!(second, dir.join("OLYM").join("OLYM_patches_2001_2003_1.csv"));
    }

    #[test]
    fn refused_export_writes_nothing() {
        let dir = out_dir("refused");
        let err = export_csv_to_dir(&dataset(&["a", "a"]), &Vocabulary, &dir).unwrap_err();
        assert!(matches!(err, ExportError::Validation(_)));
        let written = std::fs::read_dir(dir.join(DEFAULT_CSV_FOLDER)).unwrap().count();
        assert_eq!(written, 0);
    }
}
