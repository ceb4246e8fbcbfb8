#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Validation and export of finalised change databases.
//!
//! An export extracts a fixed column list into an [`ExportTable`], runs
//! every validation rule of the target format over it and writes the
//! artifact only when no rule failed: a cleaned CSV for the relational
//! database ([`export_csv`]) or a shapefile of labeled disturbances for
//! Earth Engine ([`export_gee`]). [`export_run`] does either or both for
//! every finalised dataset of a run directory.

pub mod batch;
pub mod csv_file;
pub mod fields;
pub mod gee;
pub mod table;
pub mod validate;

use std::path::{Path, PathBuf};

use changedb_lookup::LookupError;
use changedb_store::StoreError;

pub use batch::{BatchSummary, BatchTargets, export_run};
pub use csv_file::{export_csv, export_csv_to_dir};
pub use gee::export_gee;
pub use table::{ExportRow, ExportTable};
pub use validate::{ExportKind, ValidationReport, Violation, validate};

/// Errors from export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The dataset failed validation; nothing was written.
    #[error("{0}")]
    Validation(ValidationReport),
    /// Some datasets of a batch could not be exported.
    #[error("{} of {attempted} dataset(s) were not exported: {}", failed.len(), failed.join(", "))]
    Batch {
        /// Datasets that were refused or failed.
        failed: Vec<String>,
        /// Number of datasets attempted.
        attempted: usize,
    },
    /// No export target was requested.
    #[error("no CSV or GEE output folder given")]
    NoTarget,
    /// A patch to write has no geometry.
    #[error("patch {patch_name:?} of {dataset} has no geometry")]
    EmptyGeometry {
        /// Dataset name.
        dataset: String,
        /// Patch identity, when it has one.
        patch_name: Option<String>,
    },
    /// A column name cannot be stored in a `.dbf` header.
    #[error("column '{0}' cannot be written to a shapefile")]
    FieldName(String),
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Writing a CSV file failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: csv::Error,
    },
    /// Writing a shapefile failed.
    #[error("shapefile error in {path}: {source}")]
    Shapefile {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: shapefile::Error,
    },
    /// The valid change types could not be read.
    #[error(transparent)]
    Lookup(#[from] LookupError),
    /// Dataset store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `path` itself when free, otherwise the first free `{stem}_{n}{.ext}`.
#[must_use]
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1_u32..)
        .map(|n| path.with_file_name(format!("{stem}_{n}{extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_path_counts_up() {
        let dir = std::env::temp_dir().join("changedb_export_unique_path");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();

        let file = dir.join("OLYM_patches_2001_2003.csv");
        assert_eq!(unique_path(&file), file);
        std::fs::write(&file, "").unwrap();
        assert_eq!(unique_path(&file), dir.join("OLYM_patches_2001_2003_1.csv"));
        std::fs::write(dir.join("OLYM_patches_2001_2003_1.csv"), "").unwrap();
        assert_eq!(unique_path(&file), dir.join("OLYM_patches_2001_2003_2.csv"));

        let folder = dir.join("OLYM_changeDB_2001_2003_GEE");
        std::fs::create_dir_all(&folder).unwrap();
        assert_eq!(unique_path(&folder), dir.join("OLYM_changeDB_2001_2003_GEE_1"));
    }
}
