#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read-only lookups consumed by the pipeline.
//!
//! The [`LookupService`] trait supplies the valid `ChangeType` vocabulary
//! used by export validation and the curated event-label table joined onto
//! finalised datasets. [`CsvLookup`] serves both from CSV extracts of the
//! relational database. Failures are fatal to the calling operation; there
//! is no retry.

pub mod vegetation;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use changedb_patch_models::{Field, FieldValue};
use serde::Deserialize;

pub use vegetation::VegetationTable;

/// Errors from lookup sources.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// No source is configured for the requested lookup.
    #[error("no {0} source configured")]
    NotConfigured(&'static str),
    /// CSV parsing failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },
    /// A required column is missing.
    #[error("{path} has no '{column}' column")]
    MissingColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// Column name.
        column: &'static str,
    },
}

/// One curated label keyed by `PatchName`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct EventLabel {
    /// Patch identity.
    #[serde(rename = "PatchName")]
    pub patch_name: String,
    /// Disturbance event type.
    #[serde(rename = "EventType", default)]
    pub event_type: Option<String>,
    /// Change type.
    #[serde(rename = "ChangeType", default)]
    pub change_type: Option<String>,
    /// Confidence, 1-3.
    #[serde(rename = "Confidence", default)]
    pub confidence: Option<i64>,
    /// Alternate change type.
    #[serde(rename = "AltType", default)]
    pub alt_type: Option<String>,
    /// Free text description.
    #[serde(rename = "ChangeDesc", default)]
    pub change_desc: Option<String>,
    /// Year of the named disturbance.
    #[serde(rename = "DistYear", default)]
    pub dist_year: Option<i64>,
    /// Named disturbance.
    #[serde(rename = "DistName", default)]
    pub dist_name: Option<String>,
}

impl EventLabel {
    /// Value this label supplies for a label field.
    ///
    /// Fields the label table does not carry are `Null`.
    #[must_use]
    pub fn value(&self, field: Field) -> FieldValue {
        match field {
            Field::EventType => self.event_type.clone().into(),
            Field::ChangeType => self.change_type.clone().into(),
            Field::Confidence => self.confidence.into(),
            Field::AltType => self.alt_type.clone().into(),
            Field::ChangeDesc => self.change_desc.clone().into(),
            Field::DistYear => self.dist_year.into(),
            Field::DistName => self.dist_name.clone().into(),
            _ => FieldValue::Null,
        }
    }
}

/// Source of validation vocabularies and curated labels.
pub trait LookupService {
    /// Valid `ChangeType`/`AltType` values.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn change_types(&self) -> Result<BTreeSet<String>, LookupError>;

    /// Curated event labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn event_labels(&self) -> Result<Vec<EventLabel>, LookupError>;
}

/// [`LookupService`] backed by CSV extracts.
///
/// The change-type file needs a `ChangeType` column; the label file needs a
/// `PatchName` column plus any of the label fields.
#[derive(Debug, Clone, Default)]
pub struct CsvLookup {
    change_types: Option<PathBuf>,
    labels: Option<PathBuf>,
}

impl CsvLookup {
    /// Creates a lookup over the given files.
    #[must_use]
    pub const fn new(change_types: Option<PathBuf>, labels: Option<PathBuf>) -> Self {
        Self {
            change_types,
            labels,
        }
    }
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, LookupError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|source| LookupError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

impl LookupService for CsvLookup {
    fn change_types(&self) -> Result<BTreeSet<String>, LookupError> {
        let path = self
            .change_types
            .as_deref()
            .ok_or(LookupError::NotConfigured("change type"))?;
        let csv_err = |source: csv::Error| LookupError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = open(path)?;
        let column = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .position(|h| h == "ChangeType")
            .ok_or_else(|| LookupError::MissingColumn {
                path: path.to_path_buf(),
                column: "ChangeType",
            })?;

        let mut types = BTreeSet::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            if let Some(value) = record.get(column).filter(|v| !v.is_empty()) {
                types.insert(value.to_owned());
            }
        }
        log::info!("Loaded {} change types from {}", types.len(), path.display());
        Ok(types)
    }

    fn event_labels(&self) -> Result<Vec<EventLabel>, LookupError> {
        let path = self
            .labels
            .as_deref()
            .ok_or(LookupError::NotConfigured("event label"))?;
        let csv_err = |source: csv::Error| LookupError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = open(path)?;
        if !reader.headers().map_err(csv_err)?.iter().any(|h| h == "PatchName") {
            return Err(LookupError::MissingColumn {
                path: path.to_path_buf(),
                column: "PatchName",
            });
        }

        let labels = reader
            .deserialize::<EventLabel>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(csv_err)?;
        log::info!("Loaded {} event labels from {}", labels.len(), path.display());
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("changedb_lookup_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_change_types() {
        let path = write(
            "change_types.csv",
            "ChangeTypeID,ChangeType\n1,Clearing\n2,Fire\n3,\n",
        );
        let lookup = CsvLookup::new(Some(path), None);
        let types = lookup.change_types().unwrap();
        assert_eq!(types.into_iter().collect::<Vec<_>>(), vec!["Clearing", "Fire"]);
    }

    #[test]
    fn reads_labels_with_blank_cells() {
        let path = write(
            "labels.csv",
            "PatchName,EventType,ChangeType,Confidence,AltType,ChangeDesc,DistYear,DistName\n\
             OLYM_5_1_1990_2020_2001_4,Dist,Fire,2,Clearing,burned,2001,Big Fire\n\
             OLYM_5_2_1990_2020_2001_9,Dist,Fire,3,,,,\n",
        );
        let labels = CsvLookup::new(None, Some(path)).event_labels().unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].value(Field::DistName), FieldValue::from("Big Fire"));
        assert_eq!(labels[1].confidence, Some(3));
        assert!(labels[1].value(Field::AltType).is_null());
        assert!(labels[1].value(Field::DistYear).is_null());
    }

    #[test]
    fn missing_source_is_an_error() {
        assert!(matches!(
            CsvLookup::default().change_types(),
            Err(LookupError::NotConfigured(_))
        ));
    }

    #[test]
    fn label_file_needs_patch_name() {
        let path = write("bad_labels.csv", "Name,EventType\nx,Dist\n");
        assert!(matches!(
            CsvLookup::new(None, Some(path)).event_labels(),
            Err(LookupError::MissingColumn { column: "PatchName", .. })
        ));
    }
}
