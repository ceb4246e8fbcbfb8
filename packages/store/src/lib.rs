#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Run workspace and dataset persistence.
//!
//! A [`Workspace`] is an explicit handle on one run directory: finalised and
//! in-progress cumulative datasets live at its root, transient per-year
//! intermediates live in its scratch directory. Every pipeline component
//! receives the handle instead of relying on an ambient working location.

pub mod collection;
pub mod input;
pub mod paths;

use std::path::{Path, PathBuf};

use changedb_patch_models::{Dataset, SchemaError};
use chrono::NaiveDate;
use geojson::GeoJson;

pub use input::{YearlyInput, discover_inputs, read_input};

/// Errors from the dataset store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A dataset file is not valid `GeoJSON`.
    #[error("invalid GeoJSON in {path}: {source}")]
    GeoJson {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: Box<geojson::Error>,
    },
    /// A dataset file is valid `GeoJSON` but not a patch collection.
    #[error("invalid dataset {path}: {source}")]
    InvalidDataset {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: collection::ConversionError,
    },
    /// Serializing a dataset failed.
    #[error("failed to serialize dataset {name}: {source}")]
    Serialize {
        /// Dataset name.
        name: String,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// Reading a shapefile failed.
    #[error("shapefile error in {path}: {source}")]
    Shapefile {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: shapefile::Error,
    },
    /// Reading a `.dbf` attribute table failed.
    #[error("attribute table error in {path}: {source}")]
    Dbase {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: shapefile::dbase::Error,
    },
    /// A named dataset does not exist.
    #[error("dataset '{name}' does not exist in {dir}")]
    NotFound {
        /// Dataset name.
        name: String,
        /// Directory searched.
        dir: PathBuf,
    },
    /// A dataset operation did not fit the schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Where a dataset lives inside a run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// The run directory itself (cumulative datasets).
    Run,
    /// The scratch directory (per-year intermediates).
    Scratch,
}

/// Handle on one run directory and its scratch directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    scratch: PathBuf,
}

impl Workspace {
    /// Opens (creating if needed) a run directory with a `scratch/`
    /// subdirectory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let scratch = root.join(paths::SCRATCH_DIR);
        for dir in [root, scratch.as_path()] {
            paths::ensure_dir(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            scratch,
        })
    }

    /// Run directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory.
    #[must_use]
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    fn dir(&self, location: Location) -> &Path {
        match location {
            Location::Run => &self.root,
            Location::Scratch => &self.scratch,
        }
    }

    /// File path of a dataset.
    #[must_use]
    pub fn path(&self, location: Location, name: &str) -> PathBuf {
        self.dir(location)
            .join(format!("{name}.{}", paths::DATASET_EXTENSION))
    }

    /// Whether a dataset exists.
    #[must_use]
    pub fn exists(&self, location: Location, name: &str) -> bool {
        self.path(location, name).is_file()
    }

    /// Names of the datasets in a location, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list(&self, location: Location) -> Result<Vec<String>, StoreError> {
        let dir = self.dir(location);
        let io_err = |source: std::io::Error| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(paths::DATASET_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Loads a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if it does not exist, or a parse
    /// error if the file is not a valid patch collection.
    pub fn load(&self, location: Location, name: &str) -> Result<Dataset, StoreError> {
        let path = self.path(location, name);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                name: name.to_owned(),
                dir: self.dir(location).to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let geojson: GeoJson = text.parse().map_err(|source| StoreError::GeoJson {
            path: path.clone(),
            source: Box::new(source),
        })?;
        collection::from_geojson(name, geojson)
            .map_err(|source| StoreError::InvalidDataset { path, source })
    }

    /// Saves a dataset under its own name, replacing any previous version.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so an interrupted save never leaves a truncated dataset behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be serialized or written.
    pub fn save(&self, location: Location, dataset: &Dataset) -> Result<(), StoreError> {
        let path = self.path(location, &dataset.name);
        let collection =
            collection::to_feature_collection(dataset).map_err(|source| StoreError::Serialize {
                name: dataset.name.clone(),
                source,
            })?;
        let text = GeoJson::FeatureCollection(collection).to_string();

        let tmp = path.with_extension(format!("{}.tmp", paths::DATASET_EXTENSION));
        std::fs::write(&tmp, text).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        log::debug!("Saved {} ({} patches)", path.display(), dataset.len());
        Ok(())
    }

    /// Deletes a dataset. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(&self, location: Location, name: &str) -> Result<bool, StoreError> {
        let path = self.path(location, name);
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
        Ok(true)
    }

    /// Renames a dataset in place, replacing any dataset with the new name.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not exist or cannot be rewritten.
    pub fn rename(&self, location: Location, from: &str, to: &str) -> Result<(), StoreError> {
        let mut dataset = self.load(location, from)?;
        dataset.name = to.to_owned();
        self.save(location, &dataset)?;
        self.delete(location, from)?;
        log::info!("Renamed dataset {from} to {to}");
        Ok(())
    }

    /// Copies a dataset under a new name.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not exist or cannot be written.
    pub fn copy(
        &self,
        from: (Location, &str),
        to: (Location, &str),
    ) -> Result<Dataset, StoreError> {
        let mut dataset = self.load(from.0, from.1)?;
        dataset.name = to.1.to_owned();
        self.save(to.0, &dataset)?;
        Ok(dataset)
    }

    /// Writes a dated backup copy of a run dataset and returns its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset does not exist or cannot be copied.
    pub fn backup(&self, name: &str, date: NaiveDate) -> Result<String, StoreError> {
        let backup = paths::backup_name(name, date);
        self.copy((Location::Run, name), (Location::Run, &backup))?;
        log::info!("Backed up {name} to {backup}");
        Ok(backup)
    }

    /// Deletes every dataset in the scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed.
    pub fn clear_scratch(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for name in self.list(Location::Scratch)? {
            if self.delete(Location::Scratch, &name)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use changedb_patch_models::{Field, Patch};
    use changedb_spatial::geometry::rectangle;

    use super::*;

    fn workspace(name: &str) -> Workspace {
        let dir = std::env::temp_dir().join(format!("changedb_store_ws_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        Workspace::open(&dir).unwrap()
    }

    fn dataset(name: &str) -> Dataset {
        let mut ds = Dataset::with_fields(name, vec![Field::AnnualId.spec(), Field::Yod.spec()]);
        ds.push(
            Patch::new(rectangle(0.0, 0.0, 30.0, 30.0))
                .with("annualID", 1)
                .with("yod", 2001),
        );
        ds
    }

    #[test]
    fn save_load_delete() {
        let ws = workspace("save");
        ws.save(Location::Scratch, &dataset("change_2001")).unwrap();
        assert!(ws.exists(Location::Scratch, "change_2001"));
        assert!(!ws.exists(Location::Run, "change_2001"));
        let back = ws.load(Location::Scratch, "change_2001").unwrap();
        assert_eq!(back, dataset("change_2001"));
        assert_eq!(ws.list(Location::Scratch).unwrap(), vec!["change_2001"]);
        assert!(ws.delete(Location::Scratch, "change_2001").unwrap());
        assert!(!ws.delete(Location::Scratch, "change_2001").unwrap());
        std::fs::remove_dir_all(ws.root()).ok();
    }

    #[test]
    fn saved_doubles_reload_exactly() {
        let ws = workspace("doubles");
        let mut ds = Dataset::with_fields("changeDB", vec![Field::Longitude.spec()]);
        ds.push(
            Patch::new(rectangle(
                -2_013_456.123_456_789,
                2_987_654.987_654_321,
                -2_013_425.876_543_21,
                2_987_684.123_456_78,
            ))
                .with("Longitude", -95.997_990_007_126_05),
        );
        ws.save(Location::Run, &ds).unwrap();
        assert_eq!(ws.load(Location::Run, "changeDB").unwrap(), ds);
        std::fs::remove_dir_all(ws.root()).ok();
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let ws = workspace("missing");
        assert!(matches!(
            ws.load(Location::Run, "changeDB"),
            Err(StoreError::NotFound { .. })
        ));
        std::fs::remove_dir_all(ws.root()).ok();
    }

    #[test]
    fn rename_copy_and_backup() {
        let ws = workspace("rename");
        ws.save(Location::Run, &dataset("changeDB")).unwrap();
        ws.rename(Location::Run, "changeDB", "OLYM_changeDB_2001_2001")
            .unwrap();
        assert!(!ws.exists(Location::Run, "changeDB"));

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let backup = ws.backup("OLYM_changeDB_2001_2001", date).unwrap();
        assert_eq!(backup, "OLYM_changeDB_2001_2001_backup_20240501");
        assert_eq!(ws.load(Location::Run, &backup).unwrap().len(), 1);

        ws.save(Location::Scratch, &dataset("change_2001")).unwrap();
        ws.save(Location::Scratch, &dataset("change_2002")).unwrap();
        assert_eq!(ws.clear_scratch().unwrap(), 2);
        std::fs::remove_dir_all(ws.root()).ok();
    }
}
