//! Export of every finalised dataset of a run directory.

use std::path::PathBuf;

use changedb_lookup::LookupService;
use changedb_store::paths::is_finalized_name;
use changedb_store::{Location, Workspace};

use crate::ExportError;
use crate::csv_file::export_csv_to_dir;
use crate::gee::export_gee;

/// Output folders of a batch; at least one must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTargets {
    /// Folder receiving CSVs.
    pub csv_dir: Option<PathBuf>,
    /// Folder receiving GEE shapefile folders.
    pub gee_dir: Option<PathBuf>,
}

/// Files written by a fully successful batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Datasets exported, in order.
    pub datasets: Vec<String>,
    /// Every CSV and shapefile written.
    pub written: Vec<PathBuf>,
}

/// Exports the named datasets of the run directory, or every finalised one
/// when `names` is empty, to each requested target.
///
/// A refused or failed dataset is logged and the batch moves on; the batch
/// as a whole fails once every dataset was attempted.
///
/// # Errors
///
/// Returns [`ExportError::NoTarget`] without targets, a store error if the
/// run directory cannot be listed, or [`ExportError::Batch`] naming every
/// dataset that was not fully exported.
pub fn export_run(
    workspace: &Workspace,
    names: &[String],
    lookup: &dyn LookupService,
    targets: &BatchTargets,
) -> Result<BatchSummary, ExportError> {
    if targets.csv_dir.is_none() && targets.gee_dir.is_none() {
        return Err(ExportError::NoTarget);
    }
    let names = if names.is_empty() {
        workspace
            .list(Location::Run)?
            .into_iter()
            .filter(|name| is_finalized_name(name))
            .collect()
    } else {
        names.to_vec()
    };
    if names.is_empty() {
        log::warn!("No finalised datasets in {}", workspace.root().display());
    }

    let mut summary = BatchSummary::default();
    let mut failed = Vec::new();
    for name in &names {
        log::info!("Exporting {name}");
        let dataset = match workspace.load(Location::Run, name) {
            Ok(dataset) => dataset,
            Err(e) => {
                log::error!("Cannot export {name}: {e}");
                failed.push(name.clone());
                continue;
            }
        };

        let mut ok = true;
        let exports = [
            targets
                .csv_dir
                .as_deref()
                .map(|dir| export_csv_to_dir(&dataset, lookup, dir)),
            targets
                .gee_dir
                .as_deref()
                .map(|dir| export_gee(&dataset, lookup, dir)),
        ];
        for result in exports.into_iter().flatten() {
            match result {
                Ok(path) => summary.written.push(path),
                Err(e) => {
                    log::error!("{name} was not exported: {e}");
                    ok = false;
                }
            }
        }
        if ok {
            summary.datasets.push(name.clone());
        } else {
            failed.push(name.clone());
        }
    }

    if failed.is_empty() {
        log::info!(
            "Exported {} dataset(s), {} file(s) written",
            summary.datasets.len(),
            summary.written.len()
        );
        Ok(summary)
    } else {
        Err(ExportError::Batch {
            failed,
            attempted: names.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use changedb_lookup::{EventLabel, LookupError};
    use changedb_patch_models::{Dataset, Field, Patch};
    use changedb_spatial::geometry::rectangle;

    use super::*;
    use crate::csv_file::DEFAULT_CSV_FOLDER;

    struct Vocabulary;

    impl LookupService for Vocabulary {
        fn change_types(&self) -> Result<BTreeSet<String>, LookupError> {
            Ok(["Fire".to_owned()].into())
        }

        fn event_labels(&self) -> Result<Vec<EventLabel>, LookupError> {
            Ok(Vec::new())
        }
    }

    fn dataset(name: &str, patch_names: &[&str]) -> Dataset {
        let mut ds = Dataset::new(name);
        ds.add_known(Field::PatchName);
        ds.add_known(Field::ChangeType);
        for patch_name in patch_names {
            ds.push(
                Patch::new(rectangle(0.0, 0.0, 30.0, 30.0))
                    .with("PatchName", *patch_name)
                    .with("ChangeType", "Fire"),
            );
        }
        ds
    }

    fn run_dir(name: &str) -> (Workspace, PathBuf) {
        let root = std::env::temp_dir().join(format!("changedb_export_batch_{name}"));
        std::fs::remove_dir_all(&root).ok();
        let ws = Workspace::open(&root.join("run")).unwrap();
        ws.save(Location::Run, &dataset("OLYM_changeDB_2001_2003", &["a", "b"]))
            .unwrap();
        ws.save(Location::Run, &dataset("NOCA_changeDB_1990_2020", &["a", "a"]))
            .unwrap();
        ws.save(Location::Run, &dataset("changeDB", &["x"])).unwrap();
        (ws, root.join("out"))
    }

    #[test]
    fn refused_dataset_fails_the_batch_after_all_attempts() {
        let (ws, out) = run_dir("refused");
        let targets = BatchTargets {
            csv_dir: Some(out.clone()),
            gee_dir: None,
        };
        let err = export_run(&ws, &[], &Vocabulary, &targets).unwrap_err();
        let ExportError::Batch { failed, attempted } = err else {
            panic!("expected a batch error");
        };
        assert_eq!(failed, ["NOCA_changeDB_1990_2020"]);
        assert_eq!(attempted, 2);
        assert!(
            out.join(DEFAULT_CSV_FOLDER)
                .join("OLYM_patches_2001_2003.csv")
                .exists()
        );
        assert!(
            !out.join(DEFAULT_CSV_FOLDER)
                .join("NOCA_patches_1990_2020.csv")
                .exists()
        );
    }

    #[test]
    fn named_subset_only() {
        let (ws, out) = run_dir("subset");
        let targets = BatchTargets {
            csv_dir: Some(out),
            gee_dir: None,
        };
        let summary = export_run(
            &ws,
            &["OLYM_changeDB_2001_2003".to_owned()],
            &Vocabulary,
            &targets,
        )
        .unwrap();
        assert_eq!(summary.datasets, ["OLYM_changeDB_2001_2003"]);
        assert_eq!(summary.written.len(), 1);
    }

    #[test]
    fn targets_are_required() {
        let (ws, _) = run_dir("targets");
        let err = export_run(&ws, &[], &Vocabulary, &BatchTargets::default()).unwrap_err();
        assert!(matches!(err, ExportError::NoTarget));
    }
}
