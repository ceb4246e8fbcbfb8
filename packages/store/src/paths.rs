#![allow(clippy::module_name_repetitions)]
//! Canonical dataset names and file paths inside a run directory.

use std::path::Path;

use chrono::NaiveDate;

/// File extension of persisted datasets.
pub const DATASET_EXTENSION: &str = "geojson";

/// Name of the in-progress cumulative dataset.
pub const CUMULATIVE_NAME: &str = "changeDB";

/// Prefix of yearly datasets.
pub const YEARLY_PREFIX: &str = "change_";

/// Name of the scratch directory inside a run directory.
pub const SCRATCH_DIR: &str = "scratch";

/// Name of the yearly dataset for `year` (`change_2001`).
#[must_use]
pub fn yearly_name(year: i32) -> String {
    format!("{YEARLY_PREFIX}{year}")
}

/// Year encoded in a yearly dataset name or file stem.
#[must_use]
pub fn year_of(name: &str) -> Option<i32> {
    let digits = name.strip_prefix(YEARLY_PREFIX)?;
    (digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()))
        .then(|| digits.parse().ok())
        .flatten()
}

/// Name of a finalised cumulative dataset (`OLYM_changeDB_1990_2020`).
#[must_use]
pub fn finalized_name(park: &str, start_year: i64, end_year: i64) -> String {
    format!("{park}_{CUMULATIVE_NAME}_{start_year}_{end_year}")
}

/// Whether a dataset name is a finalised cumulative dataset.
#[must_use]
pub fn is_finalized_name(name: &str) -> bool {
    let mut parts = name.split('_');
    let (Some(park), Some(db), Some(start), Some(end), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    !park.is_empty()
        && db == CUMULATIVE_NAME
        && [start, end]
            .iter()
            .all(|y| y.len() == 4 && y.bytes().all(|b| b.is_ascii_digit()))
}

/// Name of a dated backup copy (`changeDB_backup_20240131`).
#[must_use]
pub fn backup_name(name: &str, date: NaiveDate) -> String {
    format!("{name}_backup_{}", date.format("%Y%m%d"))
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
