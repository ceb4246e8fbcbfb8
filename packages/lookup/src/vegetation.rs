//! Vegetation raster value to vegetation code mapping.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::LookupError;

#[derive(Debug, Deserialize)]
struct VegRow {
    #[serde(rename = "MCID")]
    mcid: i64,
    #[serde(rename = "CODE")]
    code: String,
}

/// Maps vegetation raster values (`MCID`) to four-character codes (`CODE`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VegetationTable {
    codes: BTreeMap<i64, String>,
}

impl VegetationTable {
    /// Builds a table from `(value, code)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, String)>) -> Self {
        Self {
            codes: pairs.into_iter().collect(),
        }
    }

    /// Reads an `MCID,CODE` CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed.
    pub fn from_csv(path: &Path) -> Result<Self, LookupError> {
        let csv_err = |source: csv::Error| LookupError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;
        let codes = reader
            .deserialize::<VegRow>()
            .map(|row| row.map(|r| (r.mcid, r.code)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(csv_err)?;
        log::info!("Loaded {} vegetation codes from {}", codes.len(), path.display());
        Ok(Self { codes })
    }

    /// Code for a raster value.
    #[must_use]
    pub fn code(&self, value: i64) -> Option<&str> {
        self.codes.get(&value).map(String::as_str)
    }
}

/// Code synthesized when a park has no vegetation table: the prefix followed
/// by the value zero-padded to two digits (`L07`, `L12`).
#[must_use]
pub fn synthesized_code(prefix: &str, value: i64) -> String {
    format!("{prefix}{value:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_codes_are_padded() {
        assert_eq!(synthesized_code("L", 7), "L07");
        assert_eq!(synthesized_code("L", 12), "L12");
    }

    #[test]
    fn reads_csv_table() {
        let dir = std::env::temp_dir().join("changedb_lookup_veg_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("OLYM_veg_type_tbl.csv");
        std::fs::write(&path, "MCID, CODE\n3, DFWH\n4, SSPR\n").unwrap();
        let table = VegetationTable::from_csv(&path).unwrap();
        assert_eq!(table.code(3), Some("DFWH"));
        assert_eq!(table.code(9), None);
        std::fs::remove_dir_all(&dir).ok();
    }
}
