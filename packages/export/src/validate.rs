//! Export validation.
//!
//! Every rule runs over every row and each violation is reported on its
//! own, so one pass shows the operator everything to fix before the export
//! can go through.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use changedb_lookup::LookupService;
use changedb_patch_models::{EVENT_TYPE_MASK, Field, FieldValue};

use crate::ExportError;
use crate::fields::GEE_OPTIONAL_FIELDS;
use crate::table::{ExportRow, ExportTable};

/// Which artifact a table is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Cleaned CSV for the relational database.
    Csv,
    /// Shapefile of labeled disturbances for Earth Engine.
    Gee,
}

/// One failed validation rule for one row or column.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// A `ChangeType` or `AltType` outside the valid vocabulary.
    UnknownChangeType {
        /// `ChangeType` or `AltType`.
        field: Field,
        /// Offending value.
        value: String,
        /// Patch carrying it.
        patch_name: Option<String>,
    },
    /// An event whose `Confidence` is set but outside 1-3.
    ConfidenceOutOfRange {
        /// Offending value.
        confidence: FieldValue,
        /// Patch carrying it.
        patch_name: Option<String>,
    },
    /// Confidence 1 or 2 without an alternate change type.
    MissingAltType {
        /// Confidence of the patch.
        confidence: FieldValue,
        /// Patch carrying it.
        patch_name: Option<String>,
    },
    /// A `PatchName` shared with another exported row.
    DuplicatePatchName {
        /// The shared name.
        patch_name: Option<String>,
    },
    /// A required column with empty values.
    MissingValues {
        /// Column name.
        field: String,
        /// Number of empty rows.
        rows: usize,
    },
}

fn name_or_null(name: Option<&String>) -> &str {
    name.map_or("<null>", String::as_str)
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownChangeType {
                field,
                value,
                patch_name,
            } => write!(
                f,
                "{field} '{value}' of {} is not a valid change type",
                name_or_null(patch_name.as_ref())
            ),
            Self::ConfidenceOutOfRange {
                confidence,
                patch_name,
            } => write!(
                f,
                "Confidence '{confidence}' of {} is not between 1 and 3",
                name_or_null(patch_name.as_ref())
            ),
            Self::MissingAltType {
                confidence,
                patch_name,
            } => write!(
                f,
                "{} has Confidence {confidence} but no AltType",
                name_or_null(patch_name.as_ref())
            ),
            Self::DuplicatePatchName { patch_name } => write!(
                f,
                "PatchName {} is not unique",
                name_or_null(patch_name.as_ref())
            ),
            Self::MissingValues { field, rows } => {
                write!(f, "{field} is empty in {rows} row(s)")
            }
        }
    }
}

/// Every violation found in one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    /// Validated dataset.
    pub dataset: String,
    /// Violations in rule order.
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Whether the table may be written.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Converts a failed report into [`ExportError::Validation`].
    ///
    /// # Errors
    ///
    /// Returns the report as an error if it holds any violation.
    pub fn into_result(self) -> Result<(), ExportError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(ExportError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed validation with {} violation(s)",
            self.dataset,
            self.violations.len()
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

fn patch_name(table: &ExportTable, row: &ExportRow) -> Option<String> {
    table
        .value(row, Field::PatchName.as_ref())
        .as_str()
        .map(str::to_owned)
}

fn has_event(table: &ExportTable, row: &ExportRow) -> bool {
    !table.value(row, Field::EventType.as_ref()).is_blank()
}

fn check_change_types(
    table: &ExportTable,
    lookup: &dyn LookupService,
    violations: &mut Vec<Violation>,
) -> Result<(), ExportError> {
    if table.values(Field::ChangeType.as_ref()).all(FieldValue::is_null) {
        log::debug!("{} has no change types to check", table.name);
        return Ok(());
    }
    let valid = lookup.change_types()?;
    for field in [Field::ChangeType, Field::AltType] {
        for row in &table.rows {
            let value = table.value(row, field.as_ref());
            if value.is_blank() {
                continue;
            }
            let text = value.to_string();
            if !valid.contains(&text) {
                violations.push(Violation::UnknownChangeType {
                    field,
                    value: text,
                    patch_name: patch_name(table, row),
                });
            }
        }
    }
    Ok(())
}

fn check_confidence(table: &ExportTable, kind: ExportKind, violations: &mut Vec<Violation>) {
    for row in table.rows.iter().filter(|row| has_event(table, row)) {
        let confidence = table.value(row, Field::Confidence.as_ref());
        if confidence
            .as_f64()
            .is_some_and(|c| !(1.0..=3.0).contains(&c))
        {
            violations.push(Violation::ConfidenceOutOfRange {
                confidence: confidence.clone(),
                patch_name: patch_name(table, row),
            });
        }
    }
    if kind != ExportKind::Gee {
        return;
    }
    for row in &table.rows {
        let confidence = table.value(row, Field::Confidence.as_ref());
        let low = confidence.as_f64().is_some_and(|c| c < 3.0);
        let masked = table.value(row, Field::EventType.as_ref()).as_str() == Some(EVENT_TYPE_MASK);
        if low && !masked && table.value(row, Field::AltType.as_ref()).is_blank() {
            violations.push(Violation::MissingAltType {
                confidence: confidence.clone(),
                patch_name: patch_name(table, row),
            });
        }
    }
}

fn check_unique_names(table: &ExportTable, violations: &mut Vec<Violation>) {
    let mut counts: BTreeMap<Option<&str>, usize> = BTreeMap::new();
    for row in &table.rows {
        *counts
            .entry(table.value(row, Field::PatchName.as_ref()).as_str())
            .or_default() += 1;
    }
    for row in &table.rows {
        let name = table.value(row, Field::PatchName.as_ref()).as_str();
        if counts.get(&name).is_some_and(|&n| n > 1) {
            violations.push(Violation::DuplicatePatchName {
                patch_name: name.map(str::to_owned),
            });
        }
    }
}

fn check_required(table: &ExportTable, violations: &mut Vec<Violation>) {
    let optional: BTreeSet<&str> = GEE_OPTIONAL_FIELDS.iter().copied().collect();
    for (i, column) in table.columns.iter().enumerate() {
        if optional.contains(column.name.as_str()) {
            continue;
        }
        let rows = table
            .rows
            .iter()
            .filter(|row| row.values[i].is_blank())
            .count();
        if rows > 0 {
            violations.push(Violation::MissingValues {
                field: column.name.clone(),
                rows,
            });
        }
    }
}

/// Runs every rule of `kind` over `table`.
///
/// The valid change types are only fetched when some row has a
/// `ChangeType`. Each violation is logged as an error.
///
/// # Errors
///
/// Returns a lookup error if the valid change types cannot be read; rule
/// violations are returned in the report, not as an error.
pub fn validate(
    table: &ExportTable,
    kind: ExportKind,
    lookup: &dyn LookupService,
) -> Result<ValidationReport, ExportError> {
    let mut violations = Vec::new();
    check_change_types(table, lookup, &mut violations)?;
    check_confidence(table, kind, &mut violations);
    check_unique_names(table, &mut violations);
    if kind == ExportKind::Gee {
        check_required(table, &mut violations);
    }

    for violation in &violations {
        log::error!("{}: {violation}", table.name);
    }
    if violations.is_empty() {
        log::info!("{} passed validation ({} rows)", table.name, table.len());
    }
    Ok(ValidationReport {
        dataset: table.name.clone(),
        violations,
    })
}
