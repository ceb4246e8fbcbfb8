//! In-memory export table: a fixed column list extracted from a dataset.

use std::str::FromStr as _;

use changedb_patch_models::{
    Dataset, EVENT_TYPE_MASK, EVENT_TYPE_MODEL, Field, FieldSpec, FieldType, FieldValue,
};
use changedb_spatial::{GeometryOps, PlanarGeometry};
use geo::MultiPolygon;

use crate::fields::{BLANK_SENTINEL_FIELDS, SHAPE_AREA, SHAPE_LENGTH, ZERO_SENTINEL_FIELDS};

/// One exported patch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    /// Patch footprint.
    pub geometry: MultiPolygon<f64>,
    /// Values in column order.
    pub values: Vec<FieldValue>,
}

/// Rows of a dataset restricted to an export column list.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    /// Source dataset name.
    pub name: String,
    /// Columns in output order.
    pub columns: Vec<FieldSpec>,
    /// Rows in source order.
    pub rows: Vec<ExportRow>,
}

impl ExportTable {
    /// Position of a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of one column, or nothing if the column is not exported.
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a FieldValue> + 'a {
        let column = self.column(name);
        self.rows
            .iter()
            .filter_map(move |row| column.map(|i| &row.values[i]))
    }

    /// Value of `name` in `row`, `Null` when the column is not exported.
    #[must_use]
    pub fn value<'a>(&self, row: &'a ExportRow, name: &str) -> &'a FieldValue {
        self.column(name)
            .map_or(&FieldValue::NULL, |i| &row.values[i])
    }

    /// Adds a column (or replaces the values of an existing one).
    pub fn set_column<F>(&mut self, spec: FieldSpec, mut derive: F)
    where
        F: FnMut(&ExportRow) -> FieldValue,
    {
        let index = if let Some(i) = self.column(&spec.name) {
            self.columns[i] = spec;
            i
        } else {
            self.columns.push(spec);
            for row in &mut self.rows {
                row.values.push(FieldValue::Null);
            }
            self.columns.len() - 1
        };
        for row in &mut self.rows {
            row.values[index] = derive(row);
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn spec_for(name: &str) -> FieldSpec {
    Field::from_str(name).map_or_else(|_| FieldSpec::new(name, FieldType::Double), Field::spec)
}

/// Copies `columns` out of `dataset`.
///
/// Columns the dataset lacks are exported as `Null` and reported in one
/// warning. `Shape_Area` and `Shape_Length` are measured from the geometry
/// when the dataset does not carry them.
#[must_use]
pub fn extract(dataset: &Dataset, columns: &[&str]) -> ExportTable {
    let mut missing = Vec::new();
    let specs: Vec<FieldSpec> = columns
        .iter()
        .map(|&name| {
            if let Some(spec) = dataset.field_spec(name) {
                spec.clone()
            } else {
                if name != SHAPE_AREA && name != SHAPE_LENGTH {
                    missing.push(name);
                }
                spec_for(name)
            }
        })
        .collect();
    if !missing.is_empty() {
        log::warn!(
            "{} has no {} of the exported fields, exporting them as null: {}",
            dataset.name,
            missing.len(),
            missing.join(", ")
        );
    }

    let ops = PlanarGeometry;
    let rows = dataset
        .iter()
        .map(|patch| {
            let values = columns
                .iter()
                .map(|&name| match name {
                    SHAPE_AREA if !dataset.has_field(name) => ops.area(&patch.geometry).into(),
                    SHAPE_LENGTH if !dataset.has_field(name) => {
                        ops.perimeter(&patch.geometry).into()
                    }
                    _ => patch.get(name).clone(),
                })
                .collect();
            ExportRow {
                geometry: patch.geometry.clone(),
                values,
            }
        })
        .collect();

    ExportTable {
        name: dataset.name.clone(),
        columns: specs,
        rows,
    }
}

/// Turns the store's "no value" sentinels into `Null` and flattens line
/// breaks in text values.
///
/// `Confidence` and `DistYear` of `0` and whitespace-only event text become
/// `Null`; carriage returns and newlines become spaces.
pub fn clean(table: &mut ExportTable) {
    let zero_columns: Vec<usize> = ZERO_SENTINEL_FIELDS
        .iter()
        .filter_map(|name| table.column(name))
        .collect();
    let blank_columns: Vec<usize> = BLANK_SENTINEL_FIELDS
        .iter()
        .filter_map(|name| table.column(name))
        .collect();

    let mut nulled = 0_usize;
    for row in &mut table.rows {
        for &i in &zero_columns {
            if row.values[i].as_f64() == Some(0.0) {
                row.values[i] = FieldValue::Null;
                nulled += 1;
            }
        }
        for &i in &blank_columns {
            if !row.values[i].is_null() && row.values[i].is_blank() {
                row.values[i] = FieldValue::Null;
                nulled += 1;
            }
        }
        for value in &mut row.values {
            if let FieldValue::Text(text) = value
                && text.contains(['\r', '\n'])
            {
                *text = text.replace(['\r', '\n'], " ");
            }
        }
    }
    log::debug!("Cleaned {nulled} placeholder values in {}", table.name);
}

/// Whether an `EventType` marks a labeled disturbance worth exporting to GEE.
fn is_exported_event(event_type: &FieldValue) -> bool {
    !event_type.is_blank()
        && event_type
            .as_str()
            .is_some_and(|t| t != EVENT_TYPE_MASK && t != EVENT_TYPE_MODEL)
}

/// Keeps only rows with an `EventType` other than `Mask` and `Model`,
/// returning how many were dropped.
pub fn retain_events(table: &mut ExportTable) -> usize {
    let Some(column) = table.column(Field::EventType.as_ref()) else {
        let dropped = table.rows.len();
        table.rows.clear();
        return dropped;
    };
    let before = table.rows.len();
    table
        .rows
        .retain(|row| is_exported_event(&row.values[column]));
    before - table.rows.len()
}

#[cfg(test)]
mod tests {
    use changedb_patch_models::Patch;
    use changedb_spatial::geometry::rectangle;

    use super::*;

    fn dataset() -> Dataset {
        let mut ds = Dataset::new("TEST_changeDB_2001_2002");
        for field in [Field::PatchName, Field::EventType, Field::Confidence, Field::ChangeDesc] {
            ds.add_known(field);
        }
        ds.push(
            Patch::new(rectangle(0.0, 0.0, 30.0, 60.0))
                .with("PatchName", "a")
                .with("EventType", " ")
                .with("Confidence", 0)
                .with("ChangeDesc", "line one\r\nline two"),
        );
        ds.push(
            Patch::new(rectangle(0.0, 0.0, 30.0, 30.0))
                .with("PatchName", "b")
                .with("EventType", "Mask")
                .with("Confidence", 2),
        );
        ds.push(
            Patch::new(rectangle(0.0, 0.0, 30.0, 30.0))
                .with("PatchName", "c")
                .with("EventType", "Fire")
                .with("Confidence", 3),
        );
        ds
    }

    #[test]
    fn missing_columns_are_null_and_shape_is_measured() {
        let table = extract(&dataset(), &["PatchName", "durMn", SHAPE_AREA, SHAPE_LENGTH]);
        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.columns[1].field_type, FieldType::Double);
        let first = &table.rows[0];
        assert!(first.values[1].is_null());
        assert_eq!(first.values[2].as_f64(), Some(1800.0));
        assert_eq!(first.values[3].as_f64(), Some(180.0));
    }

    #[test]
    fn cleaning_nulls_placeholders() {
        let mut table = extract(&dataset(), &["PatchName", "EventType", "Confidence", "ChangeDesc"]);
        clean(&mut table);
        let first = &table.rows[0];
        assert!(table.value(first, "EventType").is_null());
        assert!(table.value(first, "Confidence").is_null());
        assert_eq!(
            table.value(first, "ChangeDesc").as_str(),
            Some("line one  line two")
        );
        assert_eq!(table.value(&table.rows[2], "Confidence").as_i64(), Some(3));
    }

    #[test]
    fn gee_rows_are_labeled_disturbances() {
        let mut table = extract(&dataset(), &["PatchName", "EventType"]);
        assert_eq!(retain_events(&mut table), 2);
        let names: Vec<_> = table.values("PatchName").filter_map(FieldValue::as_str).collect();
        assert_eq!(names, ["c"]);
    }

    #[test]
    fn blank_event_placeholder_is_not_exported() {
        assert!(!is_exported_event(&FieldValue::Text(" ".to_owned())));
        assert!(!is_exported_event(&FieldValue::Null));
        assert!(!is_exported_event(&FieldValue::Text("Model".to_owned())));
        assert!(is_exported_event(&FieldValue::Text("Fire".to_owned())));
    }
}
