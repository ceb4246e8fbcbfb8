//! Patches and typed-column datasets.

use std::collections::{BTreeMap, BTreeSet};

use geo::MultiPolygon;

use crate::field::{Field, FieldSpec, FieldValue};

/// Errors raised when a dataset operation does not fit the schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A value was written to a column the dataset does not have.
    #[error("dataset '{dataset}' has no field '{field}'")]
    UnknownField {
        /// Dataset name.
        dataset: String,
        /// Missing column.
        field: String,
    },
    /// Appended records carry a different set of columns.
    #[error("cannot append '{source_name}' to '{target}': schemas differ (missing {missing:?}, extra {extra:?})")]
    Mismatch {
        /// Target dataset name.
        target: String,
        /// Appended dataset name.
        source_name: String,
        /// Target columns the appended dataset lacks.
        missing: Vec<String>,
        /// Appended columns the target lacks.
        extra: Vec<String>,
    },
}

/// One polygon record for one year of observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Patch footprint in the dataset's projected coordinate system.
    pub geometry: MultiPolygon<f64>,
    /// Attribute values keyed by column name.
    pub attributes: BTreeMap<String, FieldValue>,
}

impl Patch {
    /// Creates a patch with no attributes.
    #[must_use]
    pub const fn new(geometry: MultiPolygon<f64>) -> Self {
        Self {
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Value of a column, `Null` when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &FieldValue {
        self.attributes.get(name).unwrap_or(&FieldValue::NULL)
    }

    /// Value of a known field, `Null` when absent.
    #[must_use]
    pub fn field(&self, field: Field) -> &FieldValue {
        self.get(field.as_ref())
    }

    /// Integer value of a known field.
    #[must_use]
    pub fn integer(&self, field: Field) -> Option<i64> {
        self.field(field).as_i64()
    }

    /// Zone identifier stored under `zone_field`.
    #[must_use]
    pub fn zone_id(&self, zone_field: &str) -> Option<i64> {
        self.get(zone_field).as_i64()
    }

    /// Year of disturbance.
    #[must_use]
    pub fn yod(&self) -> Option<i64> {
        self.integer(Field::Yod)
    }

    /// Global identity, once assigned.
    #[must_use]
    pub fn patch_name(&self) -> Option<&str> {
        self.field(Field::PatchName).as_str()
    }
}

/// A named collection of patches sharing one typed schema.
///
/// Attribute values are always coerced to their column's type on write, and
/// deleting a column removes its values from every patch, so a column is
/// either present with a value (possibly `Null`) on every patch or absent
/// everywhere.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    /// Dataset name (file stem in the store).
    pub name: String,
    fields: Vec<FieldSpec>,
    patches: Vec<Patch>,
}

impl Dataset {
    /// Creates an empty dataset without columns.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Creates an empty dataset with the given columns.
    #[must_use]
    pub fn with_fields(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
            patches: Vec::new(),
        }
    }

    /// Column specs in schema order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Column names in schema order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Spec of a column.
    #[must_use]
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the dataset has a column.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field_spec(name).is_some()
    }

    /// Adds a column initialised to `Null`. Returns `false` if a column of
    /// that name already exists (the existing column is kept).
    pub fn add_field(&mut self, spec: FieldSpec) -> bool {
        if self.has_field(&spec.name) {
            return false;
        }
        for patch in &mut self.patches {
            patch.attributes.insert(spec.name.clone(), FieldValue::Null);
        }
        self.fields.push(spec);
        true
    }

    /// Adds a known field with its registered spec.
    pub fn add_known(&mut self, field: Field) -> bool {
        self.add_field(field.spec())
    }

    /// Deletes a column and its values. Returns `false` if it did not exist.
    pub fn delete_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.name != name);
        if self.fields.len() == before {
            return false;
        }
        for patch in &mut self.patches {
            patch.attributes.remove(name);
        }
        true
    }

    /// Deletes every listed field that exists, returning how many were
    /// removed.
    pub fn delete_fields(&mut self, fields: &[Field]) -> usize {
        fields
            .iter()
            .filter(|f| self.delete_field(f.as_ref()))
            .count()
    }

    /// Sets one value, coerced to the column type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] if the column does not exist.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set_value(
        &mut self,
        index: usize,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), SchemaError> {
        let field_type = self.require(name)?.field_type;
        self.patches[index]
            .attributes
            .insert(name.to_owned(), value.into().coerce(field_type));
        Ok(())
    }

    /// Sets one value of a known field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] if the column does not exist.
    pub fn set(
        &mut self,
        index: usize,
        field: Field,
        value: impl Into<FieldValue>,
    ) -> Result<(), SchemaError> {
        self.set_value(index, field.as_ref(), value)
    }

    /// Computes a column for every patch.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] if the column does not exist.
    pub fn calculate<F>(&mut self, name: &str, derive: F) -> Result<(), SchemaError>
    where
        F: FnMut(&Patch) -> FieldValue,
    {
        self.calculate_where(name, |_| true, derive)
    }

    /// Computes a column for every patch matching `filter`; other patches
    /// keep their value.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] if the column does not exist.
    pub fn calculate_where<P, F>(
        &mut self,
        name: &str,
        mut filter: P,
        mut derive: F,
    ) -> Result<(), SchemaError>
    where
        P: FnMut(&Patch) -> bool,
        F: FnMut(&Patch) -> FieldValue,
    {
        let field_type = self.require(name)?.field_type;
        for patch in &mut self.patches {
            if filter(patch) {
                let value = derive(patch).coerce(field_type);
                patch.attributes.insert(name.to_owned(), value);
            }
        }
        Ok(())
    }

    /// Adds a patch, filling missing columns with `Null` and dropping
    /// attributes the schema does not have.
    pub fn push(&mut self, mut patch: Patch) {
        let mut attributes = BTreeMap::new();
        for spec in &self.fields {
            let value = patch
                .attributes
                .remove(&spec.name)
                .unwrap_or_default()
                .coerce(spec.field_type);
            attributes.insert(spec.name.clone(), value);
        }
        patch.attributes = attributes;
        self.patches.push(patch);
    }

    /// Appends every patch of `other`.
    ///
    /// An empty dataset without columns adopts `other`'s schema; otherwise
    /// both must have the same column names (order may differ).
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Mismatch`] if the column sets differ; nothing
    /// is appended in that case.
    pub fn append(&mut self, other: Self) -> Result<usize, SchemaError> {
        if self.fields.is_empty() && self.patches.is_empty() {
            self.fields = other.fields;
        } else {
            let ours: BTreeSet<&str> = self.field_names().collect();
            let theirs: BTreeSet<&str> = other.field_names().collect();
            if ours != theirs {
                let missing = ours.difference(&theirs).map(|s| (*s).to_owned()).collect();
                let extra = theirs.difference(&ours).map(|s| (*s).to_owned()).collect();
                return Err(SchemaError::Mismatch {
                    target: self.name.clone(),
                    source_name: other.name.clone(),
                    missing,
                    extra,
                });
            }
        }
        let count = other.patches.len();
        for patch in other.patches {
            self.push(patch);
        }
        Ok(count)
    }

    /// Copies the patches matching `filter` into a new dataset with the same
    /// schema.
    #[must_use]
    pub fn select<P>(&self, name: impl Into<String>, mut filter: P) -> Self
    where
        P: FnMut(&Patch) -> bool,
    {
        Self {
            name: name.into(),
            fields: self.fields.clone(),
            patches: self.patches.iter().filter(|p| filter(p)).cloned().collect(),
        }
    }

    /// Keeps only the patches matching `filter`, returning how many were
    /// removed.
    pub fn retain<P>(&mut self, filter: P) -> usize
    where
        P: FnMut(&Patch) -> bool,
    {
        let before = self.patches.len();
        self.patches.retain(filter);
        before - self.patches.len()
    }

    /// Minimum and maximum year of disturbance.
    #[must_use]
    pub fn years(&self) -> Option<(i64, i64)> {
        let mut years = self.patches.iter().filter_map(Patch::yod);
        let first = years.next()?;
        Some(years.fold((first, first), |(lo, hi), y| (lo.min(y), hi.max(y))))
    }

    /// Patches in insertion order.
    #[must_use]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Mutable access to patches (geometry edits).
    pub fn patches_mut(&mut self) -> &mut [Patch] {
        &mut self.patches
    }

    /// Iterates over patches.
    pub fn iter(&self) -> std::slice::Iter<'_, Patch> {
        self.patches.iter()
    }

    /// Number of patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Whether the dataset has no patches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    fn require(&self, name: &str) -> Result<&FieldSpec, SchemaError> {
        self.field_spec(name)
            .ok_or_else(|| SchemaError::UnknownField {
                dataset: self.name.clone(),
                field: name.to_owned(),
            })
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Patch;
    type IntoIter = std::slice::Iter<'a, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.iter()
    }
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;
    use crate::field::FieldType;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn sample() -> Dataset {
        let mut ds = Dataset::with_fields(
            "change_2001",
            vec![Field::AnnualId.spec(), Field::Yod.spec()],
        );
        ds.push(Patch::new(square(0.0, 0.0, 30.0)).with("annualID", 1).with("yod", 2001));
        ds.push(Patch::new(square(60.0, 0.0, 30.0)).with("annualID", 2).with("yod", 2001));
        ds
    }

    #[test]
    fn add_field_initialises_nulls() {
        let mut ds = sample();
        assert!(ds.add_known(Field::InPark));
        assert!(!ds.add_known(Field::InPark));
        assert!(ds.iter().all(|p| p.field(Field::InPark).is_null()));
    }

    #[test]
    fn set_value_coerces_and_checks_schema() {
        let mut ds = sample();
        ds.add_known(Field::Area);
        ds.set(0, Field::Area, 900.4).unwrap();
        assert_eq!(ds.patches()[0].field(Field::Area), &FieldValue::Integer(900));
        assert!(matches!(
            ds.set(0, Field::Perim, 1),
            Err(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn delete_field_removes_values() {
        let mut ds = sample();
        ds.add_known(Field::Datum);
        ds.calculate("Datum", |_| "NAD83".into()).unwrap();
        assert_eq!(ds.delete_fields(&[Field::Datum, Field::VegCode]), 1);
        assert!(!ds.has_field("Datum"));
        assert!(ds.iter().all(|p| !p.attributes.contains_key("Datum")));
    }

    #[test]
    fn push_fills_schema() {
        let mut ds = sample();
        ds.push(Patch::new(square(0.0, 60.0, 30.0)).with("other", "x"));
        let last = &ds.patches()[2];
        assert!(last.get("annualID").is_null());
        assert!(!last.attributes.contains_key("other"));
    }

    #[test]
    fn append_requires_matching_schema() {
        let mut cumulative = Dataset::new("changeDB");
        assert_eq!(cumulative.append(sample()).unwrap(), 2);

        let mut other = sample();
        other.add_field(FieldSpec::new("extra", FieldType::Short));
        let err = cumulative.append(other).unwrap_err();
        let SchemaError::Mismatch {
            target,
            source_name,
            missing,
            extra,
        } = err
        else {
            panic!("expected a schema mismatch");
        };
        assert_eq!(target, "changeDB");
        assert_eq!(source_name, "change_2001");
        assert!(missing.is_empty());
        assert_eq!(extra, ["extra"]);
        assert_eq!(cumulative.len(), 2);
    }

    #[test]
    fn years_spans_yod() {
        let mut ds = sample();
        ds.push(Patch::new(square(0.0, 60.0, 30.0)).with("yod", 1995));
        assert_eq!(ds.years(), Some((1995, 2001)));
        assert_eq!(Dataset::new("empty").years(), None);
    }

    #[test]
    fn select_and_retain() {
        let mut ds = sample();
        let one = ds.select("one", |p| p.zone_id("annualID") == Some(1));
        assert_eq!(one.len(), 1);
        assert_eq!(one.fields(), ds.fields());
        assert_eq!(ds.retain(|p| p.zone_id("annualID") == Some(2)), 1);
        assert_eq!(ds.len(), 1);
    }
}
