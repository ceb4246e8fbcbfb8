//! Global patch identity.

use changedb_patch_models::{Dataset, Field, FieldValue, Patch};

use crate::EnrichError;

/// `{park}_{mmu}_{index}_{start}_{end}_{yod}_{annualID}`.
#[must_use]
pub fn patch_name(
    park: &str,
    mmu: u32,
    index: &str,
    start_year: i64,
    end_year: i64,
    yod: i64,
    annual_id: i64,
) -> String {
    format!("{park}_{mmu}_{index}_{start_year}_{end_year}_{yod}_{annual_id}")
}

fn name_of(
    patch: &Patch,
    park: &str,
    mmu: u32,
    years: (i64, i64),
    zone_field: &str,
) -> Option<String> {
    let index = match patch.field(Field::Index) {
        FieldValue::Null => return None,
        value => value.to_string(),
    };
    Some(patch_name(
        park,
        mmu,
        &index,
        years.0,
        years.1,
        patch.yod()?,
        patch.zone_id(zone_field)?,
    ))
}

/// Adds `Park` and `PatchName` to every patch of a finalised dataset.
///
/// `years` is the first and last year of the run. Patches missing a name
/// component keep a `Null` name and are reported in one warning.
///
/// # Errors
///
/// Returns a schema error if a field cannot be written.
pub fn add_park_patch_name(
    dataset: &mut Dataset,
    park: &str,
    mmu: u32,
    years: (i64, i64),
    zone_field: &str,
) -> Result<(), EnrichError> {
    dataset.add_known(Field::Park);
    dataset.add_known(Field::PatchName);
    dataset.calculate(Field::Park.as_ref(), |_| park.into())?;

    let mut unnamed = 0;
    dataset.calculate(Field::PatchName.as_ref(), |patch| {
        let name = name_of(patch, park, mmu, years, zone_field);
        unnamed += usize::from(name.is_none());
        name.into()
    })?;
    if unnamed > 0 {
        log::warn!(
            "{unnamed} patch(es) of {} lack index, yod or {zone_field} and have no PatchName",
            dataset.name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::yearly;

    #[test]
    fn name_concatenates_identity_parts() {
        assert_eq!(
            patch_name("PARK", 5, "7", 1990, 2020, 2001, 42),
            "PARK_5_7_1990_2020_2001_42"
        );
    }

    #[test]
    fn every_patch_is_named() {
        let mut ds = yearly(2003, &[(4, 0.0, 0.0, 30.0), (9, 60.0, 0.0, 30.0)]);
        ds.set(1, Field::Index, "b").unwrap();
        add_park_patch_name(&mut ds, "OLYM", 11, (2001, 2005), "annualID").unwrap();
        let names: Vec<Option<&str>> = ds.iter().map(Patch::patch_name).collect();
        assert_eq!(
            names,
            vec![
                Some("OLYM_11_4_2001_2005_2003_4"),
                Some("OLYM_11_b_2001_2005_2003_9")
            ]
        );
        assert!(ds.iter().all(|p| p.field(Field::Park).as_str() == Some("OLYM")));
    }

    #[test]
    fn missing_component_leaves_name_null() {
        let mut ds = yearly(2003, &[(4, 0.0, 0.0, 30.0)]);
        ds.set(0, Field::Index, FieldValue::Null).unwrap();
        add_park_patch_name(&mut ds, "OLYM", 11, (2001, 2005), "annualID").unwrap();
        assert_eq!(ds.patches()[0].patch_name(), None);
    }
}
