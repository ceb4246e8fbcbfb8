//! Column lists and cleaning rules of the two export formats.

/// Geometry-derived area column of GEE exports.
pub const SHAPE_AREA: &str = "Shape_Area";

/// Geometry-derived perimeter column of GEE exports.
pub const SHAPE_LENGTH: &str = "Shape_Length";

/// Columns of the CSV export, in output order.
pub const CSV_FIELDS: &[&str] = &[
    "Park",
    "PatchName",
    "yod",
    "annualID",
    "X_Coord_m",
    "Y_Coord_m",
    "Latitude",
    "Longitude",
    "UTMX",
    "UTMY",
    "CoordType",
    "idxMagMn",
    "durMn",
    "durSd",
    "area",
    "perim",
    "paratio",
    "Watershed",
    "WildName",
    "LandMgmt",
    "EastWest",
    "ElevMean",
    "SlopeMean",
    "Aspect",
    "Protected",
    "InBuffer",
    "InPark",
    "InMask",
    "VegCode",
    "DistYear",
    "DistName",
    "OverlapPrv",
    "Split",
    "EventType",
    "ChangeType",
    "Confidence",
    "AltType",
    "ChangeDesc",
    "EventDate",
    "LabeledBy",
    "PriorRun",
    "PostDist",
];

/// Columns of the GEE shapefile export, in output order.
pub const GEE_FIELDS: &[&str] = &[
    "AltType",
    "ChangeDesc",
    "ChangeType",
    "Confidence",
    "DistYear",
    "DistName",
    "EventType",
    "InBuffer",
    "InMask",
    "InPark",
    "MAJORAXIS",
    "MINORAXIS",
    "ORIENTATION",
    "Aspect",
    "PatchName",
    "Protected",
    "THICKNESS",
    "X_Coord_m",
    "Y_Coord_m",
    "Latitude",
    "Longitude",
    "paratio",
    "Park",
    "annualID",
    "area",
    "perim",
    "shape_1",
    "index",
    "uniqID",
    "yod",
    "durMn",
    "durSd",
    "idxMagMn",
    "idxMagSd",
    "tcbMagMn",
    "tcbMagSd",
    "tcbPreMn",
    "tcbPreSd",
    "tcbPst01Mn",
    "tcbPst01Sd",
    "tcbPst03Mn",
    "tcbPst03Sd",
    "tcbPst07Mn",
    "tcbPst07Sd",
    "tcbPst15Mn",
    "tcbPst15Sd",
    "tcbPstMn",
    "tcbPstSd",
    "tcgMagMn",
    "tcgMagSd",
    "tcgPreMn",
    "tcgPreSd",
    "tcgPst01Mn",
    "tcgPst01Sd",
    "tcgPst03Mn",
    "tcgPst03Sd",
    "tcgPst07Mn",
    "tcgPst07Sd",
    "tcgPst15Mn",
    "tcgPst15Sd",
    "tcgPstMn",
    "tcgPstSd",
    "tcwMagMn",
    "tcwMagSd",
    "tcwPreMn",
    "tcwPreSd",
    "tcwPst01Mn",
    "tcwPst01Sd",
    "tcwPst03Mn",
    "tcwPst03Sd",
    "tcwPst07Mn",
    "tcwPst07Sd",
    "tcwPst15Mn",
    "tcwPst15Sd",
    "tcwPstMn",
    "tcwPstSd",
    SHAPE_AREA,
    SHAPE_LENGTH,
];

/// GEE columns allowed to stay empty.
pub const GEE_OPTIONAL_FIELDS: &[&str] = &["AltType", "ChangeDesc", "DistYear", "DistName"];

/// Numeric columns where the store writes `0` for "no value".
pub const ZERO_SENTINEL_FIELDS: &[&str] = &["Confidence", "DistYear"];

/// Text columns where the store writes a single space for "no value".
pub const BLANK_SENTINEL_FIELDS: &[&str] =
    &["EventType", "ChangeType", "AltType", "ChangeDesc", "DistName"];

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn column_lists_have_no_duplicates() {
        for list in [CSV_FIELDS, GEE_FIELDS] {
            let unique: BTreeSet<&str> = list.iter().copied().collect();
            assert_eq!(unique.len(), list.len());
        }
    }

    #[test]
    fn optional_fields_are_exported() {
        assert!(GEE_OPTIONAL_FIELDS.iter().all(|f| GEE_FIELDS.contains(f)));
        assert_eq!(GEE_FIELDS.len(), 78);
    }
}
