//! Polygon reference layers indexed with an R-tree.

use std::collections::BTreeMap;
use std::path::Path;

use changedb_patch_models::FieldValue;
use geo::{Area as _, BooleanOps as _, Contains as _, Coord, Intersects as _, MultiPolygon, Point};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::SpatialError;
use crate::geometry::{GeometryOps as _, PlanarGeometry, compute_envelope, distance_to_boundary};
use crate::geometry::multipolygon_from_geojson;

/// Spatial predicate used to match a probe against layer features.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpatialRelationship {
    /// The probe shares any point with the feature (boundary included).
    Intersect,
    /// The probe lies entirely inside a single feature.
    CompletelyWithin,
    /// The feature that intersects the probe, else the closest feature.
    NearestOneToOne,
}

/// Geometry tested against a layer.
#[derive(Debug, Clone, Copy)]
pub enum Probe<'a> {
    /// A representative point.
    Point(Point<f64>),
    /// A whole patch footprint.
    Footprint(&'a MultiPolygon<f64>),
}

impl Probe<'_> {
    fn envelope(&self) -> AABB<[f64; 2]> {
        match self {
            Self::Point(p) => AABB::from_point([p.x(), p.y()]),
            Self::Footprint(mp) => compute_envelope(mp),
        }
    }

    fn anchor(&self) -> Option<Coord<f64>> {
        match self {
            Self::Point(p) => Some(p.0),
            Self::Footprint(mp) => PlanarGeometry.central_point(mp).map(|p| p.0),
        }
    }
}

/// One polygon feature of a reference layer with its attributes.
#[derive(Debug, Clone)]
pub struct LayerFeature {
    /// Feature attributes.
    pub attributes: BTreeMap<String, FieldValue>,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl LayerFeature {
    /// Creates a feature.
    #[must_use]
    pub fn new(polygon: MultiPolygon<f64>, attributes: BTreeMap<String, FieldValue>) -> Self {
        Self {
            attributes,
            envelope: compute_envelope(&polygon),
            polygon,
        }
    }

    /// Feature footprint.
    #[must_use]
    pub const fn polygon(&self) -> &MultiPolygon<f64> {
        &self.polygon
    }

    /// Attribute value, `Null` when absent.
    #[must_use]
    pub fn attribute(&self, name: &str) -> &FieldValue {
        self.attributes.get(name).unwrap_or(&FieldValue::NULL)
    }

    fn matches(&self, probe: &Probe<'_>, relationship: SpatialRelationship) -> bool {
        match (relationship, probe) {
            (SpatialRelationship::Intersect | SpatialRelationship::NearestOneToOne, Probe::Point(p)) => {
                self.polygon.intersects(p)
            }
            (
                SpatialRelationship::Intersect | SpatialRelationship::NearestOneToOne,
                Probe::Footprint(mp),
            ) => self.polygon.intersects(*mp),
            (SpatialRelationship::CompletelyWithin, Probe::Point(p)) => self.polygon.contains(p),
            (SpatialRelationship::CompletelyWithin, Probe::Footprint(mp)) => {
                !mp.0.is_empty() && self.polygon.contains(*mp)
            }
        }
    }
}

impl RTreeObject for LayerFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A named, read-only polygon layer with an R-tree index.
pub struct ReferenceLayer {
    name: String,
    features: RTree<LayerFeature>,
}

impl std::fmt::Debug for ReferenceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceLayer")
            .field("name", &self.name)
            .field("features", &self.features.size())
            .finish()
    }
}

impl ReferenceLayer {
    /// Builds a layer from features.
    #[must_use]
    pub fn from_features(name: impl Into<String>, features: Vec<LayerFeature>) -> Self {
        Self {
            name: name.into(),
            features: RTree::bulk_load(features),
        }
    }

    /// Loads a `GeoJSON` `FeatureCollection` of polygons.
    ///
    /// Non-areal features are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a feature
    /// collection.
    pub fn load_geojson(name: impl Into<String>, path: &Path) -> Result<Self, SpatialError> {
        let name = name.into();
        let text = std::fs::read_to_string(path).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let geojson: GeoJson = text.parse().map_err(|source| SpatialError::GeoJson {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(SpatialError::NotAFeatureCollection {
                path: path.to_path_buf(),
            });
        };

        let mut features = Vec::with_capacity(collection.features.len());
        for (i, feature) in collection.features.into_iter().enumerate() {
            let Some(polygon) = feature.geometry.and_then(multipolygon_from_geojson) else {
                log::warn!("Skipping non-polygon feature {i} in layer {name}");
                continue;
            };
            let attributes = feature
                .properties
                .unwrap_or_default()
                .iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect();
            features.push(LayerFeature::new(polygon, attributes));
        }

        log::info!("Loaded {} features into layer {name}", features.len());
        Ok(Self::from_features(name, features))
    }

    /// Layer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.size()
    }

    /// Whether the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.size() == 0
    }

    /// Whether any feature matches the probe.
    #[must_use]
    pub fn selects(&self, probe: &Probe<'_>, relationship: SpatialRelationship) -> bool {
        self.find(probe, relationship).is_some()
    }

    /// The feature matched by the probe under `relationship`.
    ///
    /// `NearestOneToOne` falls back to the feature with the shortest
    /// boundary distance from the probe's anchor point when nothing
    /// intersects. Ties go to the first feature in index order.
    #[must_use]
    pub fn find(&self, probe: &Probe<'_>, relationship: SpatialRelationship) -> Option<&LayerFeature> {
        let env = probe.envelope();
        let hit = self
            .features
            .locate_in_envelope_intersecting(&env)
            .find(|f| f.matches(probe, relationship));
        if hit.is_some() || relationship != SpatialRelationship::NearestOneToOne {
            return hit;
        }

        let anchor = probe.anchor()?;
        self.features
            .iter()
            .map(|f| (distance_to_boundary(anchor, &f.polygon), f))
            .filter(|(d, _)| d.is_finite())
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, f)| f)
    }

    /// Whether the footprint shares more than `min_area` square units with
    /// any feature.
    ///
    /// Features that only touch along an edge or a corner share zero area
    /// and never count.
    #[must_use]
    pub fn overlaps(&self, footprint: &MultiPolygon<f64>, min_area: f64) -> bool {
        let env = compute_envelope(footprint);
        self.features
            .locate_in_envelope_intersecting(&env)
            .filter(|f| f.polygon.intersects(footprint))
            .any(|f| f.polygon.intersection(footprint).unsigned_area() > min_area)
    }

    /// Union of every feature footprint.
    #[must_use]
    pub fn union(&self) -> MultiPolygon<f64> {
        self.features
            .iter()
            .fold(MultiPolygon(vec![]), |acc, f| acc.union(&f.polygon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rectangle;

    fn feature(mp: MultiPolygon<f64>, key: &str, value: &str) -> LayerFeature {
        let mut attrs = BTreeMap::new();
        attrs.insert(key.to_owned(), FieldValue::from(value));
        LayerFeature::new(mp, attrs)
    }

    fn layer() -> ReferenceLayer {
        ReferenceLayer::from_features(
            "watershed",
            vec![
                feature(rectangle(0.0, 0.0, 100.0, 100.0), "NAME", "West Fork"),
                feature(rectangle(100.0, 0.0, 200.0, 100.0), "NAME", "East Fork"),
            ],
        )
    }

    #[test]
    fn point_intersect_and_within() {
        let l = layer();
        let inside = Probe::Point(Point::new(50.0, 50.0));
        let found = l.find(&inside, SpatialRelationship::Intersect).unwrap();
        assert_eq!(found.attribute("NAME"), &FieldValue::from("West Fork"));
        assert!(l.selects(&inside, SpatialRelationship::CompletelyWithin));

        let outside = Probe::Point(Point::new(50.0, 150.0));
        assert!(!l.selects(&outside, SpatialRelationship::Intersect));
    }

    #[test]
    fn footprint_completely_within_single_feature() {
        let l = layer();
        let straddling = rectangle(90.0, 10.0, 110.0, 20.0);
        assert!(l.selects(&Probe::Footprint(&straddling), SpatialRelationship::Intersect));
        assert!(!l.selects(
            &Probe::Footprint(&straddling),
            SpatialRelationship::CompletelyWithin
        ));
        let inner = rectangle(10.0, 10.0, 20.0, 20.0);
        assert!(l.selects(&Probe::Footprint(&inner), SpatialRelationship::CompletelyWithin));
    }

    #[test]
    fn nearest_falls_back_to_closest() {
        let l = layer();
        let probe = Probe::Point(Point::new(190.0, 130.0));
        let found = l.find(&probe, SpatialRelationship::NearestOneToOne).unwrap();
        assert_eq!(found.attribute("NAME"), &FieldValue::from("East Fork"));
    }

    #[test]
    fn shared_edge_is_not_overlap() {
        let previous = ReferenceLayer::from_features(
            "prev",
            vec![LayerFeature::new(rectangle(0.0, 0.0, 30.0, 30.0), BTreeMap::new())],
        );
        assert!(!previous.overlaps(&rectangle(30.0, 0.0, 60.0, 30.0), 1.0));
        assert!(previous.overlaps(&rectangle(15.0, 0.0, 45.0, 30.0), 1.0));
    }

    #[test]
    fn union_merges_features() {
        let merged = layer().union();
        assert!((merged.unsigned_area() - 20_000.0).abs() < 1e-6);
    }

    #[test]
    fn loads_feature_collection() {
        let dir = std::env::temp_dir().join("changedb_spatial_layer_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("park.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"UNIT":"OLYM"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
                {"type":"Feature","properties":{},
                 "geometry":{"type":"Point","coordinates":[1,1]}}
            ]}"#,
        )
        .unwrap();
        let l = ReferenceLayer::load_geojson("park", &path).unwrap();
        assert_eq!(l.len(), 1);
        let f = l
            .find(&Probe::Point(Point::new(5.0, 5.0)), SpatialRelationship::Intersect)
            .unwrap();
        assert_eq!(f.attribute("UNIT").as_str(), Some("OLYM"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
