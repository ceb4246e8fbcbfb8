//! Per-park reference data: configuration and loaded layers.
//!
//! A park directory holds the reference layers of one park. Layer files are
//! found by convention (`OLYM_park_bndry_fc.geojson`, `OLYM_dem_rst.tif`,
//! `OLYM_veg_type_tbl.csv`) unless a `park.toml` in the directory names them
//! explicitly:
//!
//! ```toml
//! code = "OLYM"
//! utm_zone = 10
//!
//! [layers]
//! park_bndry_fc = "boundary/olym_boundary.geojson"
//!
//! [relationships]
//! land_mgmt = "nearest_one_to_one"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use changedb_lookup::VegetationTable;
use changedb_spatial::projection::Utm;
use changedb_spatial::{Raster, ReferenceLayer, SpatialRelationship};
use serde::Deserialize;

use crate::EnrichError;

/// Name of the optional configuration file in a park directory.
pub const PARK_CONFIG_FILE: &str = "park.toml";

/// UTM zone used when the configuration does not name one.
pub const DEFAULT_UTM_ZONE: u8 = 10;

/// Reference data a park can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    /// Study area polygons, needed only when clipping.
    StudyArea,
    /// Park boundary.
    ParkBoundary,
    /// Buffer around the park.
    Buffer,
    /// HUC12 watersheds (`NAME`).
    Watershed,
    /// Land management agencies (`MANAGER`) and wilderness names
    /// (`WildName`).
    LandMgmtWild,
    /// Elevation mask.
    Mask,
    /// Protected areas.
    Protected,
    /// East/west of crest split (`EastWest`).
    EastWest,
    /// Water and lakes mask.
    Water,
    /// Elevation raster.
    Dem,
    /// Slope raster.
    Slope,
    /// Aspect raster.
    Aspect,
    /// Vegetation raster.
    Vegetation,
    /// Vegetation value to code table (`MCID`, `CODE`).
    VegTypeTable,
}

impl LayerKind {
    /// Every kind, in load order.
    pub const ALL: &[Self] = &[
        Self::StudyArea,
        Self::ParkBoundary,
        Self::Buffer,
        Self::Watershed,
        Self::LandMgmtWild,
        Self::Mask,
        Self::Protected,
        Self::EastWest,
        Self::Water,
        Self::Dem,
        Self::Slope,
        Self::Aspect,
        Self::Vegetation,
        Self::VegTypeTable,
    ];

    /// Key used in `park.toml` and in conventional file names.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::StudyArea => "study_area_fc",
            Self::ParkBoundary => "park_bndry_fc",
            Self::Buffer => "buff_fc",
            Self::Watershed => "watershed_fc",
            Self::LandMgmtWild => "land_mgmt_wild_fc",
            Self::Mask => "mask_fc",
            Self::Protected => "protected_fc",
            Self::EastWest => "east_west_fc",
            Self::Water => "water_fc",
            Self::Dem => "dem_rst",
            Self::Slope => "slope_rst",
            Self::Aspect => "aspect_rst",
            Self::Vegetation => "veg_rst",
            Self::VegTypeTable => "veg_type_tbl",
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::Dem | Self::Slope | Self::Aspect | Self::Vegetation => "tif",
            Self::VegTypeTable => "csv",
            _ => "geojson",
        }
    }

    /// Whether a run cannot proceed without this layer.
    #[must_use]
    pub const fn is_required(self, clip: bool) -> bool {
        match self {
            Self::StudyArea => clip,
            Self::Mask | Self::Protected | Self::EastWest | Self::Water | Self::VegTypeTable => {
                false
            }
            _ => true,
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.key() == key)
    }
}

/// Spatial relationship used for each joined attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Relationships {
    /// `InPark` against the park boundary.
    pub in_park: SpatialRelationship,
    /// `InBuffer` against the buffer.
    pub in_buffer: SpatialRelationship,
    /// `Protected` against protected areas.
    pub protected: SpatialRelationship,
    /// `InMask`, tested with the whole footprint.
    pub in_mask: SpatialRelationship,
    /// `LandMgmt` and `WildName`.
    pub land_mgmt: SpatialRelationship,
    /// `Watershed`.
    pub watershed: SpatialRelationship,
    /// `EastWest`.
    pub east_west: SpatialRelationship,
}

impl Default for Relationships {
    fn default() -> Self {
        Self {
            in_park: SpatialRelationship::Intersect,
            in_buffer: SpatialRelationship::Intersect,
            protected: SpatialRelationship::Intersect,
            in_mask: SpatialRelationship::CompletelyWithin,
            land_mgmt: SpatialRelationship::CompletelyWithin,
            watershed: SpatialRelationship::Intersect,
            east_west: SpatialRelationship::Intersect,
        }
    }
}

/// Where a park's reference data lives and how it is joined.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParkConfig {
    /// Four-letter park code.
    pub code: String,
    /// Layer file paths keyed by [`LayerKind::key`].
    pub layers: BTreeMap<String, PathBuf>,
    /// Join relationships.
    pub relationships: Relationships,
    /// UTM zone (northern hemisphere) for `UTMX`/`UTMY`.
    pub utm_zone: Option<u8>,
    /// Prefix of synthesized vegetation codes.
    pub veg_prefix: Option<String>,
}

impl ParkConfig {
    /// Empty configuration for a park code.
    #[must_use]
    pub fn for_code(code: &str) -> Self {
        Self {
            code: code.to_owned(),
            ..Self::default()
        }
    }

    /// Reads the configuration of a park directory.
    ///
    /// `park.toml` is optional. The park code defaults to the first four
    /// characters of the directory name, and every layer the file does not
    /// name is looked up by its conventional file name.
    ///
    /// # Errors
    ///
    /// Returns an error if `park.toml` cannot be read or parsed, names an
    /// unknown layer, or no park code can be determined.
    pub fn load(dir: &Path) -> Result<Self, EnrichError> {
        let file = dir.join(PARK_CONFIG_FILE);
        let mut config = if file.is_file() {
            let text = std::fs::read_to_string(&file).map_err(|source| EnrichError::Io {
                path: file.clone(),
                source,
            })?;
            toml::from_str::<Self>(&text).map_err(|source| EnrichError::ParkConfig {
                path: file.clone(),
                source,
            })?
        } else {
            Self::default()
        };

        if config.code.is_empty() {
            config.code = dir
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.chars().take(4).collect())
                .unwrap_or_default();
        }
        if config.code.is_empty() {
            return Err(EnrichError::Config(format!(
                "cannot determine the park code of {}",
                dir.display()
            )));
        }

        if let Some(unknown) = config
            .layers
            .keys()
            .find(|k| LayerKind::from_key(k).is_none())
        {
            return Err(EnrichError::Config(format!(
                "{} names unknown layer '{unknown}'",
                file.display()
            )));
        }

        for path in config.layers.values_mut() {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
        for kind in LayerKind::ALL {
            if config.layers.contains_key(kind.key()) {
                continue;
            }
            let path = dir.join(format!("{}_{}.{}", config.code, kind.key(), kind.extension()));
            if path.is_file() {
                config.layers.insert(kind.key().to_owned(), path);
            }
        }
        log::debug!(
            "Park {} configured with {} layers from {}",
            config.code,
            config.layers.len(),
            dir.display()
        );
        Ok(config)
    }

    /// Path of a layer, if the park has it.
    #[must_use]
    pub fn path(&self, kind: LayerKind) -> Option<&Path> {
        self.layers.get(kind.key()).map(PathBuf::as_path)
    }

    /// Required layers the park lacks.
    #[must_use]
    pub fn missing_required(&self, clip: bool) -> Vec<LayerKind> {
        LayerKind::ALL
            .iter()
            .copied()
            .filter(|k| k.is_required(clip) && self.path(*k).is_none())
            .collect()
    }

    /// Projection of `UTMX`/`UTMY`.
    #[must_use]
    pub fn utm(&self) -> Utm {
        Utm::nad83_north(self.utm_zone.unwrap_or(DEFAULT_UTM_ZONE))
    }

    /// Prefix of synthesized vegetation codes: the configured prefix, else
    /// the first letter of the park code.
    #[must_use]
    pub fn veg_prefix(&self) -> String {
        self.veg_prefix
            .clone()
            .unwrap_or_else(|| self.code.chars().take(1).collect())
    }
}

/// Reference layers of one park, loaded into memory.
#[derive(Debug)]
pub struct ParkLayers {
    /// Configuration the layers were loaded from.
    pub config: ParkConfig,
    /// Study area, present when clipping.
    pub study_area: Option<ReferenceLayer>,
    /// Park boundary.
    pub boundary: ReferenceLayer,
    /// Park buffer.
    pub buffer: ReferenceLayer,
    /// Watersheds.
    pub watershed: ReferenceLayer,
    /// Land management and wilderness areas.
    pub land_mgmt: ReferenceLayer,
    /// Elevation mask.
    pub mask: Option<ReferenceLayer>,
    /// Protected areas.
    pub protected: Option<ReferenceLayer>,
    /// East/west split.
    pub east_west: Option<ReferenceLayer>,
    /// Water mask.
    pub water: Option<ReferenceLayer>,
    /// Elevation.
    pub dem: Raster,
    /// Slope.
    pub slope: Raster,
    /// Aspect.
    pub aspect: Raster,
    /// Vegetation type values.
    pub vegetation: Raster,
    /// Vegetation code table.
    pub veg_table: Option<VegetationTable>,
}

impl ParkLayers {
    /// Loads every configured layer.
    ///
    /// Missing required layers are reported together before anything is
    /// read.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Config`] if required layers are missing, or a
    /// read error if a layer file is invalid.
    pub fn load(config: ParkConfig, clip: bool) -> Result<Self, EnrichError> {
        let missing = config.missing_required(clip);
        if !missing.is_empty() {
            let keys: Vec<&str> = missing.iter().map(|k| k.key()).collect();
            return Err(EnrichError::Config(format!(
                "park {} is missing required layers: {}",
                config.code,
                keys.join(", ")
            )));
        }

        let vector = |kind: LayerKind| -> Result<Option<ReferenceLayer>, EnrichError> {
            config
                .path(kind)
                .map(|path| ReferenceLayer::load_geojson(kind.key(), path))
                .transpose()
                .map_err(EnrichError::from)
        };
        let required_vector = |kind: LayerKind| -> Result<ReferenceLayer, EnrichError> {
            vector(kind)?.ok_or_else(|| EnrichError::Config(format!("missing {}", kind.key())))
        };
        let raster = |kind: LayerKind| -> Result<Raster, EnrichError> {
            let path = config
                .path(kind)
                .ok_or_else(|| EnrichError::Config(format!("missing {}", kind.key())))?;
            Ok(Raster::read_geotiff(path)?)
        };

        let layers = Self {
            study_area: if clip { vector(LayerKind::StudyArea)? } else { None },
            boundary: required_vector(LayerKind::ParkBoundary)?,
            buffer: required_vector(LayerKind::Buffer)?,
            watershed: required_vector(LayerKind::Watershed)?,
            land_mgmt: required_vector(LayerKind::LandMgmtWild)?,
            mask: vector(LayerKind::Mask)?,
            protected: vector(LayerKind::Protected)?,
            east_west: vector(LayerKind::EastWest)?,
            water: vector(LayerKind::Water)?,
            dem: raster(LayerKind::Dem)?,
            slope: raster(LayerKind::Slope)?,
            aspect: raster(LayerKind::Aspect)?,
            vegetation: raster(LayerKind::Vegetation)?,
            veg_table: config
                .path(LayerKind::VegTypeTable)
                .map(VegetationTable::from_csv)
                .transpose()?,
            config,
        };
        log::info!(
            "Loaded reference layers for {} (mask: {}, protected: {}, east/west: {}, water: {})",
            layers.code(),
            layers.mask.is_some(),
            layers.protected.is_some(),
            layers.east_west.is_some(),
            layers.water.is_some()
        );
        Ok(layers)
    }

    /// Park code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.config.code
    }

    /// Whether the park has an elevation mask.
    #[must_use]
    pub const fn has_mask(&self) -> bool {
        self.mask.is_some()
    }
}
