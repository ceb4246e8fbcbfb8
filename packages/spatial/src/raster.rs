//! Single-band rasters read from `GeoTIFF` files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use geo::{BoundingRect as _, Intersects as _, MultiPolygon, Point};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray64Float;
use tiff::tags::Tag;

use crate::SpatialError;

/// A north-up, single-band raster grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// X of the upper-left corner.
    pub origin_x: f64,
    /// Y of the upper-left corner.
    pub origin_y: f64,
    /// Cell width in map units.
    pub cell_width: f64,
    /// Cell height in map units (positive).
    pub cell_height: f64,
    /// Number of columns.
    pub cols: usize,
    /// Number of rows.
    pub rows: usize,
    /// Row-major cell values.
    pub data: Vec<f64>,
    /// Value marking cells without data.
    pub nodata: Option<f64>,
}

impl Raster {
    /// Creates a raster with square cells.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::RasterShape`] if `data` does not hold
    /// `cols * rows` values.
    pub fn new(
        origin_x: f64,
        origin_y: f64,
        cell_size: f64,
        cols: usize,
        rows: usize,
        data: Vec<f64>,
    ) -> Result<Self, SpatialError> {
        if data.len() != cols * rows {
            return Err(SpatialError::RasterShape {
                expected: cols * rows,
                actual: data.len(),
            });
        }
        Ok(Self {
            origin_x,
            origin_y,
            cell_width: cell_size,
            cell_height: cell_size,
            cols,
            rows,
            data,
            nodata: None,
        })
    }

    /// Sets the no-data marker, builder style.
    #[must_use]
    pub const fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Reads band 1 of a `GeoTIFF`.
    ///
    /// The grid position comes from the pixel-scale and tiepoint tags; the
    /// no-data value from the GDAL no-data tag when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be decoded or lacks georeferencing.
    pub fn read_geotiff(path: &Path) -> Result<Self, SpatialError> {
        let tiff_err = |source: tiff::TiffError| SpatialError::Tiff {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_err)?;
        let (width, height) = decoder.dimensions().map_err(tiff_err)?;

        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(tiff_err)?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(tiff_err)?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(SpatialError::MissingGeoreference {
                path: path.to_path_buf(),
            });
        }
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

        let data: Vec<f64> = match decoder.read_image().map_err(tiff_err)? {
            DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::F64(buf) => buf,
            _ => {
                return Err(SpatialError::UnsupportedPixelType {
                    path: path.to_path_buf(),
                });
            }
        };

        let cols = width as usize;
        let rows = height as usize;
        let mut raster = Self::new(
            tiepoint[3] - tiepoint[0] * scale[0],
            tiepoint[4] + tiepoint[1] * scale[1],
            scale[0],
            cols,
            rows,
            data,
        )?;
        raster.cell_height = scale[1];
        raster.nodata = nodata;

        log::debug!(
            "Read raster {} ({cols}x{rows}, cell {}x{})",
            path.display(),
            raster.cell_width,
            raster.cell_height
        );
        Ok(raster)
    }

    /// Writes the raster as a 64-bit float `GeoTIFF`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_geotiff(&self, path: &Path) -> Result<(), SpatialError> {
        let tiff_err = |source: tiff::TiffError| SpatialError::Tiff {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err)?;
        let mut image = encoder
            .new_image::<Gray64Float>(self.cols as u32, self.rows as u32)
            .map_err(tiff_err)?;

        let scale = [self.cell_width, self.cell_height, 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &scale[..])
            .map_err(tiff_err)?;
        let tiepoint = [0.0, 0.0, 0.0, self.origin_x, self.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
            .map_err(tiff_err)?;
        if let Some(nodata) = self.nodata {
            image
                .encoder()
                .write_tag(Tag::GdalNodata, nodata.to_string().as_str())
                .map_err(tiff_err)?;
        }
        image.write_data(&self.data).map_err(tiff_err)?;
        Ok(())
    }

    /// Value of a cell, `None` for no-data, NaN or out-of-range cells.
    #[must_use]
    pub fn value(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        let v = self.data[row * self.cols + col];
        if v.is_nan() || self.nodata.is_some_and(|nd| (v - nd).abs() < f64::EPSILON) {
            None
        } else {
            Some(v)
        }
    }

    /// Center of a cell in map coordinates.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_center(&self, col: usize, row: usize) -> Point<f64> {
        Point::new(
            (col as f64 + 0.5).mul_add(self.cell_width, self.origin_x),
            (row as f64 + 0.5).mul_add(-self.cell_height, self.origin_y),
        )
    }

    /// Values of every data cell whose center falls on the footprint.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn cells_in(&self, footprint: &MultiPolygon<f64>) -> Vec<f64> {
        let Some(rect) = footprint.bounding_rect() else {
            return Vec::new();
        };
        let col_of = |x: f64| ((x - self.origin_x) / self.cell_width).floor();
        let row_of = |y: f64| ((self.origin_y - y) / self.cell_height).floor();

        let c0 = col_of(rect.min().x).max(0.0) as usize;
        let c1 = col_of(rect.max().x).min(self.cols as f64 - 1.0);
        let r0 = row_of(rect.max().y).max(0.0) as usize;
        let r1 = row_of(rect.min().y).min(self.rows as f64 - 1.0);
        if c1 < 0.0 || r1 < 0.0 {
            return Vec::new();
        }
        let (c1, r1) = (c1 as usize, r1 as usize);

        let mut values = Vec::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                if footprint.intersects(&self.cell_center(col, row))
                    && let Some(v) = self.value(col, row)
                {
                    values.push(v);
                }
            }
        }
        values
    }
}
