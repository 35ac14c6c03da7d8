//! Raster inputs: decoded pixels plus georeferencing metadata.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use georeg_core::{GeoTransform, GeotransformError};
use image::{GrayImage, ImageReader};
use tiff::decoder::Decoder;
use tiff::tags::Tag;

/// World-file sidecar extensions, tried in order.
const WORLD_FILE_EXTENSIONS: [&str; 3] = ["tfw", "tifw", "wld"];

#[derive(thiserror::Error, Debug)]
pub enum RasterError {
    #[error("cannot open raster {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode raster {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot read GeoTIFF tags from {}: {source}", .path.display())]
    Tags {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },
    #[error("georeferencing of {}: {source}", .path.display())]
    Geotransform {
        path: PathBuf,
        #[source]
        source: GeotransformError,
    },
}

/// A raster the pipeline can read pixels and georeferencing from.
pub trait RasterSource: Sync {
    fn path(&self) -> &Path;

    /// Decode the full raster as 8-bit luma.
    fn decode_gray(&self) -> Result<GrayImage, RasterError>;

    /// The pixel → geo affine transform of this raster.
    fn geotransform(&self) -> Result<GeoTransform, RasterError>;
}

/// File-backed raster: any format `image` decodes, georeferenced by GeoTIFF
/// tags or a world-file sidecar.
#[derive(Clone, Debug)]
pub struct GeoTiffRaster {
    path: PathBuf,
    geotransform_override: Option<GeoTransform>,
}

impl GeoTiffRaster {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RasterError> {
        let path = path.into();
        fs::metadata(&path).map_err(|source| RasterError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            geotransform_override: None,
        })
    }

    /// Use `geotransform` instead of whatever the file's metadata says.
    pub fn with_geotransform(mut self, geotransform: GeoTransform) -> Self {
        self.geotransform_override = Some(geotransform);
        self
    }

    fn is_tiff(&self) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
    }

    fn geotransform_from_tags(&self) -> Result<Option<GeoTransform>, RasterError> {
        let tags_err = |source| RasterError::Tags {
            path: self.path.clone(),
            source,
        };
        let file = File::open(&self.path).map_err(|source| RasterError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(tags_err)?;

        let mut read = |tag: Tag| -> Result<Option<Vec<f64>>, RasterError> {
            match decoder.find_tag(tag).map_err(tags_err)? {
                Some(value) => Ok(Some(value.into_f64_vec().map_err(tags_err)?)),
                None => Ok(None),
            }
        };

        let coeffs = if let Some(m) = read(Tag::ModelTransformationTag)? {
            Some(from_model_transformation(&m))
        } else {
            match (read(Tag::ModelTiepointTag)?, read(Tag::ModelPixelScaleTag)?) {
                (Some(tie), Some(scale)) => Some(from_tiepoint_and_scale(&tie, &scale)),
                _ => None,
            }
        };

        coeffs
            .map(|c| {
                c.and_then(GeoTransform::new)
                    .map_err(|source| RasterError::Geotransform {
                        path: self.path.clone(),
                        source,
                    })
            })
            .transpose()
    }

    fn geotransform_from_world_file(&self) -> Result<Option<GeoTransform>, RasterError> {
        for ext in WORLD_FILE_EXTENSIONS {
            let sidecar = self.path.with_extension(ext);
            if !sidecar.is_file() {
                continue;
            }
            let text = fs::read_to_string(&sidecar).map_err(|source| RasterError::Open {
                path: sidecar.clone(),
                source,
            })?;
            log::debug!("georeferencing {} from {}", self.path.display(), sidecar.display());
            return parse_world_file(&text)
                .map(Some)
                .map_err(|source| RasterError::Geotransform {
                    path: sidecar,
                    source,
                });
        }
        Ok(None)
    }
}

impl RasterSource for GeoTiffRaster {
    fn path(&self) -> &Path {
        &self.path
    }

    fn decode_gray(&self) -> Result<GrayImage, RasterError> {
        let open_err = |source| RasterError::Open {
            path: self.path.clone(),
            source,
        };
        let mut reader = ImageReader::open(&self.path)
            .map_err(open_err)?
            .with_guessed_format()
            .map_err(open_err)?;
        // georeferenced scenes routinely exceed the default allocation limit
        reader.no_limits();
        let image = reader.decode().map_err(|source| RasterError::Decode {
            path: self.path.clone(),
            source,
        })?;
        Ok(image.into_luma8())
    }

    fn geotransform(&self) -> Result<GeoTransform, RasterError> {
        if let Some(gt) = self.geotransform_override {
            return Ok(gt);
        }
        if self.is_tiff() {
            if let Some(gt) = self.geotransform_from_tags()? {
                return Ok(gt);
            }
        }
        if let Some(gt) = self.geotransform_from_world_file()? {
            return Ok(gt);
        }
        Err(RasterError::Geotransform {
            path: self.path.clone(),
            source: GeotransformError::Missing,
        })
    }
}

/// `ModelTransformationTag` is a row-major 4x4 matrix; only the x/y rows matter.
fn from_model_transformation(m: &[f64]) -> Result<[f64; 6], GeotransformError> {
    if m.len() < 8 {
        return Err(GeotransformError::WrongCount { got: m.len() });
    }
    Ok([m[3], m[0], m[1], m[7], m[4], m[5]])
}

/// North-up transform from the first tiepoint `(I, J, K, X, Y, Z)` and pixel scale.
fn from_tiepoint_and_scale(tie: &[f64], scale: &[f64]) -> Result<[f64; 6], GeotransformError> {
    if tie.len() < 6 {
        return Err(GeotransformError::WrongCount { got: tie.len() });
    }
    if scale.len() < 2 {
        return Err(GeotransformError::WrongCount { got: scale.len() });
    }
    let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
    let (sx, sy) = (scale[0], scale[1]);
    Ok([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy])
}

/// World files list `A D B E C F`, with `C`/`F` at the centre of the top-left pixel.
fn parse_world_file(text: &str) -> Result<GeoTransform, GeotransformError> {
    let values = text
        .split_whitespace()
        .enumerate()
        .map(|(index, token)| {
            token
                .parse::<f64>()
                .map_err(|_| GeotransformError::NotNumeric {
                    index,
                    token: token.to_string(),
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    let [a, d, b, e, c, f] = <[f64; 6]>::try_from(values.as_slice())
        .map_err(|_| GeotransformError::WrongCount { got: values.len() })?;
    GeoTransform::new([c - 0.5 * a - 0.5 * b, a, b, f - 0.5 * d - 0.5 * e, d, e])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn world_file_is_shifted_to_pixel_corner() {
        let gt = parse_world_file("2.0\n0.0\n0.0\n-2.0\n101.0\n199.0\n").unwrap();
        assert_eq!(gt.coefficients(), [100.0, 2.0, 0.0, 200.0, 0.0, -2.0]);
    }

    #[test]
    fn world_file_rejects_garbage() {
        assert!(matches!(
            parse_world_file("1 0 0 -1 x 5"),
            Err(GeotransformError::NotNumeric { index: 4, .. })
        ));
        assert!(matches!(
            parse_world_file("1 0 0 -1 5"),
            Err(GeotransformError::WrongCount { got: 5 })
        ));
    }

    #[test]
    fn tiepoint_scale_gives_north_up_transform() {
        let c = from_tiepoint_and_scale(&[0.0, 0.0, 0.0, 500000.0, 4000000.0, 0.0], &[10.0, 10.0, 0.0])
            .unwrap();
        assert_eq!(c, [500000.0, 10.0, 0.0, 4000000.0, 0.0, -10.0]);

        // tiepoint anchored at pixel (2, 3)
        let c = from_tiepoint_and_scale(&[2.0, 3.0, 0.0, 20.0, 70.0, 0.0], &[1.0, 1.0, 0.0]).unwrap();
        let gt = GeoTransform::new(c).unwrap();
        let p = gt.apply(2.0, 3.0);
        assert_relative_eq!(p.x, 20.0);
        assert_relative_eq!(p.y, 70.0);
    }

    #[test]
    fn model_transformation_keeps_rotation_terms() {
        let m = [
            0.5, 0.1, 0.0, 100.0, //
            0.2, -0.5, 0.0, 50.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        assert_eq!(from_model_transformation(&m).unwrap(), [100.0, 0.5, 0.1, 50.0, 0.2, -0.5]);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let err = GeoTiffRaster::open("/definitely/not/here.tif").unwrap_err();
        assert!(matches!(err, RasterError::Open { .. }));
    }
}
