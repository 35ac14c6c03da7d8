//! Affine pixel ↔ geographic transforms in the GDAL coefficient order.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::GeoPoint;

/// Errors produced while building or parsing a [`GeoTransform`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeotransformError {
    #[error("expected 6 geotransform coefficients, got {got}")]
    WrongCount { got: usize },
    #[error("geotransform coefficient #{index} is not a number: {token:?}")]
    NotNumeric { index: usize, token: String },
    #[error("geotransform coefficient #{index} is not finite")]
    NonFinite { index: usize },
    #[error(
        "degenerate geotransform (pixel width {pixel_width}, pixel height {pixel_height})"
    )]
    Degenerate { pixel_width: f64, pixel_height: f64 },
    #[error("raster carries no geotransform")]
    Missing,
}

/// Six affine coefficients `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
///
/// Maps a pixel `(column, row)` to a geographic `(x, y)`:
///
/// ```text
/// x = origin_x + px * pixel_width  + py * row_rotation
/// y = origin_y + px * col_rotation + py * pixel_height
/// ```
///
/// A value of this type is always finite and non-degenerate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 6]", into = "[f64; 6]")]
pub struct GeoTransform {
    coeffs: [f64; 6],
}

impl GeoTransform {
    /// Validate and wrap six coefficients.
    pub fn new(coeffs: [f64; 6]) -> Result<Self, GeotransformError> {
        if let Some(index) = coeffs.iter().position(|c| !c.is_finite()) {
            return Err(GeotransformError::NonFinite { index });
        }
        let (pixel_width, pixel_height) = (coeffs[1], coeffs[5]);
        if pixel_width == 0.0 || pixel_height == 0.0 {
            return Err(GeotransformError::Degenerate {
                pixel_width,
                pixel_height,
            });
        }
        Ok(Self { coeffs })
    }

    /// Build from a slice that must hold exactly six coefficients.
    pub fn from_slice(coeffs: &[f64]) -> Result<Self, GeotransformError> {
        let arr: [f64; 6] = coeffs
            .try_into()
            .map_err(|_| GeotransformError::WrongCount { got: coeffs.len() })?;
        Self::new(arr)
    }

    /// Parse a textual coefficient list such as `"(500000, 1, 0, 4000000, 0, -1)"`.
    ///
    /// Only plain numeric literals are accepted. The list may be wrapped in one
    /// pair of `()` or `[]` and separated either by commas or by whitespace.
    pub fn parse(text: &str) -> Result<Self, GeotransformError> {
        let values = parse_coefficient_list(text)?;
        Self::from_slice(&values)
    }

    /// North-up transform with square pixels, handy for tests and synthetic rasters.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_size: f64) -> Result<Self, GeotransformError> {
        Self::new([origin_x, pixel_size, 0.0, origin_y, 0.0, -pixel_size])
    }

    #[inline]
    pub fn coefficients(&self) -> [f64; 6] {
        self.coeffs
    }

    #[inline]
    pub fn origin(&self) -> Point2<f64> {
        Point2::new(self.coeffs[0], self.coeffs[3])
    }

    #[inline]
    pub fn pixel_width(&self) -> f64 {
        self.coeffs[1]
    }

    #[inline]
    pub fn pixel_height(&self) -> f64 {
        self.coeffs[5]
    }

    /// Apply the forward map to a pixel coordinate.
    #[inline]
    pub fn apply(&self, px: f64, py: f64) -> Point2<f64> {
        let [ox, pw, rr, oy, cr, ph] = self.coeffs;
        Point2::new(ox + px * pw + py * rr, oy + px * cr + py * ph)
    }

    /// Geocode a pixel coordinate.
    #[inline]
    pub fn pixel_to_geo(&self, px: f64, py: f64) -> GeoPoint {
        let p = self.apply(px, py);
        GeoPoint::from_transform(p.x, p.y)
    }

    /// Homogeneous 3×3 form of the transform.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let [ox, pw, rr, oy, cr, ph] = self.coeffs;
        Matrix3::new(
            pw, rr, ox, //
            cr, ph, oy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Inverse map (geographic → pixel), or `None` when the linear part is singular.
    pub fn invert(&self) -> Option<InverseGeoTransform> {
        self.to_matrix()
            .try_inverse()
            .map(|m| InverseGeoTransform { m })
    }
}

impl TryFrom<[f64; 6]> for GeoTransform {
    type Error = GeotransformError;

    fn try_from(coeffs: [f64; 6]) -> Result<Self, Self::Error> {
        Self::new(coeffs)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(gt: GeoTransform) -> Self {
        gt.coeffs
    }
}

impl FromStr for GeoTransform {
    type Err = GeotransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GeoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.coeffs;
        write!(
            f,
            "({}, {}, {}, {}, {}, {})",
            c[0], c[1], c[2], c[3], c[4], c[5]
        )
    }
}

/// Geographic → pixel map obtained from [`GeoTransform::invert`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InverseGeoTransform {
    m: Matrix3<f64>,
}

impl InverseGeoTransform {
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> Point2<f64> {
        let v = self.m * Vector3::new(x, y, 1.0);
        Point2::new(v[0], v[1])
    }
}

/// Anything that can be turned into a validated [`GeoTransform`]: the structured
/// form, a coefficient array/slice, or its textual encoding.
pub trait AsGeoTransform {
    fn to_geotransform(&self) -> Result<GeoTransform, GeotransformError>;
}

impl AsGeoTransform for GeoTransform {
    fn to_geotransform(&self) -> Result<GeoTransform, GeotransformError> {
        Ok(*self)
    }
}

impl AsGeoTransform for [f64; 6] {
    fn to_geotransform(&self) -> Result<GeoTransform, GeotransformError> {
        GeoTransform::new(*self)
    }
}

impl AsGeoTransform for [f64] {
    fn to_geotransform(&self) -> Result<GeoTransform, GeotransformError> {
        GeoTransform::from_slice(self)
    }
}

impl AsGeoTransform for Vec<f64> {
    fn to_geotransform(&self) -> Result<GeoTransform, GeotransformError> {
        GeoTransform::from_slice(self)
    }
}

impl AsGeoTransform for str {
    fn to_geotransform(&self) -> Result<GeoTransform, GeotransformError> {
        GeoTransform::parse(self)
    }
}

impl AsGeoTransform for String {
    fn to_geotransform(&self) -> Result<GeoTransform, GeotransformError> {
        GeoTransform::parse(self)
    }
}

/// Convert a column/row pixel coordinate to longitude/latitude.
pub fn pixel_to_geo<G: AsGeoTransform + ?Sized>(
    geotransform: &G,
    px: f64,
    py: f64,
) -> Result<GeoPoint, GeotransformError> {
    Ok(geotransform.to_geotransform()?.pixel_to_geo(px, py))
}

fn parse_coefficient_list(text: &str) -> Result<Vec<f64>, GeotransformError> {
    let trimmed = text.trim();
    let inner = strip_brackets(trimmed).trim();
    if inner.is_empty() {
        return Err(GeotransformError::WrongCount { got: 0 });
    }

    let tokens: Vec<&str> = if inner.contains(',') {
        inner.split(',').map(str::trim).collect()
    } else {
        inner.split_whitespace().collect()
    };

    tokens
        .iter()
        .enumerate()
        .map(|(index, token)| parse_literal(index, token))
        .collect()
}

fn strip_brackets(s: &str) -> &str {
    for (open, close) in [('(', ')'), ('[', ']')] {
        if let Some(rest) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return rest;
        }
    }
    s
}

fn parse_literal(index: usize, token: &str) -> Result<f64, GeotransformError> {
    let not_numeric = || GeotransformError::NotNumeric {
        index,
        token: token.to_string(),
    };
    // f64::from_str also accepts "inf"/"nan" spellings; only digits, signs,
    // a decimal point and an exponent marker are allowed here.
    let is_literal = !token.is_empty()
        && token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !is_literal {
        return Err(not_numeric());
    }
    let value: f64 = token.parse().map_err(|_| not_numeric())?;
    if !value.is_finite() {
        return Err(GeotransformError::NonFinite { index });
    }
    Ok(value)
}
