use nalgebra::Point2;
use serde::Serialize;

/// Pixel coordinate `(column, row)` in a raster's grid.
pub type PixelPoint = Point2<f64>;

/// Geographic `(longitude, latitude)` derived from a reference pixel.
///
/// Only [`crate::GeoTransform`] creates these, so every value is traceable to a
/// source pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GeoPoint {
    lon: f64,
    lat: f64,
}

impl GeoPoint {
    #[inline]
    pub(crate) fn from_transform(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    #[inline]
    pub fn lon(&self) -> f64 {
        self.lon
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[inline]
    pub fn to_point(&self) -> Point2<f64> {
        Point2::new(self.lon, self.lat)
    }
}

/// Ground control point: a target pixel tied to a reference geocoordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Gcp {
    pub target: PixelPoint,
    pub reference: GeoPoint,
}

impl Gcp {
    pub fn new(target: PixelPoint, reference: GeoPoint) -> Self {
        Self { target, reference }
    }

    /// `(target_x, target_y, reference_lon, reference_lat)`.
    #[inline]
    pub fn to_tuple(&self) -> [f64; 4] {
        [
            self.target.x,
            self.target.y,
            self.reference.lon,
            self.reference.lat,
        ]
    }
}
