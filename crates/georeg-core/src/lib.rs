//! Core types for raster co-registration.
//!
//! This crate is intentionally small and purely geometric. It knows how to
//! turn a pixel into a geographic coordinate and what a ground control point
//! looks like; it does not decode images or detect features.

mod gcp;
mod geotransform;
mod logger;

pub use gcp::{Gcp, GeoPoint, PixelPoint};
pub use geotransform::{
    pixel_to_geo, AsGeoTransform, GeoTransform, GeotransformError, InverseGeoTransform,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{filter_directive, init_with_level, level_from_verbosity};

/// Coordinate reference system every geocoded point in this workspace is expressed in.
pub const GEOGRAPHIC_CRS: &str = "EPSG:4326";
