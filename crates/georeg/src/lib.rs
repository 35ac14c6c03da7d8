//! Feature-based co-registration of rasters.
//!
//! Given a *target* raster and a georeferenced *reference* raster, `georeg`
//! matches ORB or SIFT features between them, geocodes the reference side of
//! the best matches, optionally restricts them to an area of interest, and
//! hands the resulting ground control points to `gdal_translate`, which
//! writes a georeferenced Cloud Optimized GeoTIFF.
//!
//! ## Quickstart
//!
//! ```no_run
//! use georeg::{coregister, GeoTiffRaster, RegistrationConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let target = GeoTiffRaster::open("scene.tif")?;
//! let reference = GeoTiffRaster::open("basemap.tif")?;
//! let config = RegistrationConfig::default();
//!
//! let run = coregister(&target, &reference, &config, &config.translator())?;
//! println!("{} GCPs, registered: {}", run.outcome.gcps().len(), run.outcome.is_registered());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `georeg::core`: geotransforms, geo points and GCPs.
//! - `georeg::features`: detectors, descriptors, cross-check matching.
//! - [`raster`]: raster decoding and georeferencing metadata.
//! - [`aoi`] and [`filter`]: area-of-interest polygons and the spatial filter.
//! - [`gcp`]: GCP assembly, sufficiency and GeoJSON output.
//! - [`warp`]: the `gdal_translate` hand-off.
//! - [`driver`]: the end-to-end run.

pub use georeg_core as core;
pub use georeg_features as features;

pub mod aoi;
pub mod config;
pub mod driver;
mod error;
pub mod filter;
pub mod gcp;
pub mod raster;
pub mod report;
pub mod warp;

pub use aoi::{load_polygons, AoiError, AreaOfInterest, Polygon};
pub use config::{ConfigError, RegistrationConfig, DEFAULT_KEYPOINT_LIMIT};
pub use driver::{coregister, coregister_with_report, Registrar, Registration, RegistrationOutcome};
pub use error::{GeoregError, RegistrationError, RegistrationStage};
pub use filter::filter_correspondences;
pub use gcp::{is_sufficient, write_points, GcpSet, GcpWriteError, MIN_GCPS};
pub use raster::{GeoTiffRaster, RasterError, RasterSource};
pub use report::{OutcomeKind, RegistrationReport, StageTimings};
pub use warp::{
    registered_output_path, GdalTranslate, OutputPolicy, TranslateError, TranslateRequest,
    Translator,
};

pub use georeg_core::{Gcp, GeoPoint, GeoTransform, PixelPoint};
pub use georeg_features::FeatureAlgorithm;
