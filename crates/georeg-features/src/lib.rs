//! Feature extraction and matching for raster co-registration.
//!
//! Two descriptor families are provided:
//! - [`OrbDetector`]: FAST corners with steered binary BRIEF descriptors,
//!   matched by Hamming distance;
//! - [`SiftDetector`]: difference-of-Gaussian blobs with 128-float gradient
//!   histograms, matched by Euclidean distance.
//!
//! The family of a detector fixes its [`Descriptor`] type, so
//! [`match_descriptors`] can never compare descriptors under the wrong metric.
//! Matches are cross-checked (mutual nearest neighbours) and sorted by
//! ascending distance; [`select_correspondences`] then takes the top `N` and
//! maps them back to pixel coordinates.

mod algorithm;
mod descriptor;
mod detector;
mod error;
mod matcher;
mod orb;
mod select;
mod sift;

#[cfg(test)]
mod test_util;

pub use algorithm::{DetectorParams, FeatureAlgorithm};
pub use descriptor::{
    BinaryDescriptor, Descriptor, FloatDescriptor, Metric, BINARY_DESCRIPTOR_BITS,
    FLOAT_DESCRIPTOR_LEN,
};
pub use detector::{extract, FeatureDetector, Features, Keypoint};
pub use error::{FeatureError, Side};
pub use matcher::{match_descriptors, Match};
pub use orb::{OrbDetector, OrbParams};
pub use select::{keypoint_limit, select_correspondences, Correspondences};
pub use sift::{SiftDetector, SiftParams};
