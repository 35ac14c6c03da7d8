//! Keypoints, feature sets and the detector capability trait.

use image::GrayImage;
use nalgebra::Point2;

use crate::{Descriptor, FeatureError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A detected keypoint in full-resolution pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub position: Point2<f32>,
    /// Detector-specific strength, only used for ranking.
    pub response: f32,
    /// Dominant orientation in radians.
    pub angle: f32,
    /// Pyramid level / octave the keypoint was found in.
    pub octave: u8,
}

impl Keypoint {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            response: 0.0,
            angle: 0.0,
            octave: 0,
        }
    }
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Clone, Debug)]
pub struct Features<D> {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<D>,
}

impl<D> Default for Features<D> {
    fn default() -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Vec::new(),
        }
    }
}

impl<D> Features<D> {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            keypoints: Vec::with_capacity(n),
            descriptors: Vec::with_capacity(n),
        }
    }

    /// Build from parallel vectors, which must have equal length.
    pub fn from_parts(keypoints: Vec<Keypoint>, descriptors: Vec<D>) -> Result<Self, FeatureError> {
        if keypoints.len() != descriptors.len() {
            return Err(FeatureError::InvalidArgument(format!(
                "{} keypoints but {} descriptors",
                keypoints.len(),
                descriptors.len()
            )));
        }
        Ok(Self {
            keypoints,
            descriptors,
        })
    }

    #[inline]
    pub fn push(&mut self, keypoint: Keypoint, descriptor: D) {
        self.keypoints.push(keypoint);
        self.descriptors.push(descriptor);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    #[inline]
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    #[inline]
    pub fn descriptors(&self) -> &[D] {
        &self.descriptors
    }

    /// Keep the `n` strongest keypoints (by response, stable on ties).
    pub fn retain_strongest(&mut self, n: usize) {
        if self.len() <= n {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            self.keypoints[b]
                .response
                .total_cmp(&self.keypoints[a].response)
        });
        order.truncate(n);
        order.sort_unstable();

        let mut keep = vec![false; self.len()];
        for i in order {
            keep[i] = true;
        }
        let mut it = keep.iter();
        self.keypoints.retain(|_| *it.next().unwrap_or(&false));
        let mut it = keep.iter();
        self.descriptors.retain(|_| *it.next().unwrap_or(&false));
    }
}

/// A keypoint detector + descriptor extractor.
///
/// Implementations fix their descriptor family, and with it the distance
/// metric used when matching.
pub trait FeatureDetector: Sync {
    type Descriptor: Descriptor;

    /// Short human-readable name, used in logs and errors.
    fn name(&self) -> &'static str;

    fn detect_and_compute(&self, image: &GrayImage) -> Features<Self::Descriptor>;
}

/// Run a detector and fail when it finds nothing to match.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(detector, image), fields(detector = detector.name(), width = image.width(), height = image.height()))
)]
pub fn extract<F: FeatureDetector + ?Sized>(
    detector: &F,
    image: &GrayImage,
) -> Result<Features<F::Descriptor>, FeatureError> {
    let features = detector.detect_and_compute(image);
    if features.is_empty() {
        return Err(FeatureError::NoFeaturesFound {
            detector: detector.name(),
            width: image.width(),
            height: image.height(),
        });
    }
    log::debug!(
        "{}: {} keypoints in {}x{} image",
        detector.name(),
        features.len(),
        image.width(),
        image.height()
    );
    Ok(features)
}
