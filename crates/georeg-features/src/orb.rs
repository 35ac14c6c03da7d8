//! ORB-style features: FAST-9 corners on an image pyramid, intensity-centroid
//! orientation and a steered 256-bit BRIEF descriptor.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;

use image::imageops::{resize, FilterType};
use image::GrayImage;
use imageproc::corners::{corners_fast9, Corner};
use imageproc::filter::gaussian_blur_f32;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{BinaryDescriptor, FeatureDetector, Features, Keypoint, BINARY_DESCRIPTOR_BITS};

/// Radius of the circular patch used for orientation.
const PATCH_RADIUS: i32 = 15;
/// Bound on BRIEF test coordinates (before rotation).
const PATTERN_BOUND: f32 = 13.0;

/// ORB detector parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbParams {
    /// Maximum number of keypoints kept over all pyramid levels.
    pub max_features: usize,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Number of pyramid levels (1 disables the pyramid).
    pub pyramid_levels: u8,
    /// Downscale factor between consecutive levels.
    pub scale_factor: f32,
    /// Border in pixels (per level) where no keypoints are detected.
    pub edge_threshold: u32,
    /// Non-maximum suppression cell size in pixels.
    pub nms_radius: f32,
    /// Gaussian smoothing applied before BRIEF sampling.
    pub blur_sigma: f32,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            max_features: 500,
            fast_threshold: 20,
            pyramid_levels: 8,
            scale_factor: 1.2,
            edge_threshold: 31,
            nms_radius: 3.0,
            blur_sigma: 2.0,
        }
    }
}

/// ORB keypoint detector and binary descriptor extractor.
#[derive(Clone, Debug, Default)]
pub struct OrbDetector {
    params: OrbParams,
}

impl OrbDetector {
    pub fn new(params: OrbParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &OrbParams {
        &self.params
    }

    fn process_level(
        &self,
        img: &GrayImage,
        level: u8,
        to_full: (f32, f32),
        out: &mut Features<BinaryDescriptor>,
    ) {
        let p = &self.params;
        let (w, h) = img.dimensions();
        let edge = p.edge_threshold;
        if w <= 2 * edge || h <= 2 * edge {
            return;
        }

        let mut corners = corners_fast9(img, p.fast_threshold);
        corners.retain(|c| c.x >= edge && c.y >= edge && c.x < w - edge && c.y < h - edge);
        if corners.is_empty() {
            return;
        }
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));
        let mut kept = suppress_non_maxima(corners, p.nms_radius);
        if p.max_features > 0 {
            kept.truncate(p.max_features);
        }

        let smoothed = if p.blur_sigma > 0.0 {
            Cow::Owned(gaussian_blur_f32(img, p.blur_sigma))
        } else {
            Cow::Borrowed(img)
        };

        for c in kept {
            let (x, y) = (c.x as i32, c.y as i32);
            let angle = intensity_centroid_angle(img, x, y);
            let descriptor = steered_brief(&smoothed, x, y, angle);
            let keypoint = Keypoint {
                position: Point2::new(c.x as f32 * to_full.0, c.y as f32 * to_full.1),
                response: c.score,
                angle,
                octave: level,
            };
            out.push(keypoint, descriptor);
        }
    }
}

impl FeatureDetector for OrbDetector {
    type Descriptor = BinaryDescriptor;

    fn name(&self) -> &'static str {
        "orb"
    }

    fn detect_and_compute(&self, image: &GrayImage) -> Features<BinaryDescriptor> {
        let p = &self.params;
        let mut out = Features::with_capacity(p.max_features);
        let factor = p.scale_factor.max(1.01);

        let mut current: Cow<'_, GrayImage> = Cow::Borrowed(image);
        for level in 0..p.pyramid_levels.max(1) {
            if level > 0 {
                let w = (current.width() as f32 / factor).round() as u32;
                let h = (current.height() as f32 / factor).round() as u32;
                if w <= 2 * p.edge_threshold || h <= 2 * p.edge_threshold {
                    break;
                }
                current = Cow::Owned(resize(&*current, w, h, FilterType::Triangle));
            }
            let to_full = (
                image.width() as f32 / current.width() as f32,
                image.height() as f32 / current.height() as f32,
            );
            self.process_level(&current, level, to_full, &mut out);
        }

        if p.max_features > 0 {
            out.retain_strongest(p.max_features);
        }
        out
    }
}

/// Grid-based suppression: accept corners strongest first, reject any corner
/// whose cell or a neighbouring cell is already taken.
fn suppress_non_maxima(sorted: Vec<Corner>, radius: f32) -> Vec<Corner> {
    let cell = radius.max(1.0);
    let mut taken: HashSet<(i32, i32)> = HashSet::new();
    let mut out = Vec::new();
    for c in sorted {
        let gx = (c.x as f32 / cell) as i32;
        let gy = (c.y as f32 / cell) as i32;
        let blocked =
            (-1..=1).any(|dy| (-1..=1).any(|dx| taken.contains(&(gx + dx, gy + dy))));
        if !blocked {
            taken.insert((gx, gy));
            out.push(c);
        }
    }
    out
}

#[inline]
fn pixel_clamped(img: &GrayImage, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, img.width() as i32 - 1) as usize;
    let y = y.clamp(0, img.height() as i32 - 1) as usize;
    img.as_raw()[y * img.width() as usize + x]
}

/// Orientation of the vector from the keypoint to the patch intensity centroid.
fn intensity_centroid_angle(img: &GrayImage, cx: i32, cy: i32) -> f32 {
    let r = PATCH_RADIUS;
    let mut m01 = 0.0_f64;
    let mut m10 = 0.0_f64;
    for dy in -r..=r {
        let span = (((r * r - dy * dy) as f32).sqrt()) as i32;
        for dx in -span..=span {
            let v = pixel_clamped(img, cx + dx, cy + dy) as f64;
            m10 += dx as f64 * v;
            m01 += dy as f64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

fn steered_brief(smoothed: &GrayImage, cx: i32, cy: i32, angle: f32) -> BinaryDescriptor {
    let (sin, cos) = angle.sin_cos();
    let rotate = |x: f32, y: f32| -> (i32, i32) {
        (
            (cos * x - sin * y).round() as i32,
            (sin * x + cos * y).round() as i32,
        )
    };

    let mut d = BinaryDescriptor([0u8; BINARY_DESCRIPTOR_BITS / 8]);
    for (bit, test) in brief_pattern().iter().enumerate() {
        let (x1, y1) = rotate(test[0], test[1]);
        let (x2, y2) = rotate(test[2], test[3]);
        if pixel_clamped(smoothed, cx + x1, cy + y1) < pixel_clamped(smoothed, cx + x2, cy + y2) {
            d.set_bit(bit);
        }
    }
    d
}

/// Fixed BRIEF sampling pattern: point pairs drawn from an isotropic,
/// approximately Gaussian distribution (σ ≈ patch/5) with a fixed seed, so
/// descriptors are comparable across runs and machines.
fn brief_pattern() -> &'static [[f32; 4]; BINARY_DESCRIPTOR_BITS] {
    static PATTERN: OnceLock<[[f32; 4]; BINARY_DESCRIPTOR_BITS]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut state = 0x9e37_79b9_7f4a_7c15_u64;
        let mut uniform = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
        };
        // sum of four uniforms has std ≈ 1.155; scale to σ ≈ 31 / 5
        let mut coord = move || {
            let s: f32 = (0..4).map(|_| uniform()).sum();
            (s * 5.37).round().clamp(-PATTERN_BOUND, PATTERN_BOUND)
        };

        let mut pattern = [[0.0_f32; 4]; BINARY_DESCRIPTOR_BITS];
        for test in pattern.iter_mut() {
            loop {
                let t = [coord(), coord(), coord(), coord()];
                if t[0] != t[2] || t[1] != t[3] {
                    *test = t;
                    break;
                }
            }
        }
        pattern
    })
}
