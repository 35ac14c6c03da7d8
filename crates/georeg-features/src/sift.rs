//! SIFT features: difference-of-Gaussian extrema with a 4x4x8 gradient
//! histogram descriptor.
//!
//! The scale space is built one octave at a time and dropped before the next
//! octave starts, so peak memory is a handful of float images of the current
//! octave size. Full-resolution rasters still need several times the 8-bit
//! image size in memory.

use std::f32::consts::{SQRT_2, TAU};

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{FeatureDetector, Features, FloatDescriptor, Keypoint, FLOAT_DESCRIPTOR_LEN};

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Pixels ignored at each octave border.
const BORDER: usize = 5;
/// Blur already present in the input image.
const INPUT_SIGMA: f32 = 0.5;

const ORI_BINS: usize = 36;
const ORI_PEAK_RATIO: f32 = 0.8;
const ORI_SIGMA_FACTOR: f32 = 1.5;

const DESC_WIDTH: usize = 4;
const DESC_BINS: usize = 8;
const DESC_SCALE_FACTOR: f32 = 3.0;
const DESC_MAG_THRESHOLD: f32 = 0.2;

/// SIFT detector parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftParams {
    /// Keep at most this many keypoints (strongest first). `0` keeps all.
    pub max_features: usize,
    /// Scales sampled per octave.
    pub octave_layers: usize,
    /// Minimum DoG contrast, divided by `octave_layers` before use.
    pub contrast_threshold: f32,
    /// Maximum principal curvature ratio; larger keeps more edge-like points.
    pub edge_threshold: f32,
    /// Blur of the first scale of each octave.
    pub sigma: f32,
    /// Upper bound on the number of octaves.
    pub max_octaves: usize,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            max_features: 0,
            octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
            max_octaves: 8,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SiftDetector {
    params: SiftParams,
}

impl SiftDetector {
    pub fn new(params: SiftParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &SiftParams {
        &self.params
    }

    fn octave_count(&self, width: u32, height: u32) -> usize {
        let min_dim = width.min(height).max(1) as f32;
        let n = min_dim.log2().floor() as i64 - 3;
        n.clamp(1, self.params.max_octaves.max(1) as i64) as usize
    }

    fn scan_octave(
        &self,
        octave: usize,
        gauss: &[FloatImage],
        dog: &[Vec<f32>],
        out: &mut Features<FloatDescriptor>,
    ) {
        let p = &self.params;
        let layers = p.octave_layers.max(1);
        let (w, h) = (gauss[0].width() as usize, gauss[0].height() as usize);
        if w <= 2 * BORDER || h <= 2 * BORDER {
            return;
        }
        let threshold = p.contrast_threshold / layers as f32;
        let k = 2f32.powf(1.0 / layers as f32);
        let to_full = (1u32 << octave) as f32;

        for layer in 1..=layers {
            let (prev, cur, next) = (&dog[layer - 1], &dog[layer], &dog[layer + 1]);
            let scale = p.sigma * k.powi(layer as i32);
            for y in BORDER..h - BORDER {
                for x in BORDER..w - BORDER {
                    let v = cur[y * w + x];
                    if v.abs() < threshold {
                        continue;
                    }
                    if !is_extremum([prev, cur, next], w, x, y, v) {
                        continue;
                    }
                    if is_edge_like(cur, w, x, y, p.edge_threshold) {
                        continue;
                    }
                    let g = &gauss[layer];
                    for angle in dominant_orientations(g, x, y, scale) {
                        let descriptor = describe(g, x, y, scale, angle);
                        let keypoint = Keypoint {
                            position: Point2::new(x as f32 * to_full, y as f32 * to_full),
                            response: v.abs(),
                            angle,
                            octave: octave as u8,
                        };
                        out.push(keypoint, descriptor);
                    }
                }
            }
        }
    }
}

impl FeatureDetector for SiftDetector {
    type Descriptor = FloatDescriptor;

    fn name(&self) -> &'static str {
        "sift"
    }

    fn detect_and_compute(&self, image: &GrayImage) -> Features<FloatDescriptor> {
        let p = &self.params;
        let mut out = Features::default();
        let (w, h) = image.dimensions();
        if (w.min(h) as usize) <= 2 * BORDER + 2 {
            return out;
        }

        let layers = p.octave_layers.max(1);
        let sigma = p.sigma.max(INPUT_SIGMA + 0.01);
        let k = 2f32.powf(1.0 / layers as f32);
        // blur to apply on top of scale i-1 to reach scale i
        let increments: Vec<f32> = (1..layers + 3)
            .map(|i| {
                let prev = sigma * k.powi(i as i32 - 1);
                let total = prev * k;
                (total * total - prev * prev).sqrt()
            })
            .collect();

        let input = FloatImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y)[0] as f32 / 255.0]));
        let base_blur = (sigma * sigma - INPUT_SIGMA * INPUT_SIGMA).sqrt();
        let mut octave_base = gaussian_blur_f32(&input, base_blur);
        drop(input);

        for octave in 0..self.octave_count(w, h) {
            if (octave_base.width().min(octave_base.height()) as usize) <= 2 * BORDER + 2 {
                break;
            }
            let mut gauss: Vec<FloatImage> = Vec::with_capacity(layers + 3);
            gauss.push(octave_base);
            for &s in &increments {
                let next = gaussian_blur_f32(&gauss[gauss.len() - 1], s);
                gauss.push(next);
            }
            let dog: Vec<Vec<f32>> = gauss
                .windows(2)
                .map(|pair| {
                    pair[1]
                        .as_raw()
                        .iter()
                        .zip(pair[0].as_raw())
                        .map(|(a, b)| a - b)
                        .collect()
                })
                .collect();

            let before = out.len();
            self.scan_octave(octave, &gauss, &dog, &mut out);
            log::trace!("sift octave {octave}: {} keypoints", out.len() - before);

            octave_base = half_size(&gauss[layers]);
        }

        if p.max_features > 0 {
            out.retain_strongest(p.max_features);
        }
        out
    }
}

fn half_size(src: &FloatImage) -> FloatImage {
    FloatImage::from_fn(src.width() / 2, src.height() / 2, |x, y| {
        *src.get_pixel(2 * x, 2 * y)
    })
}

fn is_extremum(dogs: [&Vec<f32>; 3], w: usize, x: usize, y: usize, v: f32) -> bool {
    let maximum = v > 0.0;
    for d in dogs {
        for yy in y - 1..=y + 1 {
            let row = &d[yy * w + x - 1..=yy * w + x + 1];
            for &n in row {
                if (maximum && n > v) || (!maximum && n < v) {
                    return false;
                }
            }
        }
    }
    true
}

/// Principal-curvature ratio test on the 2x2 Hessian of the DoG layer.
fn is_edge_like(d: &[f32], w: usize, x: usize, y: usize, r: f32) -> bool {
    let at = |xx: usize, yy: usize| d[yy * w + xx];
    let v = at(x, y);
    let dxx = at(x + 1, y) + at(x - 1, y) - 2.0 * v;
    let dyy = at(x, y + 1) + at(x, y - 1) - 2.0 * v;
    let dxy = (at(x + 1, y + 1) - at(x - 1, y + 1) - at(x + 1, y - 1) + at(x - 1, y - 1)) * 0.25;
    let tr = dxx + dyy;
    let det = dxx * dyy - dxy * dxy;
    det <= 0.0 || tr * tr * r >= (r + 1.0) * (r + 1.0) * det
}

#[inline]
fn gradient(g: &FloatImage, x: usize, y: usize) -> (f32, f32) {
    let w = g.width() as usize;
    let raw = g.as_raw();
    let gx = raw[y * w + x + 1] - raw[y * w + x - 1];
    let gy = raw[(y + 1) * w + x] - raw[(y - 1) * w + x];
    (gx, gy)
}

fn dominant_orientations(g: &FloatImage, x: usize, y: usize, scale: f32) -> Vec<f32> {
    let (w, h) = (g.width() as i64, g.height() as i64);
    let sigma_w = ORI_SIGMA_FACTOR * scale;
    let radius = (3.0 * sigma_w).round() as i64;
    let denom = 2.0 * sigma_w * sigma_w;

    let mut hist = [0.0_f32; ORI_BINS];
    for dy in -radius..=radius {
        let yy = y as i64 + dy;
        if yy < 1 || yy >= h - 1 {
            continue;
        }
        for dx in -radius..=radius {
            let xx = x as i64 + dx;
            if xx < 1 || xx >= w - 1 {
                continue;
            }
            let (gx, gy) = gradient(g, xx as usize, yy as usize);
            let mag = (gx * gx + gy * gy).sqrt();
            let ori = gy.atan2(gx).rem_euclid(TAU);
            let weight = (-((dx * dx + dy * dy) as f32) / denom).exp();
            let bin = (ori / TAU * ORI_BINS as f32).round() as usize % ORI_BINS;
            hist[bin] += weight * mag;
        }
    }

    let n = ORI_BINS;
    let smoothed: Vec<f32> = (0..n)
        .map(|i| {
            let at = |o: isize| hist[(i as isize + o).rem_euclid(n as isize) as usize];
            (at(-2) + at(2)) / 16.0 + (at(-1) + at(1)) * 4.0 / 16.0 + at(0) * 6.0 / 16.0
        })
        .collect();
    let max = smoothed.iter().copied().fold(0.0_f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }

    let mut angles = Vec::new();
    for i in 0..n {
        let l = smoothed[(i + n - 1) % n];
        let r = smoothed[(i + 1) % n];
        let c = smoothed[i];
        if c > l && c > r && c >= ORI_PEAK_RATIO * max {
            let offset = 0.5 * (l - r) / (l - 2.0 * c + r);
            let bin = i as f32 + offset;
            angles.push((bin * TAU / n as f32).rem_euclid(TAU));
        }
    }
    angles
}

fn describe(g: &FloatImage, x: usize, y: usize, scale: f32, angle: f32) -> FloatDescriptor {
    let d = DESC_WIDTH;
    let n = DESC_BINS;
    let (w, h) = (g.width() as i64, g.height() as i64);

    let hist_width = DESC_SCALE_FACTOR * scale;
    let max_radius = ((w * w + h * h) as f32).sqrt() as i64;
    let radius = ((hist_width * SQRT_2 * (d as f32 + 1.0) * 0.5).round() as i64).min(max_radius);
    let (sin_t, cos_t) = angle.sin_cos();
    let (sin_t, cos_t) = (sin_t / hist_width, cos_t / hist_width);
    let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
    let bins_per_rad = n as f32 / TAU;

    let mut hist = vec![0.0_f32; (d + 2) * (d + 2) * (n + 2)];
    for i in -radius..=radius {
        for j in -radius..=radius {
            let c_rot = j as f32 * cos_t - i as f32 * sin_t;
            let r_rot = j as f32 * sin_t + i as f32 * cos_t;
            let rbin = r_rot + d as f32 / 2.0 - 0.5;
            let cbin = c_rot + d as f32 / 2.0 - 0.5;
            let yy = y as i64 + i;
            let xx = x as i64 + j;
            if !(rbin > -1.0 && rbin < d as f32 && cbin > -1.0 && cbin < d as f32) {
                continue;
            }
            if yy <= 0 || yy >= h - 1 || xx <= 0 || xx >= w - 1 {
                continue;
            }

            let (gx, gy) = gradient(g, xx as usize, yy as usize);
            let mag = (gx * gx + gy * gy).sqrt()
                * ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
            let ori = (gy.atan2(gx) - angle).rem_euclid(TAU);
            let obin = ori * bins_per_rad;

            let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
            let (rf, cf, of) = (rbin - r0, cbin - c0, obin - o0);
            let mut o0 = o0 as i64;
            if o0 < 0 {
                o0 += n as i64;
            }
            if o0 >= n as i64 {
                o0 -= n as i64;
            }

            let v_r1 = mag * rf;
            let v_r0 = mag - v_r1;
            let v_rc11 = v_r1 * cf;
            let v_rc10 = v_r1 - v_rc11;
            let v_rc01 = v_r0 * cf;
            let v_rc00 = v_r0 - v_rc01;
            let v_rco111 = v_rc11 * of;
            let v_rco110 = v_rc11 - v_rco111;
            let v_rco101 = v_rc10 * of;
            let v_rco100 = v_rc10 - v_rco101;
            let v_rco011 = v_rc01 * of;
            let v_rco010 = v_rc01 - v_rco011;
            let v_rco001 = v_rc00 * of;
            let v_rco000 = v_rc00 - v_rco001;

            let row = (r0 as i64 + 1) as usize;
            let col = (c0 as i64 + 1) as usize;
            let idx = (row * (d + 2) + col) * (n + 2) + o0 as usize;
            let row_step = (d + 2) * (n + 2);
            hist[idx] += v_rco000;
            hist[idx + 1] += v_rco001;
            hist[idx + n + 2] += v_rco010;
            hist[idx + n + 3] += v_rco011;
            hist[idx + row_step] += v_rco100;
            hist[idx + row_step + 1] += v_rco101;
            hist[idx + row_step + n + 2] += v_rco110;
            hist[idx + row_step + n + 3] += v_rco111;
        }
    }

    let mut out = [0.0_f32; FLOAT_DESCRIPTOR_LEN];
    for i in 0..d {
        for j in 0..d {
            let idx = ((i + 1) * (d + 2) + (j + 1)) * (n + 2);
            // orientation bins wrap around
            hist[idx] += hist[idx + n];
            hist[idx + 1] += hist[idx + n + 1];
            for k in 0..n {
                out[(i * d + j) * n + k] = hist[idx + k];
            }
        }
    }

    normalize(&mut out);
    let cap = DESC_MAG_THRESHOLD;
    for v in out.iter_mut() {
        *v = v.min(cap);
    }
    normalize(&mut out);
    FloatDescriptor(out)
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
