#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use georeg::{
    GeoTransform, RasterError, RasterSource, TranslateError, TranslateRequest, Translator,
};
use georeg::core::GeotransformError;
use image::{GrayImage, Luma};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Deterministic texture of overlapping rectangles on a mid-grey background.
pub fn textured_image(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut state = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    let mut next = move |bound: u32| -> u32 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) % bound as u64) as u32
    };

    let mut img = GrayImage::from_pixel(width, height, Luma([128]));
    for _ in 0..(width * height) / 900 + 20 {
        let (w, h) = (6 + next(26), 6 + next(26));
        let (x0, y0) = (next(width), next(height));
        let v = next(256) as u8;
        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                img.put_pixel(x, y, Luma([v]));
            }
        }
    }
    img
}

pub fn crop(img: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    image::imageops::crop_imm(img, x, y, width, height).to_image()
}

/// In-memory raster that counts how often its pixels are decoded.
pub struct MemoryRaster {
    path: PathBuf,
    image: GrayImage,
    geotransform: Result<GeoTransform, GeotransformError>,
    decodes: AtomicUsize,
}

impl MemoryRaster {
    pub fn new(path: &str, image: GrayImage) -> Self {
        Self {
            path: PathBuf::from(path),
            image,
            geotransform: Err(GeotransformError::Missing),
            decodes: AtomicUsize::new(0),
        }
    }

    pub fn with_geotransform(mut self, gt: Result<GeoTransform, GeotransformError>) -> Self {
        self.geotransform = gt;
        self
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl RasterSource for MemoryRaster {
    fn path(&self) -> &Path {
        &self.path
    }

    fn decode_gray(&self) -> Result<GrayImage, RasterError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        Ok(self.image.clone())
    }

    fn geotransform(&self) -> Result<GeoTransform, RasterError> {
        self.geotransform
            .clone()
            .map_err(|source| RasterError::Geotransform {
                path: self.path.clone(),
                source,
            })
    }
}

/// Translator that records requests instead of running anything.
#[derive(Default)]
pub struct RecordingTranslator {
    pub requests: Mutex<Vec<TranslateRequest>>,
    pub fail: bool,
}

impl RecordingTranslator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Translator for RecordingTranslator {
    fn translate(&self, request: &TranslateRequest) -> Result<(), TranslateError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(TranslateError::Timeout {
                program: PathBuf::from("recording"),
                timeout: std::time::Duration::from_secs(1),
            });
        }
        Ok(())
    }
}

/// Write an 8-bit GeoTIFF with tiepoint + pixel-scale tags for a north-up transform.
pub fn write_geotiff(path: &Path, img: &GrayImage, geotransform: Option<[f64; 6]>) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
    let mut image = encoder
        .new_image::<colortype::Gray8>(img.width(), img.height())
        .unwrap();
    if let Some(c) = geotransform {
        let scale = [c[1], -c[5], 0.0];
        let tiepoint = [0.0, 0.0, 0.0, c[0], c[3], 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, scale.as_slice())
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())
            .unwrap();
    }
    image.write_data(img.as_raw()).unwrap();
}
