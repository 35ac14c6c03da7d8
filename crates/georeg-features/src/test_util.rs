use image::{GrayImage, Luma};

/// Deterministic texture of overlapping rectangles on a mid-grey background.
pub(crate) fn textured_image(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move |bound: u32| -> u32 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) % bound as u64) as u32
    };

    let mut img = GrayImage::from_pixel(width, height, Luma([128]));
    let count = (width * height) / 900 + 20;
    for _ in 0..count {
        let w = 6 + next(26);
        let h = 6 + next(26);
        let x0 = next(width);
        let y0 = next(height);
        let v = next(256) as u8;
        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                img.put_pixel(x, y, Luma([v]));
            }
        }
    }
    img
}

pub(crate) fn crop(img: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    image::imageops::crop_imm(img, x, y, width, height).to_image()
}
