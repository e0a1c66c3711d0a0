use image::{GrayImage, Luma};
use imageproc::map::map_colors2;

use crate::error::{PipelineError, Result};

/// Per-pixel `|contrast - mask|`. Both images must have the same size.
pub fn absolute_difference(contrast: &GrayImage, mask: &GrayImage) -> Result<GrayImage> {
    if contrast.dimensions() != mask.dimensions() {
        return Err(PipelineError::Alignment {
            width: contrast.width(),
            height: contrast.height(),
        });
    }
    Ok(map_colors2(contrast, mask, |c: Luma<u8>, m: Luma<u8>| {
        Luma([c[0].abs_diff(m[0])])
    }))
}

/// Linearly stretch the whole image so its minimum becomes 0 and its maximum 255.
///
/// A constant image has no range to stretch and maps to all zeros.
pub fn normalize_min_max(img: &GrayImage) -> GrayImage {
    let (min, max) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if img.width() == 0 || img.height() == 0 || min >= max {
        return GrayImage::new(img.width(), img.height());
    }

    let scale = 255.0 / (max - min) as f32;
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate().skip(min as usize).take((max - min) as usize + 1) {
        *slot = ((v as f32 - min as f32) * scale).round().clamp(0.0, 255.0) as u8;
    }

    let mut out = img.clone();
    for p in out.pixels_mut() {
        p[0] = lut[p[0] as usize];
    }
    out
}
