use image::{GrayImage, Luma};

use crate::error::{PipelineError, Result};

/// Mirror an out-of-range index back into `0..len` without repeating the edge pixel
/// (`gfedcb|abcdefgh|gfedcba`).
pub(crate) fn reflect_101(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Resample `img` to `width` x `height` with bilinear interpolation.
///
/// Pixel centers sit at half-integer coordinates and samples outside the
/// source are clamped to the border. When the size already matches the
/// input is returned unchanged.
pub fn align_to(img: &GrayImage, width: u32, height: u32) -> Result<GrayImage> {
    if width == 0 || height == 0 {
        return Err(PipelineError::Alignment { width, height });
    }
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(PipelineError::Alignment {
            width: src_w,
            height: src_h,
        });
    }
    if (src_w, src_h) == (width, height) {
        return Ok(img.clone());
    }

    let xs = sample_positions(src_w, width);
    let ys = sample_positions(src_h, height);
    let src = img.as_raw();
    let stride = src_w as usize;

    let mut out = GrayImage::new(width, height);
    for (y, &(y0, y1, fy)) in ys.iter().enumerate() {
        let row0 = &src[y0 * stride..(y0 + 1) * stride];
        let row1 = &src[y1 * stride..(y1 + 1) * stride];
        for (x, &(x0, x1, fx)) in xs.iter().enumerate() {
            let top = lerp(row0[x0] as f32, row0[x1] as f32, fx);
            let bottom = lerp(row1[x0] as f32, row1[x1] as f32, fx);
            let value = lerp(top, bottom, fy).round().clamp(0.0, 255.0) as u8;
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    Ok(out)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// For every destination index along one axis: the two source taps and the
/// weight of the second one.
fn sample_positions(src_len: u32, dst_len: u32) -> Vec<(usize, usize, f32)> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len as usize - 1;
    (0..dst_len)
        .map(|d| {
            let pos = (d as f64 + 0.5) * scale - 0.5;
            let base = pos.floor();
            let frac = (pos - base) as f32;
            if base < 0.0 {
                (0, 0, 0.0)
            } else if base as usize >= last {
                (last, last, 0.0)
            } else {
                let i = base as usize;
                (i, i + 1, frac)
            }
        })
        .collect()
}

/// Sigma derived from the kernel size when none is given.
pub fn auto_sigma(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian kernel of odd length `size`.
///
/// With `sigma <= 0` and sizes up to 7 this yields the binomial kernels
/// (`1 4 6 4 1 / 16` for size 5); otherwise the sampled Gaussian with the
/// given or derived sigma.
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        match size {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
                ];
            }
            _ => {}
        }
    }

    let sigma = if sigma > 0.0 { sigma } else { auto_sigma(size) } as f64;
    let radius = (size / 2) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Separable Gaussian blur with reflected borders.
pub fn gaussian_blur(img: &GrayImage, kernel_size: u32, sigma: f32) -> GrayImage {
    let kernel = gaussian_kernel(kernel_size, sigma);
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (kernel.len() / 2) as isize;
    let src = img.as_raw();

    // Horizontal pass kept in f32 so rounding happens once.
    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - radius, w);
                acc += weight * row[sx] as f32;
            }
            horizontal[y * w + x] = acc;
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - radius, h);
                acc += weight * horizontal[sy * w + x];
            }
            out.put_pixel(x as u32, y as u32, Luma([acc.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}
