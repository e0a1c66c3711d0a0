//! Contrast-limited adaptive histogram equalization on 8-bit images.
//!
//! The image is split into a grid of equally sized tiles. Every tile gets
//! its own clipped histogram and lookup table, and each output pixel is a
//! bilinear blend of the lookup tables of the four tiles around it, so tile
//! boundaries do not show up as blocks.

use image::{GrayImage, Luma};

use crate::subtraction::preprocessing::reflect_101;

const HIST_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    /// Clip height as a multiple of the uniform bin height. `<= 0` disables clipping.
    pub clip_limit: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

impl Clahe {
    pub fn new(clip_limit: f32, tiles_x: u32, tiles_y: u32) -> Self {
        Self {
            clip_limit,
            tiles_x: tiles_x.max(1),
            tiles_y: tiles_y.max(1),
        }
    }

    pub fn apply(&self, img: &GrayImage) -> GrayImage {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return img.clone();
        }

        let padded = self.pad_to_grid(img);
        let tile_w = padded.width() / self.tiles_x;
        let tile_h = padded.height() / self.tiles_y;
        let luts = self.build_luts(&padded, tile_w, tile_h);

        self.interpolate(img, &luts, tile_w, tile_h)
    }

    /// Extend the image at the bottom and right by reflection so both sides
    /// divide evenly by the grid. Nothing is added when both already do;
    /// otherwise each axis grows past its next multiple, so an axis that
    /// already divides evenly gains a full tile.
    fn pad_to_grid(&self, img: &GrayImage) -> GrayImage {
        let (width, height) = img.dimensions();
        if width % self.tiles_x == 0 && height % self.tiles_y == 0 {
            return img.clone();
        }

        let ext_w = width + self.tiles_x - width % self.tiles_x;
        let ext_h = height + self.tiles_y - height % self.tiles_y;
        GrayImage::from_fn(ext_w, ext_h, |x, y| {
            let sx = reflect_101(x as isize, width as usize) as u32;
            let sy = reflect_101(y as isize, height as usize) as u32;
            *img.get_pixel(sx, sy)
        })
    }

    fn clip_threshold(&self, tile_area: u32) -> Option<u32> {
        if self.clip_limit <= 0.0 {
            return None;
        }
        let limit = (self.clip_limit * tile_area as f32 / HIST_SIZE as f32) as u32;
        Some(limit.max(1))
    }

    fn build_luts(&self, padded: &GrayImage, tile_w: u32, tile_h: u32) -> Vec<[u8; HIST_SIZE]> {
        let tile_area = tile_w * tile_h;
        let lut_scale = 255.0 / tile_area as f32;
        let clip = self.clip_threshold(tile_area);

        let mut luts = Vec::with_capacity((self.tiles_x * self.tiles_y) as usize);
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let mut hist = [0u32; HIST_SIZE];
                for y in ty * tile_h..(ty + 1) * tile_h {
                    for x in tx * tile_w..(tx + 1) * tile_w {
                        hist[padded.get_pixel(x, y)[0] as usize] += 1;
                    }
                }

                if let Some(limit) = clip {
                    clip_histogram(&mut hist, limit);
                }

                let mut lut = [0u8; HIST_SIZE];
                let mut cumulative = 0u32;
                for (bin, count) in hist.iter().enumerate() {
                    cumulative += count;
                    lut[bin] = (cumulative as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
                }
                luts.push(lut);
            }
        }
        luts
    }

    fn interpolate(
        &self,
        img: &GrayImage,
        luts: &[[u8; HIST_SIZE]],
        tile_w: u32,
        tile_h: u32,
    ) -> GrayImage {
        let xs = tile_weights(img.width(), tile_w, self.tiles_x);
        let ys = tile_weights(img.height(), tile_h, self.tiles_y);
        let tiles_x = self.tiles_x as usize;

        let mut out = GrayImage::new(img.width(), img.height());
        for (y, &(ty1, ty2, ya)) in ys.iter().enumerate() {
            let top = &luts[ty1 * tiles_x..(ty1 + 1) * tiles_x];
            let bottom = &luts[ty2 * tiles_x..(ty2 + 1) * tiles_x];
            for (x, &(tx1, tx2, xa)) in xs.iter().enumerate() {
                let v = img.get_pixel(x as u32, y as u32)[0] as usize;
                let upper = top[tx1][v] as f32 * (1.0 - xa) + top[tx2][v] as f32 * xa;
                let lower = bottom[tx1][v] as f32 * (1.0 - xa) + bottom[tx2][v] as f32 * xa;
                let res = upper * (1.0 - ya) + lower * ya;
                out.put_pixel(x as u32, y as u32, Luma([res.round().clamp(0.0, 255.0) as u8]));
            }
        }
        out
    }
}

/// Cut every bin at `limit` and hand the excess back out: an equal share to
/// every bin, then the remainder one count at a time at a regular stride.
fn clip_histogram(hist: &mut [u32; HIST_SIZE], limit: u32) {
    let mut clipped = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            clipped += *count - limit;
            *count = limit;
        }
    }

    let batch = clipped / HIST_SIZE as u32;
    let mut residual = clipped as usize - batch as usize * HIST_SIZE;
    for count in hist.iter_mut() {
        *count += batch;
    }

    if residual > 0 {
        let step = (HIST_SIZE / residual).max(1);
        let mut bin = 0;
        while bin < HIST_SIZE && residual > 0 {
            hist[bin] += 1;
            bin += step;
            residual -= 1;
        }
    }
}

/// Per pixel along one axis: the two tiles whose centers bracket it and the
/// weight of the second tile.
fn tile_weights(len: u32, tile_len: u32, tiles: u32) -> Vec<(usize, usize, f32)> {
    let inv = 1.0 / tile_len as f32;
    let last = tiles as i64 - 1;
    (0..len)
        .map(|p| {
            let pos = p as f32 * inv - 0.5;
            let t1 = pos.floor() as i64;
            let t2 = t1 + 1;
            let weight = pos - t1 as f32;
            (t1.max(0) as usize, t2.min(last) as usize, weight)
        })
        .collect()
}
