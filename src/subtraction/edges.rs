use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    None,
    Weak,
    Strong,
}

/// Canny edge detection without pre-smoothing.
///
/// Gradients come from 3x3 Sobel operators, the magnitude is `|gx| + |gy|`.
/// Pixels survive non-maximum suppression across the gradient direction,
/// magnitudes above `high` seed edges and 8-connected pixels above `low`
/// are linked to them. The result holds only 0 and 255.
pub fn canny(img: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return GrayImage::new(width, height);
    }

    let gx = horizontal_sobel(img);
    let gy = vertical_sobel(img);

    let magnitude: Vec<f32> = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(dx, dy)| (dx[0] as f32).abs() + (dy[0] as f32).abs())
        .collect();
    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut marks = vec![Mark::None; w * h];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let dx = gx.get_pixel(x as u32, y as u32)[0] as f32;
            let dy = gy.get_pixel(x as u32, y as u32)[0] as f32;
            let (ax, ay) = (dx.abs(), dy.abs());
            let (xi, yi) = (x as isize, y as isize);

            let is_peak = if ay < ax * TAN_22_5 {
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else if ay > ax * TAN_67_5 {
                m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
            } else {
                let s = if (dx < 0.0) != (dy < 0.0) { -1 } else { 1 };
                m > mag_at(xi - s, yi - 1) && m > mag_at(xi + s, yi + 1)
            };

            if !is_peak {
                continue;
            }
            if m > high {
                marks[idx] = Mark::Strong;
                stack.push((x, y));
            } else {
                marks[idx] = Mark::Weak;
            }
        }
    }

    // Hysteresis: grow strong edges into connected weak candidates.
    while let Some((x, y)) = stack.pop() {
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if marks[n] == Mark::Weak {
                    marks[n] = Mark::Strong;
                    stack.push((nx, ny));
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        if marks[y as usize * w + x as usize] == Mark::Strong {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_image_has_no_edges() {
        let img = GrayImage::from_pixel(20, 20, Luma([90]));
        assert!(canny(&img, 50.0, 150.0).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn vertical_step_gives_a_thin_line() {
        let img = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 0 } else { 255 }]));
        let edges = canny(&img, 50.0, 150.0);
        for y in 0..20 {
            assert_eq!(edges.get_pixel(9, y)[0], 255, "row {}", y);
            assert_eq!(edges.get_pixel(10, y)[0], 0, "row {}", y);
            for x in (0..8).chain(12..20) {
                assert_eq!(edges.get_pixel(x, y)[0], 0);
            }
        }
    }

    #[test]
    fn weak_edges_need_a_strong_neighbour() {
        // A faint step (gradient 4 * 20 = 80) sits between the thresholds and
        // has nothing strong to attach to.
        let faint = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 100 } else { 120 }]));
        assert!(canny(&faint, 50.0, 150.0).pixels().all(|p| p[0] == 0));

        // The same faint step is kept when a strong step continues it.
        let linked = GrayImage::from_fn(20, 20, |x, y| {
            let high = if y < 10 { 120 } else { 255 };
            Luma([if x < 10 { 100 } else { high }])
        });
        let edges = canny(&linked, 50.0, 150.0);
        assert_eq!(edges.get_pixel(9, 2)[0], 255);
        assert_eq!(edges.get_pixel(9, 15)[0], 255);
    }

    #[test]
    fn output_is_binary() {
        let img = GrayImage::from_fn(32, 32, |x, y| Luma([((x * x + y * 7) % 256) as u8]));
        assert!(canny(&img, 50.0, 150.0).pixels().all(|p| p[0] == 0 || p[0] == 255));
    }
}
