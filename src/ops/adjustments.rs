// ============================================================================
// ENHANCEMENT FILTERS — denoise, edges, white/colour balance, saturation
// ============================================================================
//
// Slider values are 0..=100 (saturation also accepts negatives). Zero is
// always the identity. Alpha is preserved unless the filter is an alpha
// filter (denoise, refine edges). Row loops are parallelized via rayon.
// ============================================================================

use image::{GrayImage, RgbaImage, imageops};
use rayon::prelude::*;

use super::image_from_raw;

// ============================================================================
// HELPERS
// ============================================================================

/// Apply a per-pixel transform. `transform` receives (r, g, b, a) as f32 in
/// 0..=255 and returns the new values, which are rounded and clamped.
pub(crate) fn map_pixels<F>(src: &RgbaImage, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let stride = w as usize * 4;
    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; src_raw.len()];

    dst_raw
        .par_chunks_mut(stride)
        .zip(src_raw.par_chunks(stride))
        .for_each(|(row_out, row_in)| {
            for (po, pi) in row_out.chunks_exact_mut(4).zip(row_in.chunks_exact(4)) {
                let (r, g, b, a) = transform(pi[0] as f32, pi[1] as f32, pi[2] as f32, pi[3] as f32);
                po[0] = r.round().clamp(0.0, 255.0) as u8;
                po[1] = g.round().clamp(0.0, 255.0) as u8;
                po[2] = b.round().clamp(0.0, 255.0) as u8;
                po[3] = a.round().clamp(0.0, 255.0) as u8;
            }
        });

    image_from_raw(w, h, dst_raw)
}

#[inline]
fn slider_fraction(slider: i32) -> f32 {
    slider.clamp(0, 100) as f32 / 100.0
}

/// RGB (0..=1) to HSV, all components 0..=1.
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;
    let v = max;
    let s = if max > 0.0 { d / max } else { 0.0 };
    if d == 0.0 {
        return (0.0, s, v);
    }
    let h = if max == r {
        ((g - b) / d).rem_euclid(6.0)
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, v)
}

/// HSV (0..=1) back to RGB (0..=1).
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    if s <= 0.0 {
        return (v, v, v);
    }
    let h6 = (h.rem_euclid(1.0)) * 6.0;
    let i = h6.floor();
    let f = h6 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i as i32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// Rec. 601 luma of an 8-bit pixel.
#[inline]
pub(crate) fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Per-pixel edge flag from the Sobel gradient magnitude of the luma plane.
pub(crate) fn edge_mask(src: &RgbaImage, threshold: f32) -> Vec<bool> {
    let (w, h) = src.dimensions();
    let (wi, hi) = (w as i32, h as i32);
    let gray: Vec<f32> = src.pixels().map(|p| luma(p[0], p[1], p[2])).collect();
    let at = |x: i32, y: i32| -> f32 {
        gray[(y.clamp(0, hi - 1) * wi + x.clamp(0, wi - 1)) as usize]
    };
    let mut mask = vec![false; (w * h) as usize];
    if w == 0 || h == 0 {
        return mask;
    }
    mask.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for (x, flag) in row.iter_mut().enumerate() {
                let x = x as i32;
                let gx = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
                    - at(x - 1, y - 1) - 2.0 * at(x - 1, y) - at(x - 1, y + 1);
                let gy = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
                    - at(x - 1, y - 1) - 2.0 * at(x, y - 1) - at(x + 1, y - 1);
                *flag = (gx * gx + gy * gy).sqrt() > threshold;
            }
        });
    mask
}

/// Approximate Euclidean distance (3-4 chamfer) from each pixel whose alpha
/// is above `threshold` to the nearest pixel at or below it. Background
/// pixels are 0. An image with no background yields `f32::INFINITY`.
pub(crate) fn distance_to_background(src: &RgbaImage, threshold: u8) -> Vec<f32> {
    let (w, h) = (src.width() as usize, src.height() as usize);
    const INF: u32 = u32::MAX / 2;
    let mut d: Vec<u32> = src
        .pixels()
        .map(|p| if p[3] > threshold { INF } else { 0 })
        .collect();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if d[i] == 0 {
                continue;
            }
            let mut best = d[i];
            if x > 0 {
                best = best.min(d[i - 1] + 3);
            }
            if y > 0 {
                best = best.min(d[i - w] + 3);
                if x > 0 {
                    best = best.min(d[i - w - 1] + 4);
                }
                if x + 1 < w {
                    best = best.min(d[i - w + 1] + 4);
                }
            }
            d[i] = best;
        }
    }
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let i = y * w + x;
            if d[i] == 0 {
                continue;
            }
            let mut best = d[i];
            if x + 1 < w {
                best = best.min(d[i + 1] + 3);
            }
            if y + 1 < h {
                best = best.min(d[i + w] + 3);
                if x + 1 < w {
                    best = best.min(d[i + w + 1] + 4);
                }
                if x > 0 {
                    best = best.min(d[i + w - 1] + 4);
                }
            }
            d[i] = best;
        }
    }

    d.into_iter()
        .map(|v| if v >= INF { f32::INFINITY } else { v as f32 / 3.0 })
        .collect()
}

/// Median of one channel over a `(2r+1)²` window with replicated borders,
/// using a sliding histogram per row.
fn median_channel(src: &RgbaImage, channel: usize, radius: u32) -> Vec<u8> {
    let (w, h) = src.dimensions();
    let (wi, hi) = (w as i32, h as i32);
    let raw = src.as_raw();
    let r = radius as i32;
    let sample = |x: i32, y: i32| -> usize {
        let cx = x.clamp(0, wi - 1) as usize;
        let cy = y.clamp(0, hi - 1) as usize;
        raw[(cy * w as usize + cx) * 4 + channel] as usize
    };
    let half = (((2 * r + 1) * (2 * r + 1)) / 2) as u32;

    let mut out = vec![0u8; (w * h) as usize];
    if w == 0 || h == 0 {
        return out;
    }
    out.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            let mut hist = [0u32; 256];
            for dy in -r..=r {
                for dx in -r..=r {
                    hist[sample(dx, y + dy)] += 1;
                }
            }
            for x in 0..wi {
                if x > 0 {
                    for dy in -r..=r {
                        hist[sample(x - 1 - r, y + dy)] -= 1;
                        hist[sample(x + r, y + dy)] += 1;
                    }
                }
                let mut acc = 0;
                let mut median = 0;
                for (v, &count) in hist.iter().enumerate() {
                    acc += count;
                    if acc > half {
                        median = v;
                        break;
                    }
                }
                row[x as usize] = median as u8;
            }
        });
    out
}

/// 3x3 max (dilate) or min (erode) over a float plane.
fn morph3(plane: &[f32], w: usize, h: usize, dilate: bool) -> Vec<f32> {
    let mut out = vec![0.0f32; plane.len()];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, o) in row.iter_mut().enumerate() {
            let mut acc = if dilate { f32::MIN } else { f32::MAX };
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let v = plane[ny * w + nx];
                    acc = if dilate { acc.max(v) } else { acc.min(v) };
                }
            }
            *o = acc;
        }
    });
    out
}

// ============================================================================
// DENOISE
// ============================================================================

/// Median kernel for the alpha pass: 3..=max, odd, capped at 10% of the
/// shorter side (but never below 31).
fn alpha_kernel(slider: i32, w: u32, h: u32) -> u32 {
    if slider <= 0 {
        return 1;
    }
    let max_kernel = (w.min(h) / 10).max(31);
    let kernel = 3 + (slider_fraction(slider) * (max_kernel - 3) as f32) as u32;
    if kernel % 2 == 1 { kernel } else { kernel + 1 }
}

/// Smooth ragged mask edges with a median on alpha; strong settings also
/// median-filter the colour channels.
pub fn denoise(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 {
        return src.clone();
    }
    let (w, h) = src.dimensions();
    let mut out = src.clone();

    let kernel = alpha_kernel(slider, w, h);
    if kernel > 1 {
        let alpha = median_channel(src, 3, kernel / 2);
        for (px, a) in out.pixels_mut().zip(alpha) {
            px[3] = a;
        }
    }

    // Colour runs at half strength and only once it is significant.
    if slider / 2 > 25 {
        let planes: Vec<Vec<u8>> = (0..3).map(|c| median_channel(src, c, 1)).collect();
        for (i, px) in out.pixels_mut().enumerate() {
            px[0] = planes[0][i];
            px[1] = planes[1][i];
            px[2] = planes[2][i];
        }
    }
    out
}

// ============================================================================
// EDGE ENHANCEMENT
// ============================================================================

struct EdgeParams {
    external_thickness: f32,
    sharpen: f32,
    darken: f32,
}

fn edge_params(slider: i32) -> EdgeParams {
    let s = slider.clamp(0, 100) as f32;
    let (sharpen, darken) = if s <= 50.0 {
        (0.7 + s / 50.0 * 0.3, s / 50.0 * 0.3)
    } else {
        (1.0 - (s - 50.0) / 50.0 * 0.7, 0.3 + (s - 50.0) / 50.0 * 0.7)
    };
    EdgeParams {
        external_thickness: (s / 100.0 * 4.0).floor(),
        sharpen,
        darken,
    }
}

/// Low slider values mostly sharpen interior edges; high values mostly darken
/// the silhouette outline.
pub fn enhance_edges(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 {
        return src.clone();
    }
    let params = edge_params(slider);
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }

    let dist = distance_to_background(src, 128);
    let edges = edge_mask(src, 100.0);
    let blurred = imageops::blur(src, 1.0);

    // Never darker than 15% (outline) / 70% (interior) of the original.
    let external_factor = 1.0 - params.darken * (1.0 - 0.15);
    let internal_factor = 1.0 - params.darken * (1.0 - 0.7);

    let stride = w as usize * 4;
    let src_raw = src.as_raw();
    let blur_raw = blurred.as_raw();
    let mut dst_raw = src_raw.clone();

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w as usize {
                let i = y * w as usize + x;
                let pi = x * 4;
                let opaque = src_raw[y * stride + pi + 3] > 128;
                let external = dist[i] > 0.0 && dist[i] <= params.external_thickness;
                let internal = edges[i] && opaque;
                for c in 0..3 {
                    let mut v = row[pi + c] as f32;
                    if params.darken > 0.0 {
                        if external {
                            v *= external_factor;
                        }
                        if internal {
                            v *= internal_factor;
                        }
                    }
                    if params.sharpen > 0.0 && internal {
                        let b = blur_raw[y * stride + pi + c] as f32;
                        v = v * (1.0 + params.sharpen) - b * params.sharpen;
                    }
                    row[pi + c] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    image_from_raw(w, h, dst_raw)
}

// ============================================================================
// WHITE BALANCE / COLOUR BALANCE / SATURATION
// ============================================================================

/// Nudge the average colour toward neutral grey. Only 30% of the full
/// correction is ever applied, scaled further by the slider.
pub fn white_balance(src: &RgbaImage, slider: i32) -> RgbaImage {
    const GENTLENESS: f32 = 0.3;
    if slider == 0 || src.width() == 0 || src.height() == 0 {
        return src.clone();
    }
    let strength = slider as f32 / 100.0;
    let n = (src.width() as f64) * (src.height() as f64);
    let mut sum = [0f64; 3];
    for p in src.pixels() {
        sum[0] += p[0] as f64;
        sum[1] += p[1] as f64;
        sum[2] += p[2] as f64;
    }
    let avg = sum.map(|s| (s / n) as f32);
    let target = (avg[0] + avg[1] + avg[2]) / 3.0;
    let factors = avg.map(|a| {
        let correction = if a > 0.0 { target / a } else { 1.0 };
        let gentle = 1.0 + (correction - 1.0) * GENTLENESS;
        1.0 + (gentle - 1.0) * strength
    });
    map_pixels(src, move |r, g, b, a| (r * factors[0], g * factors[1], b * factors[2], a))
}

/// Vibrance: boost weakly saturated colours more than strong ones.
/// Slider 100 multiplies grey-ish saturation by up to 2.5x.
pub fn color_balance(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider == 0 {
        return src.clone();
    }
    let base_boost = 1.0 + slider as f32 / 100.0 * 1.5;
    map_pixels(src, move |r, g, b, a| {
        let (h, s, v) = rgb_to_hsv(r / 255.0, g / 255.0, b / 255.0);
        let boost = 1.0 + (base_boost - 1.0) * (1.0 - s);
        let (nr, ng, nb) = hsv_to_rgb(h, (s * boost).clamp(0.0, 1.0), v);
        (nr * 255.0, ng * 255.0, nb * 255.0, a)
    })
}

/// Multiply HSV saturation by `1 + slider / 100`.
pub fn adjust_saturation(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider == 0 {
        return src.clone();
    }
    let multiplier = 1.0 + slider as f32 / 100.0;
    map_pixels(src, move |r, g, b, a| {
        let (h, s, v) = rgb_to_hsv(r / 255.0, g / 255.0, b / 255.0);
        let (nr, ng, nb) = hsv_to_rgb(h, (s * multiplier).clamp(0.0, 1.0), v);
        (nr * 255.0, ng * 255.0, nb * 255.0, a)
    })
}

// ============================================================================
// REFINE EDGES
// ============================================================================

/// Feather the alpha mask: gaussian blur, a small closing to fill pinholes
/// above 40, and a distance-based soft falloff above 70.
pub fn refine_edges(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 {
        return src.clone();
    }
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let (wu, hu) = (w as usize, h as usize);

    let kernel = 3 + (slider_fraction(slider) * 8.0) as u32;
    let kernel = if kernel % 2 == 1 { kernel } else { kernel + 1 };
    let sigma = 0.2 * kernel as f32;

    let alpha = GrayImage::from_fn(w, h, |x, y| image::Luma([src.get_pixel(x, y)[3]]));
    let blurred = imageops::blur(&alpha, sigma);
    let mut smoothed: Vec<f32> = blurred.as_raw().iter().map(|&a| a as f32 / 255.0).collect();

    if slider > 40 {
        for _ in 0..2 {
            smoothed = morph3(&smoothed, wu, hu, true);
        }
        for _ in 0..2 {
            smoothed = morph3(&smoothed, wu, hu, false);
        }
    }

    if slider > 70 {
        let dist = distance_to_background(src, 127);
        let max = dist
            .iter()
            .copied()
            .filter(|d| d.is_finite())
            .fold(0.0f32, f32::max);
        if max > 0.0 {
            let blend = ((slider - 70) as f32 / 100.0).min(0.3);
            for (s, d) in smoothed.iter_mut().zip(&dist) {
                let norm = if d.is_finite() { d / max } else { 1.0 };
                *s = *s * (1.0 - blend) + norm * blend;
            }
        }
    }

    let mut out = src.clone();
    for (px, s) in out.pixels_mut().zip(smoothed) {
        px[3] = (s * 255.0).clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 120, 255])
        })
    }

    #[test]
    fn hsv_round_trips() {
        for &(r, g, b) in &[(1.0, 0.0, 0.0), (0.2, 0.6, 0.4), (0.9, 0.9, 0.1), (0.3, 0.3, 0.3)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let (nr, ng, nb) = hsv_to_rgb(h, s, v);
            assert!((nr - r).abs() < 1e-4 && (ng - g).abs() < 1e-4 && (nb - b).abs() < 1e-4);
        }
    }

    #[test]
    fn saturation_boost_spreads_channels_and_keeps_alpha() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([150, 110, 100, 77]));
        let out = adjust_saturation(&img, 80);
        let p = out.get_pixel(0, 0);
        assert_eq!(p[3], 77);
        assert!(p[0] as i32 - p[2] as i32 > 50, "{p:?}");
        // Value (max channel) is preserved.
        assert_eq!(p[0], 150);
    }

    #[test]
    fn grey_pixels_are_unchanged_by_saturation() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([90, 90, 90, 255]));
        assert_eq!(adjust_saturation(&img, 100), img);
        assert_eq!(color_balance(&img, 100), img);
    }

    #[test]
    fn white_balance_pulls_toward_grey() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 100, 255]));
        let out = white_balance(&img, 100);
        let p = out.get_pixel(0, 0);
        assert!(p[0] < 200 && p[1] > 100 && p[2] > 100, "{p:?}");
    }

    #[test]
    fn denoise_removes_isolated_alpha_speck() {
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([10, 10, 10, 0]));
        img.put_pixel(20, 20, Rgba([10, 10, 10, 255]));
        let out = denoise(&img, 10);
        assert_eq!(out.get_pixel(20, 20)[3], 0);
    }

    #[test]
    fn distance_counts_pixels_from_background() {
        let mut img = RgbaImage::from_pixel(9, 1, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let d = distance_to_background(&img, 128);
        assert_eq!(d[0], 0.0);
        assert!((d[1] - 1.0).abs() < 1e-6);
        assert!((d[4] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn refine_edges_softens_hard_mask() {
        let img = RgbaImage::from_fn(30, 30, |x, _| {
            Rgba([50, 50, 50, if x < 15 { 255 } else { 0 }])
        });
        let out = refine_edges(&img, 30);
        let edge = out.get_pixel(15, 15)[3];
        assert!(edge > 0 && edge < 255, "edge alpha {edge}");
        assert!(out.get_pixel(2, 15)[3] > 250);
        assert_eq!(out.get_pixel(28, 15)[3], 0);
    }

    #[test]
    fn filters_preserve_shape() {
        let img = gradient(17, 11);
        for out in [
            denoise(&img, 60),
            enhance_edges(&img, 70),
            white_balance(&img, 40),
            color_balance(&img, 40),
            refine_edges(&img, 90),
        ] {
            assert_eq!(out.dimensions(), img.dimensions());
        }
    }
}
