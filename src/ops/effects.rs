// ============================================================================
// STYLE EFFECTS — pixel art, cel shading, anime, dithering, game boy, cartoon
// ============================================================================
//
// Styles only rewrite colour channels; alpha always comes from the input.
// Slider 0 is the identity, 100 is the full effect.
// ============================================================================

use color_quant::NeuQuant;
use image::{RgbaImage, imageops, imageops::FilterType};
use rayon::prelude::*;

use super::adjustments::{edge_mask, hsv_to_rgb, luma, map_pixels, rgb_to_hsv};
use super::image_from_raw;

// ============================================================================
// SHARED HELPERS
// ============================================================================

#[inline]
fn strength(slider: i32) -> f32 {
    slider.clamp(0, 100) as f32 / 100.0
}

/// `original * (1 - t) + styled * t` on RGB; alpha from `original`.
fn blend_rgb(original: &RgbaImage, styled: &RgbaImage, t: f32) -> RgbaImage {
    let (w, h) = original.dimensions();
    if w == 0 || h == 0 {
        return original.clone();
    }
    let stride = w as usize * 4;
    let mut out = original.as_raw().clone();
    out.par_chunks_mut(stride)
        .zip(styled.as_raw().par_chunks(stride))
        .for_each(|(row, styled_row)| {
            for (po, ps) in row.chunks_exact_mut(4).zip(styled_row.chunks_exact(4)) {
                for c in 0..3 {
                    let v = po[c] as f32 * (1.0 - t) + ps[c] as f32 * t;
                    po[c] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    image_from_raw(w, h, out)
}

/// Quantize HSV value to `levels` steps, keeping hue and saturation.
fn posterize_value(src: &RgbaImage, levels: u32) -> RgbaImage {
    let step = (256 / levels.max(1)) as f32;
    map_pixels(src, move |r, g, b, a| {
        let (h, s, v) = rgb_to_hsv(r / 255.0, g / 255.0, b / 255.0);
        let v255 = (v * 255.0).round();
        let quantized = (v255 / step).floor() * step / 255.0;
        let (nr, ng, nb) = hsv_to_rgb(h, s, quantized);
        (nr * 255.0, ng * 255.0, nb * 255.0, a)
    })
}

/// Copy the alpha channel of `alpha_src` into `image`.
fn restore_alpha(image: &mut RgbaImage, alpha_src: &RgbaImage) {
    for (px, src) in image.pixels_mut().zip(alpha_src.pixels()) {
        px[3] = src[3];
    }
}

// ============================================================================
// PIXEL ART
// ============================================================================

/// Block size 2..=16 px. Above 50 the palette is also crushed.
pub fn pixel_art(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 {
        return src.clone();
    }
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let slider = slider.min(100);
    let block = ((1.0 + strength(slider) * 15.0) as u32).max(2);
    let small_w = (w / block).max(1);
    let small_h = (h / block).max(1);

    let mut small = imageops::resize(src, small_w, small_h, FilterType::Triangle);
    if slider > 50 {
        let colors = (256 - slider * 2).max(4) as u32;
        let factor = (256 / colors) as u8;
        if factor > 1 {
            for px in small.pixels_mut() {
                for c in 0..3 {
                    px[c] = (px[c] / factor) * factor;
                }
            }
        }
    }

    let mut out = imageops::resize(&small, w, h, FilterType::Nearest);
    restore_alpha(&mut out, src);
    out
}

// ============================================================================
// DITHERING
// ============================================================================

const BAYER_2X2: [[f32; 2]; 2] = [[0.0, 0.5], [0.75, 0.25]];

/// Ordered 2x2 Bayer dither to three levels per channel (0, 128, 255).
pub fn dithering(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 {
        return src.clone();
    }
    let t = strength(slider);
    let mut out = src.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let threshold = BAYER_2X2[(y % 2) as usize][(x % 2) as usize];
        let low = threshold * t * 0.85;
        let high = threshold * t * 1.15;
        for c in 0..3 {
            let v = px[c] as f32 / 255.0;
            px[c] = if v > high {
                255
            } else if v > low {
                128
            } else {
                0
            };
        }
    }
    out
}

// ============================================================================
// GAME BOY
// ============================================================================

/// Average colour of a 32x32 thumbnail.
fn dominant_color(src: &RgbaImage) -> [f32; 3] {
    let thumb = imageops::resize(src, 32, 32, FilterType::Triangle);
    let mut sum = [0f32; 3];
    for p in thumb.pixels() {
        for c in 0..3 {
            sum[c] += p[c] as f32;
        }
    }
    let n = (thumb.width() * thumb.height()).max(1) as f32;
    sum.map(|s| (s / n).floor())
}

/// Four-level grey, tinted toward the dominant colour in the highlights.
pub fn game_boy(src: &RgbaImage, slider: i32) -> RgbaImage {
    const LEVELS: u32 = 4;
    if slider <= 0 || src.width() == 0 || src.height() == 0 {
        return src.clone();
    }
    let dominant = dominant_color(src);
    let step = (256 / LEVELS) as f32;

    let tinted = map_pixels(src, move |r, g, b, a| {
        let grey = luma(r as u8, g as u8, b as u8).round();
        let poster = (grey / step).floor() * step;
        let i = poster / 255.0;
        (
            i * dominant[0] + (1.0 - i) * poster,
            i * dominant[1] + (1.0 - i) * poster,
            i * dominant[2] + (1.0 - i) * poster,
            a,
        )
    });
    blend_rgb(src, &tinted, strength(slider))
}

// ============================================================================
// ANIME
// ============================================================================

/// Palette size: 256 at slider 0 falling to 4 at 100, steepest early on.
fn anime_palette_size(slider: i32) -> usize {
    let t = strength(slider);
    let colors = if t < 0.25 {
        256.0 - (t / 0.25) * 192.0
    } else if t < 0.5 {
        64.0 - ((t - 0.25) / 0.25) * 32.0
    } else if t < 0.75 {
        32.0 - ((t - 0.5) / 0.25) * 16.0
    } else {
        16.0 - ((t - 0.75) / 0.25) * 12.0
    };
    (colors as usize).max(4)
}

/// Flat colour regions via palette quantization.
pub fn anime(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 {
        return src.clone();
    }
    let colors = anime_palette_size(slider);
    let pixel_count = (src.width() as usize) * (src.height() as usize);
    if colors >= 256 || pixel_count <= colors {
        return src.clone();
    }

    // Quantize colour only; transparent pixels must not skew the palette.
    let opaque: Vec<u8> = src
        .pixels()
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect();
    let sample_factor = if pixel_count > 10_000 { 10 } else { 1 };
    let quant = NeuQuant::new(sample_factor, colors, &opaque);

    let mut out = src.clone();
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_mut(4)
        .for_each(|px| {
            let idx = quant.index_of(&[px[0], px[1], px[2], 255]);
            if let Some(c) = quant.lookup(idx) {
                px[0] = c[0];
                px[1] = c[1];
                px[2] = c[2];
            }
        });
    out
}

// ============================================================================
// CEL SHADING / SIMPLE ANIMATION
// ============================================================================

/// Smoothed, value-posterized colour with black outlines.
pub fn cel_shading(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 || src.width() == 0 || src.height() == 0 {
        return src.clone();
    }
    let t = strength(slider);
    let smooth = imageops::blur(src, 0.8 + t);
    let levels = ((4.0 + 4.0 * (1.0 - t)) as u32).max(2);
    let mut cel = posterize_value(&smooth, levels);

    let edges = edge_mask(src, 200.0);
    for (px, &edge) in cel.pixels_mut().zip(&edges) {
        if edge {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
        }
    }
    blend_rgb(src, &cel, t)
}

/// Flat cartoon shading: 16 value levels at low strength down to 4, with
/// dark line work along strong edges.
pub fn simple_animation(src: &RgbaImage, slider: i32) -> RgbaImage {
    if slider <= 0 || src.width() == 0 || src.height() == 0 {
        return src.clone();
    }
    let t = strength(slider);
    let levels = (4.0 + 12.0 * (1.0 - t)) as u32;
    let mut cartoon = posterize_value(src, levels);

    let edges = edge_mask(src, 150.0);
    for (px, &edge) in cartoon.pixels_mut().zip(&edges) {
        if edge {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
        }
    }
    blend_rgb(src, &cartoon, t)
}
