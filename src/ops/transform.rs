// ============================================================================
// SIZING OPERATIONS — resize, auto-size presets, crops
// ============================================================================

use image::{RgbaImage, imageops};
use std::str::FromStr;

use super::TransformOptions;
use crate::coords::{self, Size};
use crate::error::Result;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    #[default]
    Lanczos3,
}

impl Interpolation {
    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest  => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic  => "bicubic",
            Interpolation::Lanczos3 => "lanczos3",
        }
    }

    pub fn all() -> &'static [Interpolation] {
        &[
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos3,
        ]
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest  => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic  => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Interpolation::all()
            .iter()
            .copied()
            .find(|i| i.label() == wanted)
            .ok_or_else(|| format!("unknown interpolation '{}'", s))
    }
}

// ============================================================================
// RESIZE SPECS
// ============================================================================

/// Named square target boxes for the auto-size step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizePreset {
    /// Keep the source size.
    Original,
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
}

impl SizePreset {
    pub fn label(&self) -> &'static str {
        match self {
            SizePreset::Original => "Original",
            SizePreset::Tiny => "Tiny",
            SizePreset::Small => "Small",
            SizePreset::Medium => "Medium",
            SizePreset::Large => "Large",
            SizePreset::Huge => "Huge",
        }
    }

    /// Target box, `None` for [`SizePreset::Original`].
    pub fn size(&self) -> Option<Size> {
        let side = match self {
            SizePreset::Original => return None,
            SizePreset::Tiny => 32,
            SizePreset::Small => 64,
            SizePreset::Medium => 128,
            SizePreset::Large => 256,
            SizePreset::Huge => 512,
        };
        Some(Size::new(side, side))
    }

    pub fn all() -> &'static [SizePreset] {
        &[
            SizePreset::Original,
            SizePreset::Tiny,
            SizePreset::Small,
            SizePreset::Medium,
            SizePreset::Large,
            SizePreset::Huge,
        ]
    }
}

impl FromStr for SizePreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SizePreset::all()
            .iter()
            .copied()
            .find(|p| p.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown size preset '{}'", s))
    }
}

/// How the final resize step picks its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResizeSpec {
    /// Relative scale, -100..=100. 0 keeps the size.
    Slider(i32),
    Preset(SizePreset),
}

/// Slider -100..=100 to a scale factor: 0.25x at -100, 1x at 0, 4x at 100.
pub fn scale_from_slider(value: i32) -> f64 {
    let v = value.clamp(-100, 100) as f64 / 100.0;
    if v < 0.0 {
        1.0 + v * 0.75
    } else {
        1.0 + v * 3.0
    }
}

/// True when either axis of `current` is off `target` by more than
/// `threshold` (as a fraction of the target).
pub fn should_auto_size(current: Size, target: Size, threshold: f32) -> bool {
    let off = |cur: u32, tgt: u32| {
        tgt > 0 && (cur as f64 - tgt as f64).abs() / tgt as f64 > threshold as f64
    };
    off(current.width, target.width) || off(current.height, target.height)
}

/// Scale `src` to fit inside `target`, keeping the aspect ratio.
pub fn resize_to_fit(src: &RgbaImage, target: Size, filter: Interpolation) -> Result<RgbaImage> {
    let size = coords::fit_size(Size::of(src), target)?;
    if size == Size::of(src) {
        return Ok(src.clone());
    }
    Ok(imageops::resize(src, size.width, size.height, filter.to_filter()))
}

/// Apply a [`ResizeSpec`]. Degenerate inputs come back unchanged.
pub fn resize(src: &RgbaImage, spec: ResizeSpec, opts: &TransformOptions) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    match spec {
        ResizeSpec::Slider(0) => src.clone(),
        ResizeSpec::Slider(v) => {
            let scale = scale_from_slider(v);
            let nw = ((w as f64 * scale) as u32).max(1);
            let nh = ((h as f64 * scale) as u32).max(1);
            imageops::resize(src, nw, nh, opts.filter.to_filter())
        }
        ResizeSpec::Preset(preset) => {
            let Some(target) = preset.size() else {
                return src.clone();
            };
            if !should_auto_size(Size::of(src), target, opts.auto_size_threshold) {
                return src.clone();
            }
            match resize_to_fit(src, target, opts.filter) {
                Ok(out) => out,
                Err(e) => {
                    log::warn!("auto-size to {} skipped: {}", target, e);
                    src.clone()
                }
            }
        }
    }
}

// ============================================================================
// CROPS
// ============================================================================

/// Detector box in source pixels, `(x1, y1)` inclusive, `(x2, y2)` exclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Crop a detector box out of `src`, clamped to the image. `None` when the
/// clamped box is empty.
pub fn crop_box(src: &RgbaImage, bbox: BoundingBox) -> Option<RgbaImage> {
    let (w, h) = src.dimensions();
    let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max);
    let x1 = clamp(bbox.x1.floor(), w);
    let y1 = clamp(bbox.y1.floor(), h);
    let x2 = clamp(bbox.x2.ceil(), w);
    let y2 = clamp(bbox.y2.ceil(), h);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(imageops::crop_imm(src, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// Crop to the bounds of all non-transparent pixels, grown by `padding` and
/// clamped to the image. A fully transparent image is returned as-is.
pub fn crop_to_tight_bounds(src: &RgbaImage, padding: u32) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, px) in src.enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
        });
    }
    let Some((x1, y1, x2, y2)) = bounds else {
        return src.clone();
    };
    let x1 = x1.saturating_sub(padding);
    let y1 = y1.saturating_sub(padding);
    let x2 = (x2 + padding).min(w - 1);
    let y2 = (y2 + padding).min(h - 1);
    imageops::crop_imm(src, x1, y1, x2 - x1 + 1, y2 - y1 + 1).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn slider_scales_span_quarter_to_four() {
        assert_eq!(scale_from_slider(0), 1.0);
        assert_eq!(scale_from_slider(-100), 0.25);
        assert_eq!(scale_from_slider(100), 4.0);
        assert_eq!(scale_from_slider(50), 2.5);
    }

    #[test]
    fn slider_resize_changes_dimensions() {
        let img = RgbaImage::from_pixel(40, 20, Rgba([1, 2, 3, 255]));
        let out = resize(&img, ResizeSpec::Slider(-100), &TransformOptions::default());
        assert_eq!(out.dimensions(), (10, 5));
        let same = resize(&img, ResizeSpec::Slider(0), &TransformOptions::default());
        assert_eq!(same, img);
    }

    #[test]
    fn presets_respect_threshold() {
        let opts = TransformOptions::default();
        // 70 is within 15% of 64: left alone.
        let near = RgbaImage::new(70, 70);
        assert_eq!(resize(&near, ResizeSpec::Preset(SizePreset::Small), &opts).dimensions(), (70, 70));
        // 200x100 fits into 64x64 as 64x32.
        let far = RgbaImage::new(200, 100);
        assert_eq!(resize(&far, ResizeSpec::Preset(SizePreset::Small), &opts).dimensions(), (64, 32));
        assert_eq!(resize(&far, ResizeSpec::Preset(SizePreset::Original), &opts).dimensions(), (200, 100));
    }

    #[test]
    fn tight_crop_pads_and_clamps() {
        let mut img = RgbaImage::new(20, 20);
        img.put_pixel(5, 6, Rgba([9, 9, 9, 255]));
        img.put_pixel(8, 7, Rgba([9, 9, 9, 10]));
        let out = crop_to_tight_bounds(&img, 3);
        assert_eq!(out.dimensions(), (4 + 6, 2 + 6));
        assert_eq!(*out.get_pixel(3, 3), Rgba([9, 9, 9, 255]));

        let mut corner = RgbaImage::new(10, 10);
        corner.put_pixel(0, 0, Rgba([1, 1, 1, 255]));
        assert_eq!(crop_to_tight_bounds(&corner, 3).dimensions(), (4, 4));
    }

    #[test]
    fn transparent_image_is_not_cropped() {
        let img = RgbaImage::new(12, 7);
        assert_eq!(crop_to_tight_bounds(&img, 3).dimensions(), (12, 7));
    }

    #[test]
    fn detection_crop_clamps_to_image() {
        let img = RgbaImage::new(50, 40);
        let out = crop_box(&img, BoundingBox { x1: -5.0, y1: 10.2, x2: 20.0, y2: 90.0 }).unwrap();
        assert_eq!(out.dimensions(), (20, 30));
        assert!(crop_box(&img, BoundingBox { x1: 60.0, y1: 0.0, x2: 70.0, y2: 10.0 }).is_none());
    }

    #[test]
    fn interpolation_parses_labels() {
        assert_eq!("Bicubic".parse::<Interpolation>(), Ok(Interpolation::Bicubic));
        assert!("sinc".parse::<Interpolation>().is_err());
        assert_eq!("huge".parse::<SizePreset>(), Ok(SizePreset::Huge));
    }
}
