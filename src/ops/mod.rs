// ============================================================================
// TRANSFORM LIBRARY — pure `image + params -> image` operations
// ============================================================================
//
// Every operation is copy-in/copy-out: the input buffer is never mutated, so
// the edit engine can diff against it afterwards. Operations are grouped by
// the replay category the engine treats them with:
//   - PixelLevel : brush fill/erase, point annotations (patch + undo)
//   - WholeImage : enhancement filters, styles (recomputed from original)
//   - AssertLevel: final sizing (recomputed from original, full fidelity)
// ============================================================================

pub mod adjustments;
pub mod brush;
pub mod effects;
pub mod transform;

use image::RgbaImage;

use crate::coords::{self, Point, Size};
use crate::error::Result;

pub use brush::BrushMode;
pub use transform::{Interpolation, ResizeSpec, SizePreset};

/// Replay category of an edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditCategory {
    PixelLevel,
    WholeImage,
    AssertLevel,
    Undo,
    Redo,
}

/// A request submitted to the edit engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    Pixel(PixelOp),
    WholeImage(WholeImageOp),
    Assert(AssertOp),
    Undo,
    Redo,
}

impl Edit {
    pub fn category(&self) -> EditCategory {
        match self {
            Edit::Pixel(_) => EditCategory::PixelLevel,
            Edit::WholeImage(_) => EditCategory::WholeImage,
            Edit::Assert(_) => EditCategory::AssertLevel,
            Edit::Undo => EditCategory::Undo,
            Edit::Redo => EditCategory::Redo,
        }
    }
}

/// Settings-dependent knobs shared by the sizing operations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformOptions {
    pub filter: Interpolation,
    pub auto_size_threshold: f32,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            filter: Interpolation::Lanczos3,
            auto_size_threshold: 0.15,
        }
    }
}

// ============================================================================
// PIXEL-LEVEL OPERATIONS
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct BrushStroke {
    pub points: Vec<Point>,
    pub diameter: f32,
    pub mode: BrushMode,
}

/// Foreground/background hint for the segmentation collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointLabel {
    Object,
    Background,
}

impl PointLabel {
    /// `1` = object/foreground, `0` = background.
    pub fn class(self) -> u8 {
        match self {
            PointLabel::Object => 1,
            PointLabel::Background => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointAnnotation {
    pub point: Point,
    pub label: PointLabel,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PixelOp {
    Brush(BrushStroke),
    Annotate(PointAnnotation),
}

impl PixelOp {
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        match self {
            PixelOp::Brush(stroke) => {
                brush::fill_or_erase(image, &stroke.points, stroke.diameter, stroke.mode)
            }
            PixelOp::Annotate(a) => brush::draw_marker(image, a.point, a.label),
        }
    }

    /// The same operation expressed on a canvas of size `to` instead of
    /// `from`: points are remapped and brush diameters scaled.
    pub fn rescaled(&self, from: Size, to: Size) -> Result<PixelOp> {
        Ok(match self {
            PixelOp::Brush(stroke) => PixelOp::Brush(BrushStroke {
                points: stroke
                    .points
                    .iter()
                    .map(|p| coords::to_original(*p, from, to))
                    .collect::<Result<Vec<_>>>()?,
                diameter: coords::scale_diameter(stroke.diameter, from, to)?,
                mode: stroke.mode,
            }),
            PixelOp::Annotate(a) => PixelOp::Annotate(PointAnnotation {
                point: coords::to_original(a.point, from, to)?,
                label: a.label,
            }),
        })
    }

    pub fn description(&self) -> String {
        match self {
            PixelOp::Brush(s) => format!(
                "{} ({} pt, {:.0}px)",
                match s.mode {
                    BrushMode::Fill => "Fill",
                    BrushMode::Erase => "Erase",
                },
                s.points.len(),
                s.diameter
            ),
            PixelOp::Annotate(a) => match a.label {
                PointLabel::Object => format!("Object point ({}, {})", a.point.x, a.point.y),
                PointLabel::Background => {
                    format!("Background point ({}, {})", a.point.x, a.point.y)
                }
            },
        }
    }
}

// ============================================================================
// WHOLE-IMAGE OPERATIONS
// ============================================================================

/// Enhancement sliders, 0..=100 each. Zero skips the filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Enhancements {
    pub denoise: i32,
    pub edges: i32,
    pub white_balance: i32,
    pub color_balance: i32,
    pub saturation: i32,
    pub refine_edges: i32,
}

impl Enhancements {
    fn fields(&self) -> [(&'static str, i32); 6] {
        [
            ("denoise", self.denoise),
            ("edges", self.edges),
            ("white balance", self.white_balance),
            ("color balance", self.color_balance),
            ("saturation", self.saturation),
            ("refine edges", self.refine_edges),
        ]
    }

    /// Filters run in a fixed order regardless of which sliders are set.
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        if self.denoise != 0 {
            out = adjustments::denoise(&out, self.denoise);
        }
        if self.edges != 0 {
            out = adjustments::enhance_edges(&out, self.edges);
        }
        if self.white_balance != 0 {
            out = adjustments::white_balance(&out, self.white_balance);
        }
        if self.color_balance != 0 {
            out = adjustments::color_balance(&out, self.color_balance);
        }
        if self.saturation != 0 {
            out = adjustments::adjust_saturation(&out, self.saturation);
        }
        if self.refine_edges != 0 {
            out = adjustments::refine_edges(&out, self.refine_edges);
        }
        out
    }
}

/// Style sliders, 0..=100 each. Zero skips the style.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Styles {
    pub pixel_art: i32,
    pub cel_shading: i32,
    pub anime: i32,
    pub dithered: i32,
    pub game_boy: i32,
    pub simple_animation: i32,
}

impl Styles {
    fn fields(&self) -> [(&'static str, i32); 6] {
        [
            ("pixel art", self.pixel_art),
            ("cel shading", self.cel_shading),
            ("anime", self.anime),
            ("dithered", self.dithered),
            ("game boy", self.game_boy),
            ("simple animation", self.simple_animation),
        ]
    }

    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        if self.pixel_art != 0 {
            out = effects::pixel_art(&out, self.pixel_art);
        }
        if self.cel_shading != 0 {
            out = effects::cel_shading(&out, self.cel_shading);
        }
        if self.anime != 0 {
            out = effects::anime(&out, self.anime);
        }
        if self.dithered != 0 {
            out = effects::dithering(&out, self.dithered);
        }
        if self.game_boy != 0 {
            out = effects::game_boy(&out, self.game_boy);
        }
        if self.simple_animation != 0 {
            out = effects::simple_animation(&out, self.simple_animation);
        }
        out
    }
}

fn describe_sliders(title: &str, fields: &[(&'static str, i32)]) -> String {
    let set: Vec<String> = fields
        .iter()
        .filter(|(_, v)| *v != 0)
        .map(|(name, v)| format!("{} {}", name, v))
        .collect();
    if set.is_empty() {
        title.to_string()
    } else {
        format!("{} ({})", title, set.join(", "))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WholeImageOp {
    Enhance(Enhancements),
    Stylize(Styles),
}

impl WholeImageOp {
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        match self {
            WholeImageOp::Enhance(e) => e.apply(image),
            WholeImageOp::Stylize(s) => s.apply(image),
        }
    }

    pub fn description(&self) -> String {
        match self {
            WholeImageOp::Enhance(e) => describe_sliders("Enhance", &e.fields()),
            WholeImageOp::Stylize(s) => describe_sliders("Style", &s.fields()),
        }
    }
}

// ============================================================================
// ASSERT-LEVEL OPERATIONS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssertOp {
    Resize(ResizeSpec),
}

impl AssertOp {
    pub fn apply(&self, image: &RgbaImage, opts: &TransformOptions) -> RgbaImage {
        match self {
            AssertOp::Resize(spec) => transform::resize(image, *spec, opts),
        }
    }

    pub fn description(&self) -> String {
        match self {
            AssertOp::Resize(ResizeSpec::Slider(v)) => format!("Resize ({:+})", v),
            AssertOp::Resize(ResizeSpec::Preset(p)) => format!("Resize ({})", p.label()),
        }
    }
}

/// Wrap a freshly produced raw buffer. Callers always hand in exactly
/// `w * h * 4` bytes; the blank fallback only guards the type signature.
pub(crate) fn image_from_raw(w: u32, h: u32, raw: Vec<u8>) -> RgbaImage {
    RgbaImage::from_raw(w, h, raw).unwrap_or_else(|| RgbaImage::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn zeroed_sliders_are_identity() {
        let img = RgbaImage::from_fn(12, 9, |x, y| Rgba([x as u8 * 20, y as u8 * 25, 90, 255]));
        assert_eq!(Enhancements::default().apply(&img), img);
        assert_eq!(Styles::default().apply(&img), img);
    }

    #[test]
    fn rescaled_brush_maps_points_and_diameter() {
        let op = PixelOp::Brush(BrushStroke {
            points: vec![Point::new(10, 5)],
            diameter: 10.0,
            mode: BrushMode::Erase,
        });
        let scaled = op.rescaled(Size::new(50, 50), Size::new(100, 100)).unwrap();
        match scaled {
            PixelOp::Brush(s) => {
                assert_eq!(s.points, vec![Point::new(20, 10)]);
                assert!((s.diameter - 20.0).abs() < 1e-4);
                assert_eq!(s.mode, BrushMode::Erase);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn descriptions_name_the_set_sliders() {
        let op = WholeImageOp::Enhance(Enhancements {
            saturation: 50,
            ..Default::default()
        });
        assert_eq!(op.description(), "Enhance (saturation 50)");
        assert_eq!(
            AssertOp::Resize(ResizeSpec::Preset(SizePreset::Small)).description(),
            "Resize (Small)"
        );
    }

    #[test]
    fn labels_map_to_segmentation_classes() {
        assert_eq!(PointLabel::Object.class(), 1);
        assert_eq!(PointLabel::Background.class(), 0);
    }
}
