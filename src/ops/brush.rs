// ============================================================================
// BRUSH OPERATIONS — alpha fill/erase and annotation markers
// ============================================================================

use image::{Rgba, RgbaImage};

use crate::coords::Point;
use crate::ops::PointLabel;

/// Marker radius for point annotations, in canvas pixels.
const MARKER_RADIUS: i32 = 3;

/// What a brush stroke writes into the alpha channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BrushMode {
    /// Restore a masked-out region (alpha 255).
    Fill,
    /// Cut a region out of the mask (alpha 0).
    Erase,
}

impl BrushMode {
    fn alpha(self) -> u8 {
        match self {
            BrushMode::Fill => 255,
            BrushMode::Erase => 0,
        }
    }
}

/// Visit every in-bounds pixel of the disc `|p - centre| <= radius`.
fn for_each_in_disc(
    image: &mut RgbaImage,
    centre: Point,
    radius: f32,
    mut f: impl FnMut(&mut Rgba<u8>),
) {
    if radius < 0.0 {
        return;
    }
    let (w, h) = (image.width() as i64, image.height() as i64);
    // A disc wider than the canvas covers all of it.
    let r = (radius.ceil() as i64).min(w.max(h));
    let r_sq = (radius as f64) * (radius as f64);
    let (cx, cy) = (centre.x as i64, centre.y as i64);
    for y in (cy - r).max(0)..=(cy + r).min(h - 1) {
        for x in (cx - r).max(0)..=(cx + r).min(w - 1) {
            let (dx, dy) = (x - cx, y - cy);
            if ((dx * dx + dy * dy) as f64) <= r_sq {
                f(image.get_pixel_mut(x as u32, y as u32));
            }
        }
    }
}

/// Set the alpha of a disc around each point. The radius is
/// `floor(diameter / 2)`, so a 10px brush covers `dx² + dy² <= 25`.
/// Colour channels are left alone.
pub fn fill_or_erase(
    image: &RgbaImage,
    points: &[Point],
    diameter: f32,
    mode: BrushMode,
) -> RgbaImage {
    let mut out = image.clone();
    let radius = (diameter / 2.0).floor();
    let alpha = mode.alpha();
    for &p in points {
        for_each_in_disc(&mut out, p, radius, |px| px[3] = alpha);
    }
    out
}

/// Draw a small solid dot: green for object points, red for background.
pub fn draw_marker(image: &RgbaImage, point: Point, label: PointLabel) -> RgbaImage {
    let mut out = image.clone();
    let colour = match label {
        PointLabel::Object => Rgba([0, 255, 0, 255]),
        PointLabel::Background => Rgba([255, 0, 0, 255]),
    };
    for_each_in_disc(&mut out, point, MARKER_RADIUS as f32, |px| *px = colour);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erase_clears_a_disc_of_alpha() {
        let img = RgbaImage::from_pixel(50, 50, Rgba([10, 20, 30, 255]));
        let out = fill_or_erase(&img, &[Point::new(10, 10)], 10.0, BrushMode::Erase);
        assert_eq!(out.get_pixel(10, 10)[3], 0);
        assert_eq!(out.get_pixel(15, 10)[3], 0);
        assert_eq!(out.get_pixel(16, 10)[3], 255);
        // Corner of the bounding square is outside the disc.
        assert_eq!(out.get_pixel(14, 14)[3], 255);
        // Colour untouched.
        assert_eq!(&out.get_pixel(10, 10).0[..3], &[10, 20, 30]);
        // Input untouched.
        assert_eq!(img.get_pixel(10, 10)[3], 255);
    }

    #[test]
    fn fill_restores_alpha_and_clips_at_edges() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let out = fill_or_erase(&img, &[Point::new(-1, 0)], 6.0, BrushMode::Fill);
        assert_eq!(out.get_pixel(0, 0)[3], 255);
        assert_eq!(out.get_pixel(1, 0)[3], 255);
        assert_eq!(out.get_pixel(3, 0)[3], 0);
    }

    #[test]
    fn unbounded_diameter_covers_the_canvas() {
        let img = RgbaImage::from_pixel(6, 4, Rgba([9, 9, 9, 255]));
        let out = fill_or_erase(&img, &[Point::new(1, 1)], f32::INFINITY, BrushMode::Erase);
        assert!(out.pixels().all(|p| p[3] == 0));
        let far = fill_or_erase(&img, &[Point::new(i32::MAX, i32::MIN)], 1e30, BrushMode::Erase);
        assert!(far.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn markers_are_coloured_by_label() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        let obj = draw_marker(&img, Point::new(5, 5), PointLabel::Object);
        assert_eq!(*obj.get_pixel(5, 5), Rgba([0, 255, 0, 255]));
        let bg = draw_marker(&img, Point::new(5, 5), PointLabel::Background);
        assert_eq!(*bg.get_pixel(5, 8), Rgba([255, 0, 0, 255]));
        assert_eq!(*bg.get_pixel(5, 9), Rgba([0, 0, 0, 0]));
    }
}
