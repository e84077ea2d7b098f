// ============================================================================
// COORDINATE MAPPER — display space <-> original image space
// ============================================================================
//
// The cached buffer is usually a downscaled copy of the original, so every
// point or brush size recorded against it has to be mapped before it can be
// replayed at full resolution. Mapping is floor-truncating and therefore
// lossy; round trips stay within one pixel.
// ============================================================================

use crate::error::{EditError, Result};

/// Width/height pair in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &image::RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Fails with `InvalidDimension` when either axis is zero.
    pub fn validate(self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(EditError::InvalidDimension {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel coordinate. Signed so brush centres may sit just off the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Per-axis `original / display` factors.
fn axis_scales(display: Size, original: Size) -> Result<(f64, f64)> {
    let display = display.validate()?;
    let original = original.validate()?;
    Ok((
        original.width as f64 / display.width as f64,
        original.height as f64 / display.height as f64,
    ))
}

/// Map a point clicked on the display buffer into original-image space.
pub fn to_original(point: Point, display: Size, original: Size) -> Result<Point> {
    let (sx, sy) = axis_scales(display, original)?;
    Ok(Point::new(
        (point.x as f64 * sx).floor() as i32,
        (point.y as f64 * sy).floor() as i32,
    ))
}

/// Inverse of [`to_original`]. Not an exact inverse: truncation in either
/// direction can move the point by one pixel.
pub fn to_display(point: Point, display: Size, original: Size) -> Result<Point> {
    let (sx, sy) = axis_scales(display, original)?;
    Ok(Point::new(
        (point.x as f64 / sx).floor() as i32,
        (point.y as f64 / sy).floor() as i32,
    ))
}

/// Scale a brush diameter. Circular tools have one radius, so the x/y
/// factors are averaged instead of applied per axis.
pub fn scale_diameter(diameter: f32, display: Size, original: Size) -> Result<f32> {
    let (sx, sy) = axis_scales(display, original)?;
    Ok((((sx + sy) / 2.0) * diameter as f64) as f32)
}

/// Fit-inside scale factor: `min(target.w / src.w, target.h / src.h)`.
/// Upscaling is allowed; nothing is cropped.
pub fn compute_fit_scale(source: Size, target: Size) -> Result<f64> {
    let source = source.validate()?;
    let target = target.validate()?;
    Ok((target.width as f64 / source.width as f64)
        .min(target.height as f64 / source.height as f64))
}

/// Dimensions of `source` after fitting it inside `target` (aspect kept,
/// no padding). Never collapses an axis below one pixel.
pub fn fit_size(source: Size, target: Size) -> Result<Size> {
    let scale = compute_fit_scale(source, target)?;
    Ok(Size::new(
        ((source.width as f64 * scale) as u32).max(1),
        ((source.height as f64 * scale) as u32).max(1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_click_into_original_space() {
        let p = to_original(Point::new(10, 10), Size::new(50, 50), Size::new(100, 100)).unwrap();
        assert_eq!(p, Point::new(20, 20));

        // Non-uniform axes truncate independently.
        let p = to_original(Point::new(3, 3), Size::new(40, 30), Size::new(100, 100)).unwrap();
        assert_eq!(p, Point::new(7, 10));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let err = to_original(Point::new(1, 1), Size::new(0, 10), Size::new(10, 10));
        assert!(matches!(err, Err(EditError::InvalidDimension { width: 0, height: 10 })));
        assert!(compute_fit_scale(Size::new(10, 10), Size::new(10, 0)).is_err());
        assert!(scale_diameter(4.0, Size::new(10, 10), Size::new(0, 0)).is_err());
    }

    #[test]
    fn diameter_uses_mean_axis_scale() {
        // x scale 2.0, y scale 4.0 -> mean 3.0
        let d = scale_diameter(10.0, Size::new(50, 25), Size::new(100, 100)).unwrap();
        assert!((d - 30.0).abs() < 1e-4);
    }

    #[test]
    fn fit_scale_keeps_aspect() {
        let s = compute_fit_scale(Size::new(200, 100), Size::new(50, 50)).unwrap();
        assert!((s - 0.25).abs() < 1e-9);
        assert_eq!(fit_size(Size::new(200, 100), Size::new(50, 50)).unwrap(), Size::new(50, 25));
        // Upscale is allowed.
        assert_eq!(fit_size(Size::new(10, 20), Size::new(100, 100)).unwrap(), Size::new(50, 100));
    }

    #[test]
    fn round_trip_stays_within_one_pixel() {
        let pairs = [
            (Size::new(50, 50), Size::new(100, 100)),
            (Size::new(37, 91), Size::new(640, 480)),
            (Size::new(10, 10), Size::new(1000, 1000)),
            (Size::new(333, 250), Size::new(1001, 757)),
        ];
        for (display, original) in pairs {
            for x in (0..display.width as i32).step_by(3) {
                for y in (0..display.height as i32).step_by(5) {
                    let p = Point::new(x, y);
                    let o = to_original(p, display, original).unwrap();
                    let back = to_display(o, display, original).unwrap();
                    assert!((back.x - p.x).abs() <= 1, "{p:?} -> {o:?} -> {back:?}");
                    assert!((back.y - p.y).abs() <= 1, "{p:?} -> {o:?} -> {back:?}");
                }
            }
        }
    }
}
