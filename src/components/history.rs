use image::RgbaImage;
use rayon::prelude::*;
use std::collections::VecDeque;

use crate::error::{EditError, Result};

// ============================================================================
// BOUNDING BOX
// ============================================================================

/// Inclusive pixel rectangle `(x1, y1)..=(x2, y2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BBox {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2 && self.x2 < width && self.y2 < height
    }
}

// ============================================================================
// PIXEL PATCH - the changed region of one pixel-level edit
// ============================================================================

/// Which side of a patch to write back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchSide {
    Before,
    After,
}

/// Minimal rectangle of pixels that differ between two buffers, with both
/// versions of the region kept for undo and redo.
#[derive(Clone, Debug)]
pub struct PixelPatch {
    pub bbox: BBox,
    pub before: RgbaImage,
    pub after: RgbaImage,
}

impl PixelPatch {
    /// Diff two same-shaped buffers across all four channels.
    ///
    /// Returns `Ok(None)` when nothing changed. Otherwise the patch holds the
    /// tightest box around every differing pixel.
    pub fn diff(before: &RgbaImage, after: &RgbaImage) -> Result<Option<Self>> {
        if before.dimensions() != after.dimensions() {
            return Err(EditError::ShapeMismatch {
                expected: before.dimensions(),
                actual: after.dimensions(),
            });
        }
        let (w, h) = before.dimensions();
        if w == 0 || h == 0 {
            return Ok(None);
        }
        let stride = w as usize * 4;

        // Per row: (y, first changed x, last changed x); rows reduce into a box.
        let bbox = before
            .as_raw()
            .par_chunks(stride)
            .zip(after.as_raw().par_chunks(stride))
            .enumerate()
            .filter_map(|(y, (row_a, row_b))| {
                if row_a == row_b {
                    return None;
                }
                let first = row_a
                    .chunks_exact(4)
                    .zip(row_b.chunks_exact(4))
                    .position(|(pa, pb)| pa != pb)?;
                let last = row_a
                    .chunks_exact(4)
                    .zip(row_b.chunks_exact(4))
                    .rposition(|(pa, pb)| pa != pb)?;
                Some(BBox {
                    x1: first as u32,
                    y1: y as u32,
                    x2: last as u32,
                    y2: y as u32,
                })
            })
            .reduce_with(|a, b| BBox {
                x1: a.x1.min(b.x1),
                y1: a.y1.min(b.y1),
                x2: a.x2.max(b.x2),
                y2: a.y2.max(b.y2),
            });

        Ok(bbox.map(|bbox| Self {
            bbox,
            before: extract_region(before, bbox),
            after: extract_region(after, bbox),
        }))
    }

    /// Write one side of the patch into `buffer` at `bbox`. Pixels outside
    /// the box are never touched.
    pub fn apply(&self, buffer: &mut RgbaImage, side: PatchSide) -> Result<()> {
        let (w, h) = buffer.dimensions();
        if !self.bbox.fits(w, h) {
            log::error!("patch {:?} does not fit {}x{} buffer", self.bbox, w, h);
            debug_assert!(false, "patch bbox out of bounds");
            return Err(EditError::OutOfBounds {
                bbox: self.bbox,
                width: w,
                height: h,
            });
        }
        let src = match side {
            PatchSide::Before => &self.before,
            PatchSide::After => &self.after,
        };
        let row_len = self.bbox.width() as usize * 4;
        let stride = w as usize * 4;
        let dst: &mut [u8] = &mut *buffer;
        for (row, src_row) in src.as_raw().chunks_exact(row_len).enumerate() {
            let y = self.bbox.y1 as usize + row;
            let start = y * stride + self.bbox.x1 as usize * 4;
            dst[start..start + row_len].copy_from_slice(src_row);
        }
        Ok(())
    }

    pub fn memory_size(&self) -> usize {
        self.before.as_raw().len() + self.after.as_raw().len()
    }
}

/// Copy the inclusive `bbox` region out of `image`.
fn extract_region(image: &RgbaImage, bbox: BBox) -> RgbaImage {
    let (w, _) = image.dimensions();
    let stride = w as usize * 4;
    let row_len = bbox.width() as usize * 4;
    let raw = image.as_raw();
    let mut out = Vec::with_capacity(row_len * bbox.height() as usize);
    for y in bbox.y1..=bbox.y2 {
        let start = y as usize * stride + bbox.x1 as usize * 4;
        out.extend_from_slice(&raw[start..start + row_len]);
    }
    // Length is exactly width * height * 4 by construction.
    RgbaImage::from_raw(bbox.width(), bbox.height(), out)
        .unwrap_or_else(|| RgbaImage::new(bbox.width(), bbox.height()))
}

// ============================================================================
// PATCH HISTORY - undo/redo stacks with step and memory limits
// ============================================================================

/// Patch-Undo / Patch-Redo stacks for one image.
pub struct PatchHistory {
    undo_stack: VecDeque<PixelPatch>,
    redo_stack: VecDeque<PixelPatch>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for PatchHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl PatchHistory {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_memory_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    /// Push a new patch. Clears the redo side and prunes the oldest entries
    /// past the limits; returns how many were pruned so the caller can keep
    /// its command list in step.
    pub fn push(&mut self, patch: PixelPatch) -> usize {
        for p in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(p.memory_size());
        }
        self.total_memory += patch.memory_size();
        self.undo_stack.push_back(patch);
        self.prune()
    }

    /// Restore the `before` side of the newest patch into `buffer` and move
    /// it to the redo stack. `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self, buffer: &mut RgbaImage) -> Result<bool> {
        let Some(patch) = self.undo_stack.back() else {
            return Ok(false);
        };
        patch.apply(buffer, PatchSide::Before)?;
        if let Some(patch) = self.undo_stack.pop_back() {
            self.redo_stack.push_back(patch);
        }
        Ok(true)
    }

    /// Mirror of [`Self::undo`], restoring the `after` side.
    pub fn redo(&mut self, buffer: &mut RgbaImage) -> Result<bool> {
        let Some(patch) = self.redo_stack.back() else {
            return Ok(false);
        };
        patch.apply(buffer, PatchSide::After)?;
        if let Some(patch) = self.redo_stack.pop_back() {
            self.undo_stack.push_back(patch);
        }
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Current memory usage of both stacks (O(1) via cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Prune old patches to stay within limits.
    fn prune(&mut self) -> usize {
        let mut pruned = 0;
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                pruned += 1;
            }
        }

        // Always keep the newest patch, even if it alone exceeds the cap.
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            log::debug!("pruned {} patch(es), history now {} bytes", pruned, self.total_memory);
        }
        pruned
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn identical_buffers_produce_no_patch() {
        let a = solid(8, 8, [10, 20, 30, 255]);
        assert!(PixelPatch::diff(&a, &a.clone()).unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let a = solid(8, 8, [0, 0, 0, 255]);
        let b = solid(8, 9, [0, 0, 0, 255]);
        assert!(matches!(
            PixelPatch::diff(&a, &b),
            Err(EditError::ShapeMismatch { expected: (8, 8), actual: (8, 9) })
        ));
    }

    #[test]
    fn bbox_is_tight_around_changed_square() {
        let before = solid(40, 30, [1, 2, 3, 255]);
        let mut after = before.clone();
        for y in 12..17 {
            for x in 5..10 {
                after.put_pixel(x, y, Rgba([200, 2, 3, 255]));
            }
        }
        let patch = PixelPatch::diff(&before, &after).unwrap().unwrap();
        assert_eq!(patch.bbox, BBox { x1: 5, y1: 12, x2: 9, y2: 16 });
        assert!(patch.bbox.area() <= 25);
        assert_eq!(patch.before.dimensions(), (5, 5));
        assert!(patch.after.pixels().all(|p| *p == Rgba([200, 2, 3, 255])));
        assert!(patch.before.pixels().all(|p| *p == Rgba([1, 2, 3, 255])));
    }

    #[test]
    fn alpha_only_changes_are_detected() {
        let before = solid(4, 4, [9, 9, 9, 255]);
        let mut after = before.clone();
        after.put_pixel(3, 0, Rgba([9, 9, 9, 254]));
        let patch = PixelPatch::diff(&before, &after).unwrap().unwrap();
        assert_eq!(patch.bbox, BBox { x1: 3, y1: 0, x2: 3, y2: 0 });
    }

    #[test]
    fn apply_touches_only_the_box() {
        let before = solid(10, 10, [0, 0, 0, 255]);
        let mut after = before.clone();
        after.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        after.put_pixel(6, 5, Rgba([255, 255, 255, 255]));
        let patch = PixelPatch::diff(&before, &after).unwrap().unwrap();

        let mut canvas = solid(10, 10, [7, 7, 7, 7]);
        patch.apply(&mut canvas, PatchSide::After).unwrap();
        for (x, y, px) in canvas.enumerate_pixels() {
            let inside = (4..=6).contains(&x) && (4..=5).contains(&y);
            if !inside {
                assert_eq!(*px, Rgba([7, 7, 7, 7]), "pixel ({x},{y}) outside bbox changed");
            }
        }
        assert_eq!(*canvas.get_pixel(4, 4), Rgba([255, 255, 255, 255]));
        assert_eq!(*canvas.get_pixel(5, 4), Rgba([0, 0, 0, 255]));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn apply_rejects_out_of_bounds() {
        let before = solid(10, 10, [0, 0, 0, 255]);
        let mut after = before.clone();
        after.put_pixel(9, 9, Rgba([1, 1, 1, 1]));
        let patch = PixelPatch::diff(&before, &after).unwrap().unwrap();
        let mut small = solid(5, 5, [0, 0, 0, 0]);
        assert!(matches!(
            patch.apply(&mut small, PatchSide::Before),
            Err(EditError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn history_prunes_oldest_by_count() {
        let mut history = PatchHistory::new(2);
        let base = solid(4, 4, [0, 0, 0, 255]);
        let mut pruned = 0;
        for i in 0..4u8 {
            let mut next = base.clone();
            next.put_pixel(i as u32, 0, Rgba([i + 1, 0, 0, 255]));
            pruned += history.push(PixelPatch::diff(&base, &next).unwrap().unwrap());
        }
        assert_eq!(pruned, 2);
        assert_eq!(history.undo_count(), 2);
        assert_eq!(history.memory_usage(), 2 * 2 * 4);
    }

    #[test]
    fn push_clears_redo() {
        let mut history = PatchHistory::new(10);
        let a = solid(2, 2, [0, 0, 0, 255]);
        let mut b = a.clone();
        b.put_pixel(0, 0, Rgba([1, 0, 0, 255]));
        history.push(PixelPatch::diff(&a, &b).unwrap().unwrap());

        let mut canvas = b.clone();
        assert!(history.undo(&mut canvas).unwrap());
        assert_eq!(canvas, a);
        assert!(history.can_redo());

        history.push(PixelPatch::diff(&a, &b).unwrap().unwrap());
        assert!(!history.can_redo());
        assert_eq!(history.redo_count(), 0);
    }
}
