use image::{RgbaImage, imageops};
use std::sync::Arc;

use crate::components::command_log::{CommandEntry, CommandLog};
use crate::components::history::{PatchHistory, PixelPatch};
use crate::coords::{self, Point, Size};
use crate::error::Result;
use crate::ops::{self, Edit, PixelOp, TransformOptions};

/// Result of one `apply_edit` call.
#[derive(Clone, Debug)]
pub struct EditOutcome {
    /// The working buffer after the edit.
    pub image: RgbaImage,
    /// `false` when the edit left the buffer byte-identical (nothing was
    /// recorded for a pixel edit; undo/redo had nothing to move).
    pub changed: bool,
}

/// Edit state of one working image.
pub struct ImageSession {
    pub id: String,
    /// Full-resolution source. Never mutated; shared with finalize snapshots.
    original: Arc<RgbaImage>,
    /// Resolution of `cached`.
    working_size: Size,
    cached: RgbaImage,
    history: PatchHistory,
    log: CommandLog,
}

impl ImageSession {
    /// Build a session, fitting the working buffer into `display` when given.
    pub fn new(
        id: impl Into<String>,
        original: RgbaImage,
        display: Option<Size>,
        history: PatchHistory,
        opts: &TransformOptions,
    ) -> Result<Self> {
        let original_size = Size::of(&original).validate()?;
        let cached = match display {
            Some(target) => ops::transform::resize_to_fit(&original, target, opts.filter)?,
            None => original.clone(),
        };
        let id = id.into();
        log::debug!(
            "session '{}': original {}, working {}",
            id,
            original_size,
            Size::of(&cached)
        );
        Ok(Self {
            id,
            original: Arc::new(original),
            working_size: Size::of(&cached),
            cached,
            history,
            log: CommandLog::new(),
        })
    }

    pub fn original(&self) -> &Arc<RgbaImage> {
        &self.original
    }

    pub fn original_size(&self) -> Size {
        Size::of(&self.original)
    }

    pub fn working_size(&self) -> Size {
        self.working_size
    }

    pub fn cached(&self) -> &RgbaImage {
        &self.cached
    }

    pub fn history(&self) -> &PatchHistory {
        &self.history
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// The original, resized to exactly the working resolution.
    fn working_base(&self, opts: &TransformOptions) -> RgbaImage {
        let Size { width, height } = self.working_size;
        if self.original_size() == self.working_size {
            return (*self.original).clone();
        }
        imageops::resize(&*self.original, width, height, opts.filter.to_filter())
    }

    fn outcome(&self, changed: bool) -> EditOutcome {
        EditOutcome {
            image: self.cached.clone(),
            changed,
        }
    }

    /// Dispatch one edit on its category. Every fallible step runs before
    /// the session is touched, so an error leaves it as it was.
    pub fn apply(&mut self, edit: Edit, opts: &TransformOptions) -> Result<EditOutcome> {
        match edit {
            Edit::Pixel(op) => self.apply_pixel(op),
            Edit::WholeImage(op) => {
                let next = op.apply(&self.working_base(opts));
                let entry = CommandEntry::WholeImage(op);
                Ok(self.replace_base(entry, next))
            }
            Edit::Assert(op) => {
                let next = op.apply(&self.original, opts);
                let entry = CommandEntry::Assert(op);
                self.working_size = Size::of(&next);
                Ok(self.replace_base(entry, next))
            }
            Edit::Undo => {
                let moved = self.history.undo(&mut self.cached)?;
                if moved {
                    self.log.undo();
                }
                Ok(self.outcome(moved))
            }
            Edit::Redo => {
                let moved = self.history.redo(&mut self.cached)?;
                if moved {
                    self.log.redo();
                }
                Ok(self.outcome(moved))
            }
        }
    }

    fn apply_pixel(&mut self, op: PixelOp) -> Result<EditOutcome> {
        let next = op.apply(&self.cached);
        let Some(patch) = PixelPatch::diff(&self.cached, &next)? else {
            return Ok(self.outcome(false));
        };
        log::debug!(
            "'{}': {} changed {}x{} at ({}, {})",
            self.id,
            op.description(),
            patch.bbox.width(),
            patch.bbox.height(),
            patch.bbox.x1,
            patch.bbox.y1
        );
        let pruned = self.history.push(patch);
        self.log.push_pixel(op, self.working_size);
        self.log.commit_oldest(pruned);
        self.cached = next;
        Ok(self.outcome(true))
    }

    /// Whole-image and assert edits invalidate every earlier edit: later
    /// patches would be diffs against a buffer that no longer exists.
    /// Only assert edits change the working size; the caller sets it.
    fn replace_base(&mut self, entry: CommandEntry, next: RgbaImage) -> EditOutcome {
        log::debug!("'{}': {} replaces history", self.id, entry.description());
        let changed = next != self.cached;
        self.history.clear();
        self.log.replace(entry);
        self.cached = next;
        self.outcome(changed)
    }

    /// Point annotations in replay order, mapped from `display` into
    /// original space. Labels: `1` object, `0` background.
    pub fn annotation_points(&self, display: Size) -> Result<(Vec<Point>, Vec<u8>)> {
        let original = self.original_size();
        let mut points = Vec::new();
        let mut labels = Vec::new();
        for (op, _) in self.log.pixel_entries() {
            if let PixelOp::Annotate(a) = op {
                points.push(coords::to_original(a.point, display, original)?);
                labels.push(a.label.class());
            }
        }
        Ok((points, labels))
    }

    /// Descriptions of the replayable entries, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.log
            .entries()
            .iter()
            .rev()
            .map(CommandEntry::description)
            .collect()
    }

    /// Immutable copy of what finalize needs to replay this session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            original: Arc::clone(&self.original),
            entries: self.log.entries().to_vec(),
        }
    }
}

// ============================================================================
// SNAPSHOT REPLAY
// ============================================================================

#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub id: String,
    pub original: Arc<RgbaImage>,
    pub entries: Vec<CommandEntry>,
}

impl SessionSnapshot {
    /// Recompute the session at full resolution: the base entry runs on the
    /// original, then pixel entries are remapped from the canvas they were
    /// drawn on to the full-resolution buffer and applied in order.
    pub fn replay(&self, opts: &TransformOptions) -> Result<RgbaImage> {
        let mut image = (*self.original).clone();
        for entry in &self.entries {
            image = match entry {
                CommandEntry::WholeImage(op) => op.apply(&image),
                CommandEntry::Assert(op) => op.apply(&image, opts),
                CommandEntry::Pixel { op, canvas } => {
                    let full = Size::of(&image);
                    if *canvas == full {
                        op.apply(&image)
                    } else {
                        op.rescaled(*canvas, full)?.apply(&image)
                    }
                }
            };
        }
        Ok(image)
    }
}
