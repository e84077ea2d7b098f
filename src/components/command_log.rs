use crate::coords::Size;
use crate::ops::{AssertOp, EditCategory, PixelOp, WholeImageOp};

// ============================================================================
// COMMAND ENTRY
// ============================================================================

/// One applied edit, kept so the edit can be replayed at full resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandEntry {
    /// Pixel-level edit plus the size of the canvas it was drawn on, so its
    /// coordinates can be mapped onto any other resolution later.
    Pixel { op: PixelOp, canvas: Size },
    WholeImage(WholeImageOp),
    Assert(AssertOp),
}

impl CommandEntry {
    pub fn category(&self) -> EditCategory {
        match self {
            CommandEntry::Pixel { .. } => EditCategory::PixelLevel,
            CommandEntry::WholeImage(_) => EditCategory::WholeImage,
            CommandEntry::Assert(_) => EditCategory::AssertLevel,
        }
    }

    pub fn description(&self) -> String {
        match self {
            CommandEntry::Pixel { op, .. } => op.description(),
            CommandEntry::WholeImage(op) => op.description(),
            CommandEntry::Assert(op) => op.description(),
        }
    }
}

// ============================================================================
// COMMAND LOG
// ============================================================================

/// Replayable edit list for one image.
///
/// Layout of `undo`: at most one whole-image/assert entry, always first,
/// followed by pixel entries in application order. The newest `undoable`
/// pixel entries pair one-to-one with the patch undo stack; older pixel
/// entries whose patches were pruned stay in the list as committed history.
#[derive(Default, Debug, Clone)]
pub struct CommandLog {
    undo: Vec<CommandEntry>,
    redo: Vec<CommandEntry>,
    undoable: usize,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pixel-level edit and drop the redo branch.
    pub fn push_pixel(&mut self, op: PixelOp, canvas: Size) {
        self.undo.push(CommandEntry::Pixel { op, canvas });
        self.undoable += 1;
        self.redo.clear();
    }

    /// Whole-image and assert edits always recompute from the original, so
    /// only the newest one matters: it replaces the whole list.
    pub fn replace(&mut self, entry: CommandEntry) {
        debug_assert!(entry.category() != EditCategory::PixelLevel);
        self.undo.clear();
        self.undo.push(entry);
        self.redo.clear();
        self.undoable = 0;
    }

    /// Move the newest undoable pixel entry to the redo side.
    /// Returns `false` (and does nothing) when there is none.
    pub fn undo(&mut self) -> bool {
        if self.undoable == 0 {
            return false;
        }
        match self.undo.pop() {
            Some(entry) => {
                self.redo.push(entry);
                self.undoable -= 1;
                true
            }
            None => false,
        }
    }

    /// Move the newest redo entry back to the undo side.
    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(entry) => {
                self.undo.push(entry);
                self.undoable += 1;
                true
            }
            None => false,
        }
    }

    /// The oldest `count` undoable entries lost their patches; keep them for
    /// replay but stop offering them for undo.
    pub fn commit_oldest(&mut self, count: usize) {
        self.undoable = self.undoable.saturating_sub(count);
    }

    /// Entries in replay order.
    pub fn entries(&self) -> &[CommandEntry] {
        &self.undo
    }

    /// Redo-side entries, newest last.
    pub fn redo_entries(&self) -> &[CommandEntry] {
        &self.redo
    }

    /// Number of pixel entries that can still be undone.
    pub fn undoable_count(&self) -> usize {
        self.undoable
    }

    /// Pixel entries in replay order (committed and undoable).
    pub fn pixel_entries(&self) -> impl Iterator<Item = (&PixelOp, Size)> {
        self.undo.iter().filter_map(|e| match e {
            CommandEntry::Pixel { op, canvas } => Some((op, *canvas)),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Point;
    use crate::ops::{Enhancements, PointAnnotation, PointLabel};

    fn dot(x: i32) -> PixelOp {
        PixelOp::Annotate(PointAnnotation {
            point: Point::new(x, 0),
            label: PointLabel::Object,
        })
    }

    fn saturation(v: i32) -> CommandEntry {
        CommandEntry::WholeImage(WholeImageOp::Enhance(Enhancements {
            saturation: v,
            ..Default::default()
        }))
    }

    const CANVAS: Size = Size::new(10, 10);

    #[test]
    fn pixel_entries_append_and_undo_redo() {
        let mut log = CommandLog::new();
        log.push_pixel(dot(1), CANVAS);
        log.push_pixel(dot(2), CANVAS);
        assert_eq!(log.undoable_count(), 2);

        assert!(log.undo());
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.redo_entries().len(), 1);

        assert!(log.redo());
        assert_eq!(log.entries().len(), 2);
        assert!(log.redo_entries().is_empty());
        assert!(!log.redo());
    }

    #[test]
    fn new_pixel_entry_drops_redo_branch() {
        let mut log = CommandLog::new();
        log.push_pixel(dot(1), CANVAS);
        log.undo();
        log.push_pixel(dot(3), CANVAS);
        assert!(log.redo_entries().is_empty());
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn whole_image_entries_replace_the_list() {
        let mut log = CommandLog::new();
        log.push_pixel(dot(1), CANVAS);
        log.replace(saturation(50));
        log.replace(saturation(80));
        assert_eq!(log.entries(), &[saturation(80)]);
        assert_eq!(log.undoable_count(), 0);
        // Nothing pixel-level to undo: the base entry stays put.
        assert!(!log.undo());
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn whole_image_entry_survives_pixel_undo() {
        let mut log = CommandLog::new();
        log.replace(saturation(10));
        log.push_pixel(dot(1), CANVAS);
        assert!(log.undo());
        assert!(!log.undo());
        assert_eq!(log.entries(), &[saturation(10)]);
    }

    #[test]
    fn committed_entries_stay_for_replay() {
        let mut log = CommandLog::new();
        for x in 0..3 {
            log.push_pixel(dot(x), CANVAS);
        }
        log.commit_oldest(2);
        assert_eq!(log.undoable_count(), 1);
        assert!(log.undo());
        assert!(!log.undo());
        assert_eq!(log.pixel_entries().count(), 2);
    }
}
