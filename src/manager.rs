// ============================================================================
// EDIT SESSION MANAGER — one session per image id, stage pipeline, finalize
// ============================================================================

use image::RgbaImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, atomic::AtomicBool};

use crate::components::history::PatchHistory;
use crate::coords::{Point, Size};
use crate::error::{EditError, Result};
use crate::finalize::{FinalizeJob, FinalizeOptions, ImageLocks};
use crate::ops::Edit;
use crate::ops::transform::{self, BoundingBox};
use crate::session::{EditOutcome, ImageSession};
use crate::settings::EngineSettings;

/// Pipeline step the current sessions belong to. Each stage starts fresh
/// from the previous stage's finalized output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    /// Brush masking and point annotation on extracted objects.
    #[default]
    Mask,
    Enhance,
    Style,
    Resize,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Mask => Stage::Enhance,
            Stage::Enhance => Stage::Style,
            Stage::Style => Stage::Resize,
            Stage::Resize | Stage::Done => Stage::Done,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Mask => "Mask",
            Stage::Enhance => "Enhance",
            Stage::Style => "Style",
            Stage::Resize => "Resize",
            Stage::Done => "Done",
        }
    }
}

/// Where a session's original pixels come from.
pub enum ImageSource<'a> {
    Buffer(RgbaImage),
    Path(&'a Path),
}

impl ImageSource<'_> {
    fn load(self) -> Result<RgbaImage> {
        match self {
            ImageSource::Buffer(img) => Ok(img),
            ImageSource::Path(path) => Ok(image::open(path)?.to_rgba8()),
        }
    }
}

/// Owns every image session of the current stage.
pub struct EditManager {
    sessions: HashMap<String, ImageSession>,
    /// Registration order, so finalize output is stable.
    order: Vec<String>,
    settings: EngineSettings,
    locks: ImageLocks,
    stage: Stage,
}

impl Default for EditManager {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl EditManager {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            settings,
            locks: ImageLocks::default(),
            stage: Stage::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn image_ids(&self) -> &[String] {
        &self.order
    }

    pub fn locks(&self) -> &ImageLocks {
        &self.locks
    }

    fn new_history(&self) -> PatchHistory {
        PatchHistory::new(self.settings.max_undo_steps)
            .with_memory_limit(self.settings.max_history_bytes())
    }

    fn session(&self, id: &str) -> Result<&ImageSession> {
        self.sessions
            .get(id)
            .ok_or_else(|| EditError::UnknownImage(id.to_string()))
    }

    fn ensure_idle(&self, id: &str) -> Result<()> {
        if self.locks.is_busy(id) {
            return Err(EditError::ImageBusy(id.to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // SESSION LIFECYCLE
    // ========================================================================

    /// Create (or rebuild) the session for `id`. With a display size the
    /// working buffer is the original fit inside it; otherwise it is the
    /// original itself. Any previous history for `id` is discarded.
    pub fn register_image(
        &mut self,
        id: &str,
        source: ImageSource<'_>,
        display: Option<Size>,
    ) -> Result<()> {
        self.ensure_idle(id)?;
        let original = source.load()?;
        let session = ImageSession::new(
            id,
            original,
            display,
            self.new_history(),
            &self.settings.transform_options(),
        )?;
        if self.sessions.insert(id.to_string(), session).is_none() {
            self.order.push(id.to_string());
        } else {
            log::info!("rebuilt session '{}'", id);
        }
        Ok(())
    }

    /// Drop a session and its history. Returns whether it existed.
    pub fn remove_image(&mut self, id: &str) -> Result<bool> {
        self.ensure_idle(id)?;
        self.order.retain(|o| o != id);
        Ok(self.sessions.remove(id).is_some())
    }

    /// Crop each detector box out of `image` and register the crops as
    /// `<stem>_object_<n>`. Duplicate boxes and boxes that clamp to nothing
    /// are skipped. Returns the registered ids.
    pub fn seed_from_detections(
        &mut self,
        stem: &str,
        image: &RgbaImage,
        boxes: &[BoundingBox],
        display: Option<Size>,
    ) -> Result<Vec<String>> {
        let mut seen: Vec<BoundingBox> = Vec::new();
        let mut ids = Vec::new();
        for bbox in boxes {
            if seen.contains(bbox) {
                continue;
            }
            let n = seen.len();
            seen.push(*bbox);
            let Some(crop) = transform::crop_box(image, *bbox) else {
                log::warn!("detection {:?} lies outside '{}'", bbox, stem);
                continue;
            };
            let id = format!("{}_object_{}", stem, n);
            self.register_image(&id, ImageSource::Buffer(crop), display)?;
            ids.push(id);
        }
        Ok(ids)
    }

    // ========================================================================
    // EDITING
    // ========================================================================

    pub fn apply_edit(&mut self, id: &str, edit: Edit) -> Result<EditOutcome> {
        self.ensure_idle(id)?;
        let opts = self.settings.transform_options();
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EditError::UnknownImage(id.to_string()))?;
        session.apply(edit, &opts)
    }

    /// The working buffer, for display.
    pub fn current(&self, id: &str) -> Result<&RgbaImage> {
        Ok(self.session(id)?.cached())
    }

    pub fn can_undo(&self, id: &str) -> Result<bool> {
        Ok(self.session(id)?.history().can_undo())
    }

    pub fn can_redo(&self, id: &str) -> Result<bool> {
        Ok(self.session(id)?.history().can_redo())
    }

    pub fn undo_count(&self, id: &str) -> Result<usize> {
        Ok(self.session(id)?.history().undo_count())
    }

    pub fn redo_count(&self, id: &str) -> Result<usize> {
        Ok(self.session(id)?.history().redo_count())
    }

    /// Bytes held by the patch stacks of `id`.
    pub fn history_memory(&self, id: &str) -> Result<usize> {
        Ok(self.session(id)?.history().memory_usage())
    }

    /// Replayable edits of `id`, most recent first.
    pub fn undo_history(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.session(id)?.undo_history())
    }

    pub fn original_size(&self, id: &str) -> Result<Size> {
        Ok(self.session(id)?.original_size())
    }

    pub fn working_size(&self, id: &str) -> Result<Size> {
        Ok(self.session(id)?.working_size())
    }

    /// Point annotations of every session, mapped from `display` into
    /// original space, for the segmentation step. Every session has an
    /// entry; one without annotations maps to empty vectors.
    pub fn collect_annotation_points(
        &self,
        display: Size,
    ) -> Result<HashMap<String, (Vec<Point>, Vec<u8>)>> {
        let mut out = HashMap::new();
        for id in &self.order {
            out.insert(id.clone(), self.session(id)?.annotation_points(display)?);
        }
        Ok(out)
    }

    // ========================================================================
    // FINALIZE / STAGES
    // ========================================================================

    /// Start a background finalize of every session. The images stay locked
    /// against edits until the job ends. `cancel` may be shared with other
    /// code; setting it stops the job before the next image.
    pub fn start_finalize(
        &self,
        export_dir: Option<PathBuf>,
        cancel: Arc<AtomicBool>,
    ) -> Result<FinalizeJob> {
        let guard = self.locks.try_acquire(self.order.iter().cloned())?;
        let mut snapshots = Vec::with_capacity(self.order.len());
        for id in &self.order {
            snapshots.push(self.session(id)?.snapshot());
        }
        let options = FinalizeOptions {
            transform: self.settings.transform_options(),
            crop_padding: self.settings.crop_padding,
            export_dir,
        };
        Ok(FinalizeJob::spawn(snapshots, options, cancel, guard))
    }

    /// Move to the next stage: every session and its history is dropped and
    /// `results` become the new originals.
    pub fn advance(&mut self, results: Vec<(String, RgbaImage)>) -> Result<Stage> {
        if let Some(busy) = self.order.iter().find(|id| self.locks.is_busy(id)) {
            return Err(EditError::ImageBusy(busy.clone()));
        }
        let next = self.stage.next();
        let display = self.settings.display_size();

        // Build the next stage fully before dropping the current one.
        let mut staged = EditManager::new(self.settings.clone());
        staged.locks = self.locks.clone();
        staged.stage = next;
        if next != Stage::Done {
            for (id, image) in results {
                staged.register_image(&id, ImageSource::Buffer(image), Some(display))?;
            }
        }
        log::info!(
            "stage {} -> {} with {} image(s)",
            self.stage.label(),
            next.label(),
            staged.order.len()
        );
        *self = staged;
        Ok(next)
    }
}
