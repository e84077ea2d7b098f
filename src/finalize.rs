// ============================================================================
// FINALIZE JOB — full-resolution replay on a worker thread
// ============================================================================
//
// The job works on snapshots (original + command list), never on live
// sessions, so the manager's buffers are untouched whatever the outcome.
// Results go back over a channel; the caller decides whether to adopt them.
// ============================================================================

use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc,
};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{EditError, Result};
use crate::ops::{TransformOptions, transform};
use crate::session::SessionSnapshot;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("finalize worker panicked")]
    Panicked,

    #[error("finalize job was cancelled")]
    Cancelled,

    #[error("finalize worker disconnected")]
    Disconnected,
}

// ============================================================================
// ADVISORY LOCKS
// ============================================================================

/// Set of image ids a finalize job is currently reading. Shared between the
/// manager (which refuses edits on busy ids) and running jobs.
#[derive(Clone, Default, Debug)]
pub struct ImageLocks {
    busy: Arc<Mutex<HashSet<String>>>,
}

impl ImageLocks {
    pub fn is_busy(&self, id: &str) -> bool {
        self.busy.lock().contains(id)
    }

    /// Lock every id or none of them.
    pub fn try_acquire<I, S>(&self, ids: I) -> Result<LockGuard>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let mut busy = self.busy.lock();
        if let Some(taken) = ids.iter().find(|id| busy.contains(*id)) {
            return Err(EditError::ImageBusy(taken.clone()));
        }
        busy.extend(ids.iter().cloned());
        Ok(LockGuard {
            locks: self.clone(),
            ids,
        })
    }
}

/// Releases its ids when dropped.
#[derive(Debug)]
pub struct LockGuard {
    locks: ImageLocks,
    ids: Vec<String>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut busy = self.locks.busy.lock();
        for id in &self.ids {
            busy.remove(id);
        }
    }
}

// ============================================================================
// JOB MESSAGES / HANDLE
// ============================================================================

/// Finished images, in the order the sessions were snapshotted.
#[derive(Clone, Debug, Default)]
pub struct FinalizeOutput {
    pub images: Vec<(String, RgbaImage)>,
    /// Files written when an export directory was requested.
    pub exported: Vec<PathBuf>,
}

#[derive(Debug)]
pub enum JobMessage {
    /// Percentage in 0..=100, never decreasing.
    Progress(u8),
    Completed(FinalizeOutput),
    Failed(JobError),
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct FinalizeOptions {
    pub transform: TransformOptions,
    pub crop_padding: u32,
    /// Write each result as `<id>.png` into this directory.
    pub export_dir: Option<PathBuf>,
}

/// Handle to a running finalize job.
pub struct FinalizeJob {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    receiver: mpsc::Receiver<JobMessage>,
}

impl FinalizeJob {
    /// Spawn the job on the rayon pool. `guard` holds the advisory locks of
    /// every snapshotted image and is released before the final message.
    pub fn spawn(
        snapshots: Vec<SessionSnapshot>,
        options: FinalizeOptions,
        cancel: Arc<AtomicBool>,
        guard: LockGuard,
    ) -> Self {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel();
        let worker_cancel = Arc::clone(&cancel);
        log::info!("finalize job {} started for {} image(s)", id, snapshots.len());

        rayon::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                run(&snapshots, &options, &worker_cancel, &sender)
            }));
            drop(guard);

            let message = match result {
                Ok(Ok(output)) => {
                    let _ = sender.send(JobMessage::Progress(100));
                    log::info!("finalize job {} completed", id);
                    JobMessage::Completed(output)
                }
                Ok(Err(JobError::Cancelled)) => {
                    log::info!("finalize job {} cancelled", id);
                    JobMessage::Cancelled
                }
                Ok(Err(e)) => {
                    log::error!("finalize job {} failed: {}", id, e);
                    JobMessage::Failed(e)
                }
                Err(_panic) => {
                    log::error!("finalize job {} panicked", id);
                    JobMessage::Failed(JobError::Panicked)
                }
            };
            let _ = sender.send(message);
        });

        Self {
            id,
            cancel,
            receiver,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the worker to stop. It checks between images.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Non-blocking poll, for callers that drive their own event loop.
    pub fn try_recv(&self) -> Option<JobMessage> {
        self.receiver.try_recv().ok()
    }

    /// Block until the job ends, forwarding progress to `on_progress`.
    pub fn wait_with_progress(self, mut on_progress: impl FnMut(u8)) -> std::result::Result<FinalizeOutput, JobError> {
        loop {
            match self.receiver.recv() {
                Ok(JobMessage::Progress(p)) => on_progress(p),
                Ok(JobMessage::Completed(output)) => return Ok(output),
                Ok(JobMessage::Failed(e)) => return Err(e),
                Ok(JobMessage::Cancelled) => return Err(JobError::Cancelled),
                Err(_) => return Err(JobError::Disconnected),
            }
        }
    }

    pub fn wait(self) -> std::result::Result<FinalizeOutput, JobError> {
        self.wait_with_progress(|_| {})
    }
}

// ============================================================================
// WORKER
// ============================================================================

fn run(
    snapshots: &[SessionSnapshot],
    options: &FinalizeOptions,
    cancel: &AtomicBool,
    sender: &mpsc::Sender<JobMessage>,
) -> std::result::Result<FinalizeOutput, JobError> {
    let total = snapshots.len();
    let mut output = FinalizeOutput::default();
    let mut last_progress = 0u8;

    for (i, snapshot) in snapshots.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(JobError::Cancelled);
        }
        let progress = (i * 100 / total) as u8;
        if progress > last_progress || i == 0 {
            last_progress = progress;
            let _ = sender.send(JobMessage::Progress(progress));
        }

        let full = snapshot.replay(&options.transform)?;
        let cropped = transform::crop_to_tight_bounds(&full, options.crop_padding);
        log::debug!(
            "finalized '{}' at {}x{}",
            snapshot.id,
            cropped.width(),
            cropped.height()
        );
        output.images.push((snapshot.id.clone(), cropped));
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(JobError::Cancelled);
    }
    if let Some(dir) = &options.export_dir {
        output.exported = export_png(dir, &output.images)?;
    }
    Ok(output)
}

/// File name for an id: path separators and other awkward characters are
/// replaced so ids cannot escape `dir`.
fn file_name_for(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    format!("{}.png", safe.trim_start_matches('.'))
}

fn export_png(dir: &Path, images: &[(String, RgbaImage)]) -> std::result::Result<Vec<PathBuf>, JobError> {
    std::fs::create_dir_all(dir).map_err(|source| JobError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::with_capacity(images.len());
    for (id, image) in images {
        let path = dir.join(file_name_for(id));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|source| match source {
                image::ImageError::IoError(source) => JobError::Io {
                    path: path.clone(),
                    source,
                },
                source => JobError::Encode {
                    path: path.clone(),
                    source,
                },
            })?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_are_all_or_nothing() {
        let locks = ImageLocks::default();
        let guard = locks.try_acquire(["a", "b"]).unwrap();
        assert!(locks.is_busy("a"));
        assert!(matches!(
            locks.try_acquire(["c", "b"]),
            Err(EditError::ImageBusy(id)) if id == "b"
        ));
        assert!(!locks.is_busy("c"));
        drop(guard);
        assert!(!locks.is_busy("a") && !locks.is_busy("b"));
    }

    #[test]
    fn export_names_stay_inside_directory() {
        assert_eq!(file_name_for("cat_object_0"), "cat_object_0.png");
        assert_eq!(file_name_for("../evil/x"), "_evil_x.png");
    }
}
