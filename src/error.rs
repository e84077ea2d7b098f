// ============================================================================
// ERRORS — failure taxonomy for the edit engine
// ============================================================================
//
// Every variant aborts only the requested operation. Session state (cached
// buffer, patch stacks, command log) is left exactly as before the call.
// "No change" is not an error; see `EditOutcome::changed`.
// ============================================================================

use thiserror::Error;

use crate::components::history::BBox;

#[derive(Debug, Error)]
pub enum EditError {
    /// The image id was never registered (or was discarded by a stage change).
    #[error("unknown image '{0}'")]
    UnknownImage(String),

    /// A zero-sized dimension reached coordinate or resize math.
    #[error("invalid dimension {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    /// A patch rectangle does not fit the buffer it is applied to.
    /// Only reachable through an internal invariant violation.
    #[error("patch {bbox:?} exceeds {width}x{height} buffer")]
    OutOfBounds { bbox: BBox, width: u32, height: u32 },

    /// Two buffers that must share a shape do not.
    #[error("buffer shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A finalize job currently holds the advisory lock for this image.
    #[error("image '{0}' is locked by a running finalize job")]
    ImageBusy(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

pub type Result<T, E = EditError> = std::result::Result<T, E>;
