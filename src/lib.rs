//! CutoutFE edit engine: per-image undo/redo over minimal pixel patches and a
//! replayable command log, with a background full-resolution finalize step.

pub mod cli;
pub mod components;
pub mod coords;
pub mod error;
pub mod finalize;
pub mod logger;
pub mod manager;
pub mod ops;
pub mod session;
pub mod settings;

pub use coords::{Point, Size};
pub use error::{EditError, Result};
pub use finalize::{FinalizeJob, FinalizeOutput, JobError, JobMessage};
pub use manager::{EditManager, ImageSource, Stage};
pub use ops::Edit;
pub use session::EditOutcome;
pub use settings::EngineSettings;
