pub mod changes;
pub mod pipeline;
pub mod updater;

pub use changes::{detect_file_changes, DetectedChanges};
pub use pipeline::{CycleReport, SyncContext, SyncEngine};
pub use updater::{ArtifactConflict, ArtifactOutcome, ArtifactUpdater};
