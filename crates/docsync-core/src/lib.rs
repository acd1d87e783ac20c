//! docsync core library: keeps a generated documentation corpus in step
//! with an evolving source tree.
//!
//! The crate tracks symbols and their dependencies, propagates the impact of
//! file changes onto the artifacts that describe them, scores the risk of a
//! change set, picks an update strategy with an adaptive threshold, schedules
//! the resulting operations as dependency-ordered parallel batches, and
//! reconciles regenerated content with hand edits through a Myers diff and
//! three-way merge. With the `python` feature it builds as the `_docsync_core`
//! extension module.

pub mod config;
pub mod diff;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod ports;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod sync;

#[cfg(feature = "python")]
mod python;

pub use config::EngineConfig;
pub use errors::{SyncError, SyncResult};
pub use sync::{CycleReport, SyncContext, SyncEngine};
