//! Retention-managed artifact storage
//!
//! Backup outputs and pipeline stage logs are persisted under
//! `<root>/<category>/<stamp>-<label>`, where the stamp is the artifact's
//! creation time. Each category carries an age-based [`RetentionPolicy`].
//!
//! # Invariants
//!
//! - Creation times never go backwards inside a category; a write that would
//!   predate the newest artifact is clamped forward.
//! - Pruning never removes the newest artifact of a category, so an
//!   interrupted schedule can never leave a category without a backup.
//! - Writes land in a hidden partial file and are renamed into place, so a
//!   listing never observes half-written artifacts.

pub mod retention;
pub mod store;

pub use retention::{plan_prune, PrunePlan, RetentionPolicy};
pub use store::{Artifact, ArtifactStore};
