//! Merge-conflict resolution
//!
//! - `ConflictResolutionEngine` - Tracks the in-progress operation and drives continue/abort/skip
//! - `markers` - Scans and rewrites git's conflict-marker blocks
//! - `types` - The merge state model

mod engine;
pub mod markers;
mod types;

pub use engine::*;
pub use markers::{apply_resolution, has_conflict_markers, parse_conflict_sections};
pub use types::*;
