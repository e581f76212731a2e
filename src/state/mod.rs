//! State module for tracking crawl progress
//!
//! This module provides the types that describe one unit of crawl work and the
//! in-memory buffer that accumulates finished work between checkpoints.
//!
//! # Components
//!
//! - `ItemState`: Lifecycle of the record currently being processed
//! - `Outcome` / `ArtifactFlags`: Terminal classification of a record
//! - `WorkItem`: One finished record, tagged with its index
//! - `Checkpoint`: Records finished since the last flush

mod item_state;
mod work_item;

// Re-export main types
pub use item_state::ItemState;
pub use work_item::{ArtifactFlags, ArtifactKind, Checkpoint, Outcome, WorkItem};
