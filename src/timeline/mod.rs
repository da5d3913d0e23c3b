//! The merged timeline: merge, snapshot extraction and the lookup index.

pub mod extract;
pub mod index;
pub mod merge;

pub use extract::{SnapshotContent, SnapshotRequest, extract};
pub use index::TimelineIndex;
pub use merge::{DecodedShard, DuplicateOperation, MergeOutcome, merge};
