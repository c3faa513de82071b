#![forbid(unsafe_code)]

pub mod conflict;
pub mod diff;
pub mod ids;
pub mod merge;
pub mod overlap;

pub use conflict::{ConflictAnalysis, ConflictContext, EditOutcome};
pub use diff::{ChangeKind, ChangeOp, extract_changes, split_lines};
pub use ids::AgentId;
pub use merge::{ConflictType, classify_and_merge, three_way_merge};
pub use overlap::{OverlapRegion, find_overlaps, ranges_overlap};
