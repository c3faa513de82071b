#![forbid(unsafe_code)]

mod error;
mod requests;
mod store;
mod types;

pub use error::StoreError;
pub use requests::{
    CreateNodeRequest, EditNodeRequest, EditStrategy, ResolveRequest, Resolution,
};
pub use store::SqliteStore;
pub use types::{
    AgentStatus, AgentSummary, DbHealth, DryRunReport, EditHistoryEntry, HistoryEntry, NodeKind,
    NodeRecord, PendingReadStatus, RecentEdit, SearchHit, StoredConflict,
};
