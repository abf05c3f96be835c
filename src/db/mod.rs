//! SQLite persistence behind a single actor.
//!
//! All store access goes through [`DbHandle`]; every mutation is one atomic
//! statement so concurrent workers never observe partial writes.

mod actor;
mod categories;
mod clusters;
mod jobs;
mod mentions;
pub mod models;
mod patch;
pub mod schema;

mod posts;

pub use actor::{AuditEntry, DbHandle, NewMention, TrendPoint, spawn};
pub use models::{
    CategoryRow, ClusterRow, JobRow, MentionRow, PostEmbeddingRow, PostRow, QueueCounts,
};
pub use patch::PostPatch;
