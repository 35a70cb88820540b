//! Vector index maintenance
//!
//! The document transformer turns entity snapshots into searchable text
//! and filterable metadata; the indexer keeps the vector store in sync
//! with the relational entities, one deterministic point per (kind, id).

pub mod indexer;
pub mod transformer;

pub use indexer::{point_id, IndexStats, Indexer};
pub use transformer::{
    sanitize, transform_project, transform_task, transform_team, transform_user, EntityDocument,
};
