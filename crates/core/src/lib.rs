//! Core types for the task-manager assistant
//!
//! Foundational types shared by every other crate:
//! - The unified [`Error`] sum type
//! - Conversation turns and transcript formatting
//! - Domain entities and their joined snapshots
//! - Retrieval records and citations
//! - A TTL cache primitive for the process-local caches

pub mod cache;
pub mod conversation;
pub mod domain;
pub mod error;
pub mod retrieval;

pub use cache::{CacheStats, TtlCache};
pub use conversation::{format_transcript, Turn, TurnRole};
pub use domain::{
    EntityKind, Project, ProjectSnapshot, Task, TaskSnapshot, TaskStatus, Team, TeamSnapshot,
    User, UserRole, UserSnapshot,
};
pub use error::{Error, Result};
pub use retrieval::{RetrievedDoc, ScoreKind, SourceCitation};
