//! Indexer
//!
//! Keeps the vector store in sync with the relational entities. One
//! document per (kind, id) pair, addressed by a deterministic point id, so
//! repeated indexing overwrites instead of duplicating. Per-entity errors
//! during a full sync are collected rather than propagated.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};

use task_agent_config::constants::resolver;
use task_agent_core::{EntityKind, Error, Result};
use task_agent_entities::EntityGateway;
use task_agent_rag::{EmbeddingClient, VectorStore};

use crate::transformer::{
    transform_project, transform_task, transform_team, transform_user, EntityDocument,
};

/// Outcome of a full sync
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub users_indexed: usize,
    pub teams_indexed: usize,
    pub projects_indexed: usize,
    pub tasks_indexed: usize,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

/// Deterministic non-negative 32-bit point id for a (kind, id) pair.
pub fn point_id(kind: EntityKind, id: &str) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"-");
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) & 0x7FFF_FFFF
}

/// Vector store synchroniser
pub struct Indexer {
    gateway: EntityGateway,
    embeddings: Arc<EmbeddingClient>,
    store: Arc<VectorStore>,
}

impl Indexer {
    pub fn new(
        gateway: EntityGateway,
        embeddings: Arc<EmbeddingClient>,
        store: Arc<VectorStore>,
    ) -> Self {
        Self {
            gateway,
            embeddings,
            store,
        }
    }

    /// Index one user. An absent entity is logged and skipped.
    pub async fn index_user(&self, id: &str) -> Result<()> {
        match self.gateway.users.find_one(id).await {
            Ok(snapshot) => {
                let doc = transform_user(&snapshot);
                self.upsert_document(EntityKind::User, id, doc).await
            }
            Err(Error::NotFound { .. }) => {
                tracing::info!(id, "user vanished before indexing, skipping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Index one team.
    pub async fn index_team(&self, id: &str) -> Result<()> {
        match self.gateway.teams.find_one(id).await {
            Ok(snapshot) => {
                let doc = transform_team(&snapshot);
                self.upsert_document(EntityKind::Team, id, doc).await
            }
            Err(Error::NotFound { .. }) => {
                tracing::info!(id, "team vanished before indexing, skipping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Index one project.
    pub async fn index_project(&self, id: &str) -> Result<()> {
        match self.gateway.projects.find_one(id).await {
            Ok(snapshot) => {
                let doc = transform_project(&snapshot);
                self.upsert_document(EntityKind::Project, id, doc).await
            }
            Err(Error::NotFound { .. }) => {
                tracing::info!(id, "project vanished before indexing, skipping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Index one task.
    pub async fn index_task(&self, id: &str) -> Result<()> {
        match self.gateway.tasks.find_one(id).await {
            Ok(snapshot) => {
                let doc = transform_task(&snapshot, Utc::now());
                self.upsert_document(EntityKind::Task, id, doc).await
            }
            Err(Error::NotFound { .. }) => {
                tracing::info!(id, "task vanished before indexing, skipping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Index by kind.
    pub async fn index(&self, kind: EntityKind, id: &str) -> Result<()> {
        match kind {
            EntityKind::User => self.index_user(id).await,
            EntityKind::Team => self.index_team(id).await,
            EntityKind::Project => self.index_project(id).await,
            EntityKind::Task => self.index_task(id).await,
            other => Err(Error::Validation(format!(
                "{} documents are synthetic, not entity-indexed",
                other
            ))),
        }
    }

    /// Remove an entity's document. Absent documents are fine.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.store
            .delete(point_id(kind, id))
            .await
            .map_err(Into::into)
    }

    /// Delete-then-index. Tolerant of a missing prior document, so it
    /// doubles as plain indexing for entities never seen before.
    pub async fn reindex(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.delete(kind, id).await?;
        self.index(kind, id).await
    }

    /// Full sync of every entity plus the synthetic documents.
    pub async fn index_all(&self) -> IndexStats {
        let started = Instant::now();
        let mut stats = IndexStats::default();

        for kind in EntityKind::relational() {
            match self.index_kind(kind).await {
                Ok(count) => match kind {
                    EntityKind::User => stats.users_indexed = count,
                    EntityKind::Team => stats.teams_indexed = count,
                    EntityKind::Project => stats.projects_indexed = count,
                    EntityKind::Task => stats.tasks_indexed = count,
                    _ => {}
                },
                Err(e) => stats.errors.push(format!("{} listing: {}", kind, e)),
            }
        }

        if let Err(e) = self.index_system_info().await {
            stats.errors.push(format!("system_info: {}", e));
        }
        if let Err(e) = self.index_statistics().await {
            stats.errors.push(format!("statistics: {}", e));
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            users = stats.users_indexed,
            teams = stats.teams_indexed,
            projects = stats.projects_indexed,
            tasks = stats.tasks_indexed,
            errors = stats.errors.len(),
            duration_ms = stats.duration_ms,
            "full index complete"
        );
        stats
    }

    async fn index_kind(&self, kind: EntityKind) -> Result<usize> {
        let mut indexed = 0;
        let mut page = 1;

        loop {
            let batch = self
                .gateway
                .list_names(kind, page, resolver::LIST_PAGE_SIZE)
                .await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();

            for (id, _) in batch {
                match self.index(kind, &id).await {
                    Ok(()) => indexed += 1,
                    Err(e) => {
                        tracing::warn!(kind = %kind, id, error = %e, "entity failed to index");
                    }
                }
            }

            if batch_len < resolver::LIST_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(indexed)
    }

    /// Synthetic document describing what each operation needs, so "what
    /// do I need to create a task" style questions retrieve well.
    pub async fn index_system_info(&self) -> Result<()> {
        let text = "System guide for the task manager. \
            Creating a task requires a title; description, assignee, status and deadline are optional. \
            Task status is one of To Do, In Progress or Done. \
            Creating a user requires a name, an email and a password of at least 6 characters; role (admin or member) and team are optional. \
            Creating a team requires a name, a project and an owner. \
            Creating a project requires a name; description is optional. \
            Tasks can be assigned to users, users belong to teams, and teams work on projects.";

        self.upsert_synthetic(EntityKind::SystemInfo, "system_info", text.to_string())
            .await
    }

    /// Synthetic document with aggregate counts.
    pub async fn index_statistics(&self) -> Result<()> {
        let counts = self.gateway.counts().await?;
        let text = format!(
            "Workspace statistics. There are {} users, {} teams, {} projects and {} tasks in the system.",
            counts.users, counts.teams, counts.projects, counts.tasks
        );

        self.upsert_synthetic(EntityKind::Statistics, "statistics", text)
            .await
    }

    async fn upsert_document(
        &self,
        kind: EntityKind,
        id: &str,
        doc: EntityDocument,
    ) -> Result<()> {
        let vector = self.embeddings.embed(&doc.text).await?;
        let payload = build_payload(kind, id, &doc);
        self.store
            .upsert(point_id(kind, id), vector, payload)
            .await
            .map_err(Into::into)
    }

    async fn upsert_synthetic(&self, kind: EntityKind, key: &str, text: String) -> Result<()> {
        let now = Utc::now();
        let doc = EntityDocument {
            text,
            metadata: [("type".to_string(), json!(kind.as_str()))].into(),
            relationships: Default::default(),
            created_at: now,
            updated_at: now,
        };
        self.upsert_document(kind, key, doc).await
    }
}

/// Assemble the stored payload for a document.
fn build_payload(kind: EntityKind, id: &str, doc: &EntityDocument) -> JsonValue {
    json!({
        "entity_type": kind.as_str(),
        "entity_id": id,
        "text": doc.text,
        "created_at": doc.created_at.to_rfc3339(),
        "updated_at": doc.updated_at.to_rfc3339(),
        "metadata": doc.metadata,
        "relationships": doc.relationships,
        "point_id": format!("{}-{}", kind.as_str(), id),
        "indexed_at": Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic() {
        let a = point_id(EntityKind::Task, "K1");
        let b = point_id(EntityKind::Task, "K1");
        assert_eq!(a, b);
        assert!(a <= i32::MAX as u32);
    }

    #[test]
    fn test_point_id_separates_kinds() {
        assert_ne!(
            point_id(EntityKind::Task, "X1"),
            point_id(EntityKind::User, "X1")
        );
        assert_ne!(
            point_id(EntityKind::Task, "X1"),
            point_id(EntityKind::Task, "X2")
        );
    }

    #[test]
    fn test_payload_shape() {
        let now = Utc::now();
        let doc = EntityDocument {
            text: "Task: Fix Login.".into(),
            metadata: [("task_status".to_string(), json!("todo"))].into(),
            relationships: [("assigned_to".to_string(), "U1".to_string())].into(),
            created_at: now,
            updated_at: now,
        };
        let payload = build_payload(EntityKind::Task, "K9", &doc);
        assert_eq!(payload["entity_type"], "task");
        assert_eq!(payload["entity_id"], "K9");
        assert_eq!(payload["metadata"]["task_status"], "todo");
        assert_eq!(payload["relationships"]["assigned_to"], "U1");
        assert_eq!(payload["point_id"], "task-K9");
        assert!(payload["indexed_at"].is_string());
    }
}
