//! Retrieval records
//!
//! The unit of data flowing out of search and into context processing and
//! generation. Scores are only comparable within one producer; rank fusion
//! is the sanctioned way to combine them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::EntityKind;

/// Which scorer produced a document's score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Cosine similarity from dense search
    Dense,
    /// BM25-style term score from sparse search
    Sparse,
    /// Reciprocal rank fusion output
    Fused,
}

/// A document retrieved from the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    /// Point id in the vector store
    pub id: String,
    /// Producer-specific relevance score
    pub score: f32,
    /// What produced `score`
    pub score_kind: ScoreKind,
    /// Searchable text of the document
    pub text: String,
    /// Kind of the underlying entity
    pub entity_type: EntityKind,
    /// Id of the underlying entity (or synthetic document key)
    pub entity_id: String,
    /// Flat scalar attributes mirrored from the payload
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl RetrievedDoc {
    /// Metadata value as a string, if present and scalar
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A citation emitted alongside a generated answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCitation {
    pub entity_type: EntityKind,
    pub entity_id: String,
    /// Clipped preview of the document text
    pub text: String,
    pub score: f32,
    /// Marker such as `[1]` matching the context block
    pub citation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_str() {
        let mut metadata = HashMap::new();
        metadata.insert("task_status".to_string(), Value::from("done"));
        metadata.insert("is_overdue".to_string(), Value::from(true));

        let doc = RetrievedDoc {
            id: "1".into(),
            score: 0.9,
            score_kind: ScoreKind::Dense,
            text: "Task: Database Optimization".into(),
            entity_type: EntityKind::Task,
            entity_id: "K1".into(),
            metadata,
        };
        assert_eq!(doc.meta_str("task_status"), Some("done"));
        assert_eq!(doc.meta_str("is_overdue"), None);
    }
}
