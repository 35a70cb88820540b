//! Hybrid search
//!
//! Dense vector search, sparse scoring over scrolled candidates, and
//! reciprocal rank fusion. The vector store is the single source of truth:
//! the sparse path scores the `text` payload of candidates pulled through
//! `scroll` with the same filter, so there is no second index to keep
//! consistent.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value as JsonValue;

use task_agent_config::constants::search as tuning;
use task_agent_core::{EntityKind, RetrievedDoc, ScoreKind};

use crate::embeddings::EmbeddingClient;
use crate::vector_store::{SearchFilter, VectorHit, VectorStore};
use crate::RagError;

/// Dense + sparse searcher over the vector store
pub struct Searcher {
    embeddings: Arc<EmbeddingClient>,
    store: Arc<VectorStore>,
}

impl Searcher {
    pub fn new(embeddings: Arc<EmbeddingClient>, store: Arc<VectorStore>) -> Self {
        Self { embeddings, store }
    }

    /// Dense search: embed the query and rank by cosine similarity.
    pub async fn vector_search(
        &self,
        query: &str,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<RetrievedDoc>, RagError> {
        let vector = self.embeddings.embed(query).await?;
        let hits = self
            .store
            .search(&vector, tuning::VECTOR_TOP_K, filter)
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| doc_from_hit(hit, ScoreKind::Dense))
            .collect())
    }

    /// Sparse search: simplified BM25 over scrolled candidates.
    ///
    /// Query terms of two characters or fewer are dropped; with no terms
    /// left the result is empty without touching the store.
    pub async fn bm25_search(
        &self,
        query: &str,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<RetrievedDoc>, RagError> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.store.scroll(filter, tuning::BM25_CANDIDATES).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut docs: Vec<RetrievedDoc> = candidates
            .into_iter()
            .filter_map(|hit| doc_from_hit(hit, ScoreKind::Sparse))
            .collect();

        let avgdl = docs.iter().map(|d| d.text.len() as f32).sum::<f32>() / docs.len() as f32;
        let matchers = term_matchers(&terms);

        for doc in &mut docs {
            doc.score = bm25_score(&doc.text, &matchers, avgdl);
        }

        docs.retain(|d| d.score > 0.0);
        docs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        docs.truncate(tuning::BM25_TOP_K);
        Ok(docs)
    }

    /// Reciprocal rank fusion across ranked lists.
    ///
    /// Each appearance at 0-based rank `r` contributes `1/(k + r + 1)` to
    /// the document's fused score.
    pub fn rrf(lists: &[Vec<RetrievedDoc>], k: f32) -> Vec<RetrievedDoc> {
        let mut fused: HashMap<String, RetrievedDoc> = HashMap::new();

        for list in lists {
            for (rank, doc) in list.iter().enumerate() {
                let contribution = 1.0 / (k + rank as f32 + 1.0);
                fused
                    .entry(doc.id.clone())
                    .and_modify(|d| d.score += contribution)
                    .or_insert_with(|| {
                        let mut d = doc.clone();
                        d.score = contribution;
                        d.score_kind = ScoreKind::Fused;
                        d
                    });
            }
        }

        let mut merged: Vec<RetrievedDoc> = fused.into_values().collect();
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged
    }

    /// Hybrid search over reformulated queries.
    ///
    /// For each query, dense and sparse search run in parallel and fuse
    /// per-query; a second global fusion merges the per-query lists.
    pub async fn hybrid_search(
        &self,
        queries: &[String],
        filter: Option<SearchFilter>,
    ) -> Result<Vec<RetrievedDoc>, RagError> {
        let per_query = futures::future::join_all(queries.iter().map(|query| {
            let filter = filter.clone();
            async move {
                let (dense, sparse) = tokio::join!(
                    self.vector_search(query, filter.clone()),
                    self.bm25_search(query, filter),
                );
                Ok::<_, RagError>(Self::rrf(&[dense?, sparse?], tuning::RRF_K))
            }
        }))
        .await;

        let mut fused_lists = Vec::with_capacity(per_query.len());
        for result in per_query {
            fused_lists.push(result?);
        }

        Ok(Self::rrf(&fused_lists, tuning::RRF_K))
    }
}

/// Lowercased whitespace tokens longer than the minimum length.
fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > tuning::MIN_TOKEN_LEN)
        .map(|t| t.to_string())
        .collect()
}

/// Case-insensitive literal matchers, one per query term.
fn term_matchers(terms: &[String]) -> Vec<Regex> {
    terms
        .iter()
        .filter_map(|t| Regex::new(&format!("(?i){}", regex::escape(t))).ok())
        .collect()
}

/// Simplified BM25: k1/b term saturation with character-length
/// normalisation, no IDF, averaged over the query terms.
fn bm25_score(text: &str, matchers: &[Regex], avgdl: f32) -> f32 {
    if matchers.is_empty() || avgdl <= 0.0 {
        return 0.0;
    }

    let dl = text.len() as f32;
    let mut total = 0.0;

    for matcher in matchers {
        let tf = matcher.find_iter(text).count() as f32;
        if tf == 0.0 {
            continue;
        }
        let denominator = tf + tuning::BM25_K1 * (1.0 - tuning::BM25_B + tuning::BM25_B * dl / avgdl);
        total += tf * (tuning::BM25_K1 + 1.0) / denominator;
    }

    total / matchers.len() as f32
}

/// Build a retrieval record from a payload-bearing hit. Documents with a
/// missing or unknown `entity_type` are skipped.
fn doc_from_hit(hit: VectorHit, score_kind: ScoreKind) -> Option<RetrievedDoc> {
    let entity_type = hit
        .payload
        .get("entity_type")
        .and_then(JsonValue::as_str)
        .and_then(EntityKind::parse)?;

    let entity_id = hit
        .payload
        .get("entity_id")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();

    let text = hit
        .payload
        .get("text")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();

    let metadata = match hit.payload.get("metadata") {
        Some(JsonValue::Object(map)) => map.clone().into_iter().collect(),
        _ => HashMap::new(),
    };

    Some(RetrievedDoc {
        id: hit.id,
        score: hit.score,
        score_kind,
        text,
        entity_type,
        entity_id,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, score: f32) -> RetrievedDoc {
        RetrievedDoc {
            id: id.to_string(),
            score,
            score_kind: ScoreKind::Dense,
            text: format!("document {}", id),
            entity_type: EntityKind::Task,
            entity_id: id.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_tokenize_drops_short_terms() {
        assert_eq!(tokenize("is it on go now"), vec!["now".to_string()]);
        assert!(tokenize("a an to").is_empty());
        assert_eq!(
            tokenize("Overdue TASKS"),
            vec!["overdue".to_string(), "tasks".to_string()]
        );
    }

    #[test]
    fn test_bm25_scoring_prefers_matches() {
        let matchers = term_matchers(&["database".to_string(), "optimization".to_string()]);
        let hit = "Task: Database Optimization. The database needs indexing.";
        let miss = "Team: Frontend Guild. Works on UI.";
        let avgdl = (hit.len() + miss.len()) as f32 / 2.0;

        let hit_score = bm25_score(hit, &matchers, avgdl);
        let miss_score = bm25_score(miss, &matchers, avgdl);
        assert!(hit_score > 0.0);
        assert_eq!(miss_score, 0.0);
    }

    #[test]
    fn test_rrf_rewards_agreement() {
        let list_a = vec![doc("1", 0.9), doc("2", 0.8), doc("3", 0.7)];
        let list_b = vec![doc("2", 12.0), doc("4", 3.0)];

        let merged = Searcher::rrf(&[list_a, list_b], tuning::RRF_K);

        // doc 2 appears in both lists and must outrank everything
        // appearing once at equal-or-worse ranks.
        assert_eq!(merged[0].id, "2");
        assert_eq!(merged.len(), 4);
        assert!(merged.iter().all(|d| d.score_kind == ScoreKind::Fused));

        // Monotonicity: rank-0 singleton beats rank-2 singleton.
        let pos_1 = merged.iter().position(|d| d.id == "1").unwrap();
        let pos_3 = merged.iter().position(|d| d.id == "3").unwrap();
        assert!(pos_1 < pos_3);
    }

    #[test]
    fn test_doc_from_hit_requires_entity_type() {
        let mut payload = HashMap::new();
        payload.insert("text".to_string(), JsonValue::from("orphan"));
        let hit = VectorHit {
            id: "7".into(),
            score: 0.5,
            payload,
        };
        assert!(doc_from_hit(hit, ScoreKind::Dense).is_none());

        let mut payload = HashMap::new();
        payload.insert("entity_type".to_string(), JsonValue::from("task"));
        payload.insert("entity_id".to_string(), JsonValue::from("K1"));
        payload.insert("text".to_string(), JsonValue::from("Task: Fix Login"));
        payload.insert(
            "metadata".to_string(),
            serde_json::json!({"task_status": "todo"}),
        );
        let hit = VectorHit {
            id: "8".into(),
            score: 0.9,
            payload,
        };
        let doc = doc_from_hit(hit, ScoreKind::Dense).unwrap();
        assert_eq!(doc.entity_type, EntityKind::Task);
        assert_eq!(doc.meta_str("task_status"), Some("todo"));
    }
}
