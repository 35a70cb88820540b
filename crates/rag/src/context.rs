//! Context processing
//!
//! Turns a fused result list into the material the generator consumes:
//! rerank by score, select a diverse subset with MMR, compress to the
//! token budget, and emit numbered citations plus the context block.

use std::collections::HashSet;

use task_agent_config::constants::search as tuning;
use task_agent_core::{RetrievedDoc, SourceCitation};

/// Output of context processing
#[derive(Debug, Clone)]
pub struct ProcessedContext {
    /// Top documents by score
    pub reranked: Vec<RetrievedDoc>,
    /// Diversity-selected subset
    pub diverse: Vec<RetrievedDoc>,
    /// Documents surviving the token budget
    pub compressed: Vec<RetrievedDoc>,
    /// Citations for the compressed documents
    pub sources: Vec<SourceCitation>,
    /// Context block handed to the generator
    pub context: String,
}

/// Context processor
#[derive(Debug, Clone)]
pub struct ContextProcessor {
    max_tokens: usize,
}

impl Default for ContextProcessor {
    fn default() -> Self {
        Self {
            max_tokens: tuning::MAX_CONTEXT_TOKENS,
        }
    }
}

impl ContextProcessor {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Full processing pass. `_query` is accepted for interface parity;
    /// relevance is already baked into the incoming scores.
    pub fn process(&self, mut docs: Vec<RetrievedDoc>, _query: &str) -> ProcessedContext {
        docs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        docs.truncate(tuning::RERANK_TOP);
        let reranked = docs;

        let diverse = if reranked.len() >= tuning::MMR_MIN_DOCS {
            mmr_select(&reranked, tuning::MMR_LAMBDA, tuning::MMR_SELECT)
        } else {
            reranked.clone()
        };

        let compressed = self.compress(&diverse);
        let sources = citations(&compressed);
        let context = context_block(&compressed);

        ProcessedContext {
            reranked,
            diverse,
            compressed,
            sources,
            context,
        }
    }

    /// Keep documents in order while the cumulative text length fits the
    /// character budget (`4 · max_tokens`).
    fn compress(&self, docs: &[RetrievedDoc]) -> Vec<RetrievedDoc> {
        let budget = self.max_tokens.saturating_mul(tuning::CHARS_PER_TOKEN);
        let mut used = 0usize;
        let mut kept = Vec::new();

        for doc in docs {
            let len = doc.text.len();
            if used + len > budget {
                break;
            }
            used += len;
            kept.push(doc.clone());
        }
        kept
    }
}

/// Maximal Marginal Relevance selection.
///
/// Starts from the top-scored document, then repeatedly picks the
/// candidate maximising `λ·score − (1−λ)·max_similarity_to_selected`.
fn mmr_select(docs: &[RetrievedDoc], lambda: f32, select: usize) -> Vec<RetrievedDoc> {
    if docs.is_empty() {
        return Vec::new();
    }

    let token_sets: Vec<HashSet<String>> = docs.iter().map(|d| token_set(&d.text)).collect();

    let mut selected_idx: Vec<usize> = vec![0];
    let mut remaining: Vec<usize> = (1..docs.len()).collect();

    while selected_idx.len() < select && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_value = f32::NEG_INFINITY;

        for (pos, &candidate) in remaining.iter().enumerate() {
            let max_sim = selected_idx
                .iter()
                .map(|&s| jaccard(&token_sets[candidate], &token_sets[s]))
                .fold(0.0f32, f32::max);
            let value = lambda * docs[candidate].score - (1.0 - lambda) * max_sim;

            if value > best_value {
                best_value = value;
                best_pos = pos;
            }
        }

        selected_idx.push(remaining.remove(best_pos));
    }

    selected_idx.into_iter().map(|i| docs[i].clone()).collect()
}

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    intersection / union
}

/// Numbered citations with clipped text previews.
fn citations(docs: &[RetrievedDoc]) -> Vec<SourceCitation> {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| {
            let preview: String = doc
                .text
                .chars()
                .take(tuning::CITATION_PREVIEW_CHARS)
                .collect();
            SourceCitation {
                entity_type: doc.entity_type,
                entity_id: doc.entity_id.clone(),
                text: format!("{}...", preview),
                score: doc.score,
                citation: format!("[{}]", i + 1),
            }
        })
        .collect()
}

/// The `[i] ENTITYTYPE: text` block the generator cites from.
fn context_block(docs: &[RetrievedDoc]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "[{}] {}: {}\n\n",
                i + 1,
                doc.entity_type.as_str().to_uppercase(),
                doc.text
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use task_agent_core::{EntityKind, ScoreKind};

    fn doc(id: &str, score: f32, text: &str) -> RetrievedDoc {
        RetrievedDoc {
            id: id.to_string(),
            score,
            score_kind: ScoreKind::Fused,
            text: text.to_string(),
            entity_type: EntityKind::Task,
            entity_id: id.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_mmr_keeps_top_doc_first() {
        let docs: Vec<RetrievedDoc> = (0..8)
            .map(|i| {
                doc(
                    &i.to_string(),
                    1.0 - i as f32 * 0.1,
                    &format!("task number {} with body text", i),
                )
            })
            .collect();

        let result = ContextProcessor::default().process(docs.clone(), "tasks");
        assert_eq!(result.diverse[0].id, docs[0].id);
        assert_eq!(result.diverse.len(), 5);
    }

    #[test]
    fn test_mmr_skipped_below_threshold() {
        let docs = vec![doc("1", 0.9, "a"), doc("2", 0.8, "b"), doc("3", 0.7, "c")];
        let result = ContextProcessor::default().process(docs, "q");
        assert_eq!(result.diverse.len(), 3);
    }

    #[test]
    fn test_mmr_penalises_duplicates() {
        let docs = vec![
            doc("1", 1.0, "database optimization work item pending"),
            doc("2", 0.99, "database optimization work item pending"),
            doc("3", 0.55, "frontend login page redesign"),
            doc("4", 0.54, "hiring pipeline review"),
            doc("5", 0.53, "quarterly budget forecast"),
            doc("6", 0.52, "incident postmortem draft"),
        ];
        let selected = mmr_select(&docs, 0.5, 3);
        // The near-duplicate of the seed loses to a diverse lower-scored doc.
        assert_eq!(selected[0].id, "1");
        assert_ne!(selected[1].id, "2");
    }

    #[test]
    fn test_compression_zero_budget() {
        let processor = ContextProcessor::new(0);
        let result = processor.process(vec![doc("1", 0.9, "text")], "q");
        assert!(result.compressed.is_empty());
        assert!(result.sources.is_empty());
        assert!(result.context.is_empty());
    }

    #[test]
    fn test_citation_clipping_and_markers() {
        let long_text = "x".repeat(500);
        let result = ContextProcessor::default().process(vec![doc("1", 0.9, &long_text)], "q");
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].citation, "[1]");
        assert_eq!(result.sources[0].text.chars().count(), 203); // 200 + "..."
        assert!(result.context.starts_with("[1] TASK: "));
    }
}
