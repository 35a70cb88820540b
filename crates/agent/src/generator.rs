//! Answer generation
//!
//! Intent-aware prompting over the processed context, plus the grounding
//! check and confidence score attached to every retrieval answer.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use task_agent_config::constants::{generation, llm as llm_tuning};
use task_agent_core::{RetrievedDoc, Turn};
use task_agent_llm::{CompletionOptions, LlmBackend};

use crate::intent::QueryType;
use crate::prompts;

/// Answer generator
pub struct Generator {
    llm: Arc<dyn LlmBackend>,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Intent-specific directive prefixed to the answer prompt.
    fn instruction(query_type: QueryType) -> &'static str {
        match query_type {
            QueryType::Requirements => {
                "List the required and optional fields exactly as given in the context."
            }
            QueryType::Statistics => "Report the numbers from the context without inventing any.",
            QueryType::Question => "State the current status or fact directly, then stop.",
            QueryType::List => "Enumerate the matching items, one per line, with their names.",
            QueryType::Search => "Analyse the retrieved items and point out the most relevant.",
            QueryType::Help => "Explain what the assistant can do, based on the context.",
            _ => "Answer based on context. Be concise.",
        }
    }

    fn temperature(query_type: QueryType) -> f32 {
        if query_type == QueryType::Statistics {
            generation::STATISTICS_TEMPERATURE
        } else {
            generation::DEFAULT_TEMPERATURE
        }
    }

    /// Generate an answer from context and recent history.
    pub async fn generate(
        &self,
        query: &str,
        context: &str,
        history: &[Turn],
        query_type: QueryType,
    ) -> Result<String, task_agent_core::Error> {
        let recent = recent_turns(history, generation::PROMPT_HISTORY_TURNS);
        let prompt = prompts::answer_prompt(query, context, &recent, Self::instruction(query_type));
        let opts = CompletionOptions {
            temperature: Some(Self::temperature(query_type)),
            ..CompletionOptions::default()
        };

        let answer = self.llm.complete(&prompt, &opts).await?;
        Ok(answer.trim().to_string())
    }

    /// One-shot completion for pre-assembled prompts (shortcut path).
    pub async fn generate_raw(&self, prompt: &str) -> Result<String, task_agent_core::Error> {
        let opts = CompletionOptions {
            temperature: Some(generation::DEFAULT_TEMPERATURE),
            ..CompletionOptions::default()
        };
        let answer = self.llm.complete(prompt, &opts).await?;
        Ok(answer.trim().to_string())
    }

    /// Streaming variant; chunks go to `tx`, the full text is returned.
    pub async fn generate_stream(
        &self,
        query: &str,
        context: &str,
        history: &[Turn],
        query_type: QueryType,
        tx: mpsc::Sender<String>,
    ) -> Result<String, task_agent_core::Error> {
        let recent = recent_turns(history, generation::PROMPT_HISTORY_TURNS);
        let prompt = prompts::answer_prompt(query, context, &recent, Self::instruction(query_type));
        let opts = CompletionOptions {
            temperature: Some(Self::temperature(query_type)),
            max_tokens: Some(llm_tuning::STREAM_MAX_TOKENS),
            ..CompletionOptions::default()
        };

        let answer = self.llm.complete_stream(&prompt, &opts, tx).await?;
        Ok(answer.trim().to_string())
    }

    /// Render an upstream failure as something a user can act on. Falls
    /// back to a plain apology when even the LLM call fails. Extracted
    /// arguments are echoed verbatim so the next turn can continue.
    pub async fn render_error(
        &self,
        query: &str,
        error: &str,
        extracted: &[(String, String)],
    ) -> String {
        let opts = CompletionOptions {
            model: Some(self.llm.fast_model().to_string()),
            temperature: Some(0.3),
            max_tokens: Some(120),
            ..CompletionOptions::default()
        };

        let mut answer = match self
            .llm
            .complete(&prompts::error_prompt(query, error), &opts)
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "error rendering failed, using fallback message");
                "Sorry, something went wrong while handling that request. Please try again."
                    .to_string()
            }
        };

        if !extracted.is_empty() {
            let rendered: Vec<String> = extracted
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            answer.push_str(&format!(" [Extracted so far: {}]", rendered.join(", ")));
        }
        answer
    }

    /// An answer is grounded when the share of its tokens appearing in the
    /// retrieved texts strictly exceeds the threshold.
    pub fn check_grounding(answer: &str, docs: &[RetrievedDoc]) -> bool {
        let answer_tokens: Vec<String> = answer
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        if answer_tokens.is_empty() {
            return false;
        }

        let doc_tokens: HashSet<String> = docs
            .iter()
            .flat_map(|d| {
                d.text
                    .to_lowercase()
                    .split_whitespace()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
            })
            .collect();

        let overlap = answer_tokens
            .iter()
            .filter(|t| doc_tokens.contains(*t))
            .count();

        overlap as f32 / answer_tokens.len() as f32 > generation::GROUNDING_THRESHOLD
    }

    /// Mean document score, plus a bonus when grounded, capped at 1.
    pub fn confidence(docs: &[RetrievedDoc], grounded: bool) -> f32 {
        if docs.is_empty() {
            return 0.0;
        }
        let mean = docs.iter().map(|d| d.score).sum::<f32>() / docs.len() as f32;
        let bonus = if grounded {
            generation::GROUNDING_BONUS
        } else {
            0.0
        };
        (mean + bonus).min(1.0)
    }
}

fn recent_turns(history: &[Turn], count: usize) -> Vec<Turn> {
    let filtered: Vec<&Turn> = history.iter().filter(|t| !t.is_summary()).collect();
    let start = filtered.len().saturating_sub(count);
    filtered[start..].iter().map(|t| (*t).clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use task_agent_core::{EntityKind, ScoreKind};

    fn doc(text: &str, score: f32) -> RetrievedDoc {
        RetrievedDoc {
            id: "1".into(),
            score,
            score_kind: ScoreKind::Fused,
            text: text.into(),
            entity_type: EntityKind::Task,
            entity_id: "K1".into(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_grounding_threshold_is_strict() {
        let docs = vec![doc("alpha beta gamma delta", 0.9)];

        // 2 of 4 answer tokens overlap: 0.5 > 0.3
        assert!(Generator::check_grounding("alpha beta zeta eta", &docs));
        // 1 of 4: 0.25 <= 0.3
        assert!(!Generator::check_grounding("alpha x y z", &docs));
        // Empty answers are never grounded.
        assert!(!Generator::check_grounding("", &docs));
    }

    #[test]
    fn test_grounding_boundary_not_inclusive() {
        let docs = vec![doc("one two three", 0.9)];
        // Exactly 3 of 10 tokens: 0.3 is not strictly greater.
        let answer = "one two three a b c d e f g";
        assert!(!Generator::check_grounding(answer, &docs));
    }

    #[test]
    fn test_confidence() {
        assert_eq!(Generator::confidence(&[], true), 0.0);

        let docs = vec![doc("a", 0.6), doc("b", 0.8)];
        let ungrounded = Generator::confidence(&docs, false);
        let grounded = Generator::confidence(&docs, true);
        assert!((ungrounded - 0.7).abs() < 1e-6);
        assert!((grounded - 0.9).abs() < 1e-6);

        let docs = vec![doc("a", 0.95)];
        assert_eq!(Generator::confidence(&docs, true), 1.0);
    }

    #[test]
    fn test_instruction_table() {
        assert!(Generator::instruction(QueryType::Statistics).contains("numbers"));
        assert_eq!(
            Generator::instruction(QueryType::Create),
            "Answer based on context. Be concise."
        );
    }
}
