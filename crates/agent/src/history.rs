//! Conversation store
//!
//! Bounded per-session history with LLM summarisation of old turns.
//! Appends are serialised per session; the turns themselves live in a TTL
//! mirror so idle sessions age out on their own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use task_agent_config::constants::history as bounds;
use task_agent_core::{TtlCache, Turn, TurnRole};
use task_agent_llm::{CompletionOptions, LlmBackend};

/// Session history store
pub struct ConversationStore {
    llm: Arc<dyn LlmBackend>,
    /// Per-session locks serialising append
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Turn storage with session TTL
    turns: TtlCache<String, Vec<Turn>>,
}

impl ConversationStore {
    pub fn new(llm: Arc<dyn LlmBackend>, session_ttl: Duration) -> Self {
        Self {
            llm,
            locks: Mutex::new(HashMap::new()),
            turns: TtlCache::new(session_ttl),
        }
    }

    /// Fresh session identifier.
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Current turns for a session; empty for unknown or expired sessions.
    pub fn get(&self, session_id: &str) -> Vec<Turn> {
        self.turns.get(&session_id.to_string()).unwrap_or_default()
    }

    /// Append a turn, summarising and truncating as the session grows.
    pub async fn append(&self, session_id: &str, role: TurnRole, content: &str) {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut turns = self.get(session_id);
        turns.push(Turn::new(role, content));

        if turns.len() >= bounds::SUMMARIZE_THRESHOLD {
            turns = self.summarize(turns).await;
        }

        truncate_from_head(&mut turns, bounds::MAX_TURNS);
        self.turns.insert(session_id.to_string(), turns);
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Fold everything but the most recent turns into a summary turn.
    ///
    /// Safe to re-enter: a prior summary is absorbed into the new one. If
    /// the LLM fails, plain head truncation keeps the session bounded.
    async fn summarize(&self, turns: Vec<Turn>) -> Vec<Turn> {
        let prior_summary = turns.first().filter(|t| t.is_summary()).cloned();
        let body: Vec<Turn> = turns.iter().filter(|t| !t.is_summary()).cloned().collect();

        if body.len() <= bounds::KEEP_RECENT {
            return turns;
        }
        let split = body.len() - bounds::KEEP_RECENT;
        let (old, recent) = body.split_at(split);

        if old.len() < bounds::MIN_FOLD {
            return turns;
        }

        let prompt = crate::prompts::summary_prompt(
            prior_summary.as_ref().map(|t| t.content.as_str()),
            old,
        );
        let opts = CompletionOptions {
            temperature: Some(bounds::SUMMARY_TEMPERATURE),
            max_tokens: Some(bounds::SUMMARY_MAX_TOKENS),
            ..CompletionOptions::default()
        };

        match self.llm.complete(&prompt, &opts).await {
            Ok(summary) => {
                let mut folded = vec![Turn::summary(summary.trim())];
                folded.extend_from_slice(recent);
                folded
            }
            Err(e) => {
                tracing::warn!(error = %e, "summarisation failed, falling back to truncation");
                let mut fallback: Vec<Turn> = Vec::new();
                if let Some(summary) = prior_summary {
                    fallback.push(summary);
                }
                fallback.extend_from_slice(recent);
                fallback
            }
        }
    }
}

/// Drop oldest non-summary turns until at most `max` remain. A summary
/// turn is exempt from the bound and stays first.
fn truncate_from_head(turns: &mut Vec<Turn>, max: usize) {
    let has_summary = turns.first().is_some_and(Turn::is_summary);
    let body_len = turns.len() - usize::from(has_summary);
    if body_len <= max {
        return;
    }

    let drop = body_len - max;
    let start = usize::from(has_summary);
    turns.drain(start..start + drop);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use task_agent_llm::LlmError;
    use tokio::sync::mpsc;

    struct ScriptedLlm {
        fail: bool,
    }

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn complete(
            &self,
            _prompt: &str,
            _opts: &CompletionOptions,
        ) -> Result<String, LlmError> {
            if self.fail {
                Err(LlmError::Timeout)
            } else {
                Ok("The user discussed several tasks.".to_string())
            }
        }

        async fn complete_stream(
            &self,
            prompt: &str,
            opts: &CompletionOptions,
            _tx: mpsc::Sender<String>,
        ) -> Result<String, LlmError> {
            self.complete(prompt, opts).await
        }

        async fn embed(&self, _text: &str, _model: Option<&str>) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.1])
        }

        fn default_model(&self) -> &str {
            "scripted"
        }

        fn fast_model(&self) -> &str {
            "scripted"
        }
    }

    fn store(fail: bool) -> ConversationStore {
        ConversationStore::new(
            Arc::new(ScriptedLlm { fail }),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_summary_replaces_old_turns() {
        let store = store(false);
        let sid = "s1";

        for i in 0..bounds::SUMMARIZE_THRESHOLD {
            let role = if i % 2 == 0 {
                TurnRole::User
            } else {
                TurnRole::Assistant
            };
            store.append(sid, role, &format!("turn {}", i)).await;
        }

        let turns = store.get(sid);
        assert_eq!(turns[0].role, TurnRole::Summary);
        assert_eq!(turns.len(), bounds::KEEP_RECENT + 1);
        // Most recent turns survive verbatim.
        assert_eq!(turns.last().unwrap().content, "turn 7");
    }

    #[tokio::test]
    async fn test_at_most_one_summary_and_it_is_first() {
        let store = store(false);
        let sid = "s1";

        for i in 0..(bounds::SUMMARIZE_THRESHOLD * 3) {
            store.append(sid, TurnRole::User, &format!("turn {}", i)).await;
        }

        let turns = store.get(sid);
        let summaries = turns.iter().filter(|t| t.is_summary()).count();
        assert_eq!(summaries, 1);
        assert!(turns[0].is_summary());
        assert!(turns.len() <= bounds::MAX_TURNS + 1);
    }

    #[tokio::test]
    async fn test_failed_summary_falls_back_to_truncation() {
        let store = store(true);
        let sid = "s1";

        for i in 0..bounds::SUMMARIZE_THRESHOLD {
            store.append(sid, TurnRole::User, &format!("turn {}", i)).await;
        }

        let turns = store.get(sid);
        assert!(turns.iter().all(|t| !t.is_summary()));
        assert_eq!(turns.len(), bounds::KEEP_RECENT);
        assert!(turns.len() <= bounds::MAX_TURNS);
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let store = store(false);
        assert!(store.get("missing").is_empty());
        assert_ne!(
            ConversationStore::new_session_id(),
            ConversationStore::new_session_id()
        );
    }
}
