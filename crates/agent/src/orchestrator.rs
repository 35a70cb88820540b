//! Pipeline orchestrator
//!
//! Request-scoped coordination of the whole pipeline: response cache,
//! quick intents, classification, the action / special / retrieval
//! branches, history upkeep, and the streaming adaptation. Errors never
//! escape: every failure becomes a user-readable answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use task_agent_config::constants::search as search_tuning;
use task_agent_config::PipelineConfig;
use task_agent_core::{RetrievedDoc, SourceCitation, TtlCache, Turn, TurnRole};
use task_agent_rag::{ContextProcessor, Searcher};

use crate::actions::ActionExecutor;
use crate::generator::Generator;
use crate::history::ConversationStore;
use crate::intent::{Classification, FilterSpec, IntentClassifier, QueryType, QuickIntent};
use crate::prompts;
use crate::response::{ChatRequest, ChatResponse, FunctionCall, PipelineEvent, ResponseMetadata};

static SHORTCUT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r"(?i)^(get|show|find|list)\s+(all\s+)?(overdue|urgent|done|to\s?do|in\s?progress|completed)(\s+tasks?)?$",
        )
        .expect("shortcut pattern"),
        Regex::new(r"(?i)^(get|show|find|list)\s+(all\s+)?(tasks?|users?|teams?|projects?)$")
            .expect("shortcut pattern"),
    ]
});

const GREETING_REPLIES: &[&str] = &[
    "Hello! How can I help you with your tasks today?",
    "Hi there! Ask me about your tasks, teams or projects.",
    "Hey! What would you like to get done?",
];

const GOODBYE_REPLIES: &[&str] = &[
    "Goodbye! Come back whenever you need something.",
    "See you later!",
    "Bye for now!",
];

const THANKS_REPLIES: &[&str] = &[
    "You're welcome!",
    "Any time!",
    "Happy to help!",
];

/// Cached portion of a response; session id and timing are always fresh.
#[derive(Debug, Clone)]
struct CachedAnswer {
    answer: String,
    sources: Vec<SourceCitation>,
    confidence: f32,
    query_classification: String,
    retrieved_documents: usize,
    function_calls: Option<Vec<FunctionCall>>,
}

/// The assembled pipeline
pub struct Pipeline {
    config: PipelineConfig,
    history: Arc<ConversationStore>,
    intents: Arc<IntentClassifier>,
    searcher: Arc<Searcher>,
    context: ContextProcessor,
    actions: Arc<ActionExecutor>,
    generator: Arc<Generator>,
    response_cache: TtlCache<String, CachedAnswer>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        history: Arc<ConversationStore>,
        intents: Arc<IntentClassifier>,
        searcher: Arc<Searcher>,
        actions: Arc<ActionExecutor>,
        generator: Arc<Generator>,
    ) -> Self {
        let response_cache = TtlCache::new(Duration::from_secs(config.response_cache_ttl_secs));
        let context = ContextProcessor::new(config.max_context_tokens);
        Self {
            config,
            history,
            intents,
            searcher,
            context,
            actions,
            generator,
            response_cache,
        }
    }

    /// Handle one chat request. Always returns a response; failures are
    /// rendered into the answer text.
    pub async fn process(&self, request: ChatRequest) -> ChatResponse {
        let started = Instant::now();
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(ConversationStore::new_session_id);
        let query = request.query.trim().to_string();

        if query.is_empty() {
            return self.finish(
                started,
                session_id,
                "Please send a non-empty question or request.".to_string(),
                Vec::new(),
                0.0,
                "invalid".to_string(),
                0,
                vec!["validation".to_string()],
                None,
                false,
            );
        }

        let cache_key = self.cache_key(&query, &session_id);
        if let Some(hit) = self.response_cache.get(&cache_key) {
            tracing::debug!(session_id = %session_id, "response cache hit");
            return self.finish(
                started,
                session_id,
                hit.answer,
                hit.sources,
                hit.confidence,
                hit.query_classification,
                hit.retrieved_documents,
                vec!["response_cache".to_string()],
                hit.function_calls,
                true,
            );
        }

        let history = self.history.get(&session_id);

        // Quick intents bypass the pipeline entirely.
        if let Some(kind) = self.intents.quick_intent(&query).await {
            let answer = quick_reply(kind);
            self.history.append(&session_id, TurnRole::User, &query).await;
            self.history
                .append(&session_id, TurnRole::Assistant, &answer)
                .await;
            return self.finish(
                started,
                session_id,
                answer,
                Vec::new(),
                1.0,
                kind.as_str().to_string(),
                0,
                vec!["quick_intent".to_string()],
                None,
                false,
            );
        }

        self.history.append(&session_id, TurnRole::User, &query).await;

        let classification = self.intents.classify(&query, &history).await;
        let filters = IntentClassifier::extract_filters(&classification, &query);
        let mut steps = vec!["classification".to_string()];

        let (answer, sources, confidence, retrieved, function_calls) = if classification
            .query_type
            .is_action()
        {
            self.run_action_branch(&query, &classification, &filters, &history, &mut steps)
                .await
        } else {
            self.run_retrieval_branch(&query, &classification, &filters, &history, &mut steps, None)
                .await
        };

        self.history
            .append(&session_id, TurnRole::Assistant, &answer)
            .await;

        self.response_cache.insert(
            cache_key,
            CachedAnswer {
                answer: answer.clone(),
                sources: sources.clone(),
                confidence,
                query_classification: classification.query_type.as_str().to_string(),
                retrieved_documents: retrieved,
                function_calls: function_calls.clone(),
            },
        );

        self.finish(
            started,
            session_id,
            answer,
            sources,
            confidence,
            classification.query_type.as_str().to_string(),
            retrieved,
            steps,
            function_calls,
            false,
        )
    }

    /// Streaming variant: the same pipeline, narrated as typed events.
    pub async fn process_stream(&self, request: ChatRequest, tx: mpsc::Sender<PipelineEvent>) {
        let started = Instant::now();
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(ConversationStore::new_session_id);
        let query = request.query.trim().to_string();

        let _ = tx
            .send(PipelineEvent::Start {
                session_id: session_id.clone(),
            })
            .await;

        if query.is_empty() {
            let _ = tx
                .send(PipelineEvent::Error {
                    message: "Please send a non-empty question or request.".to_string(),
                })
                .await;
            return;
        }

        let history = self.history.get(&session_id);

        if let Some(kind) = self.intents.quick_intent(&query).await {
            let answer = quick_reply(kind);
            self.history.append(&session_id, TurnRole::User, &query).await;
            self.history
                .append(&session_id, TurnRole::Assistant, &answer)
                .await;
            let _ = tx
                .send(PipelineEvent::Chunk {
                    text: answer.clone(),
                })
                .await;
            let response = self.finish(
                started,
                session_id,
                answer,
                Vec::new(),
                1.0,
                kind.as_str().to_string(),
                0,
                vec!["quick_intent".to_string()],
                None,
                false,
            );
            let _ = tx.send(PipelineEvent::Complete { response }).await;
            return;
        }

        self.history.append(&session_id, TurnRole::User, &query).await;

        let _ = tx
            .send(PipelineEvent::Status {
                message: "classifying request".to_string(),
            })
            .await;
        let classification = self.intents.classify(&query, &history).await;
        let filters = IntentClassifier::extract_filters(&classification, &query);
        let mut steps = vec!["classification".to_string()];

        let (answer, sources, confidence, retrieved, function_calls) = if classification
            .query_type
            .is_action()
        {
            let _ = tx
                .send(PipelineEvent::Status {
                    message: "executing action".to_string(),
                })
                .await;
            let result = self
                .run_action_branch(&query, &classification, &filters, &history, &mut steps)
                .await;
            let _ = tx
                .send(PipelineEvent::Chunk {
                    text: result.0.clone(),
                })
                .await;
            result
        } else {
            let _ = tx
                .send(PipelineEvent::Status {
                    message: "searching".to_string(),
                })
                .await;
            self.run_retrieval_branch(
                &query,
                &classification,
                &filters,
                &history,
                &mut steps,
                Some(&tx),
            )
            .await
        };

        self.history
            .append(&session_id, TurnRole::Assistant, &answer)
            .await;

        let response = self.finish(
            started,
            session_id,
            answer,
            sources,
            confidence,
            classification.query_type.as_str().to_string(),
            retrieved,
            steps,
            function_calls,
            false,
        );
        let _ = tx.send(PipelineEvent::Complete { response }).await;
    }

    async fn run_action_branch(
        &self,
        query: &str,
        classification: &Classification,
        filters: &FilterSpec,
        history: &[Turn],
        steps: &mut Vec<String>,
    ) -> (
        String,
        Vec<SourceCitation>,
        f32,
        usize,
        Option<Vec<FunctionCall>>,
    ) {
        // Single-query hybrid search for reference resolution context; no
        // reformulation on the write path.
        let docs = match self
            .searcher
            .hybrid_search(
                std::slice::from_ref(&query.to_string()),
                filters.to_search_filter(),
            )
            .await
        {
            Ok(docs) => {
                steps.push("hybrid_search".to_string());
                docs
            }
            Err(e) => {
                tracing::warn!(error = %e, "action context retrieval failed, continuing without");
                Vec::new()
            }
        };
        let retrieved = docs.len();

        steps.push("action_execution".to_string());
        let outcome = self
            .actions
            .execute(query, classification, history, docs)
            .await;

        let executed = !outcome.function_calls.is_empty();
        let confidence = if executed { 0.9 } else { 0.3 };
        let function_calls = executed.then_some(outcome.function_calls);

        (
            outcome.answer,
            outcome.sources,
            confidence,
            retrieved,
            function_calls,
        )
    }

    async fn run_retrieval_branch(
        &self,
        query: &str,
        classification: &Classification,
        filters: &FilterSpec,
        history: &[Turn],
        steps: &mut Vec<String>,
        stream: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> (
        String,
        Vec<SourceCitation>,
        f32,
        usize,
        Option<Vec<FunctionCall>>,
    ) {
        let filter = filters.to_search_filter();

        // Shortcut: a fixed listing phrase with an entity filter and a
        // confident top hit answers without the full pipeline.
        if !filters.entity_types.is_empty() && matches_shortcut(query) {
            match self.searcher.vector_search(query, filter.clone()).await {
                Ok(docs)
                    if docs
                        .first()
                        .is_some_and(|top| top.score > self.config.shortcut_min_score) =>
                {
                    *steps = vec!["shortcut_exact_match".to_string()];
                    return self.answer_shortcut(query, docs, stream).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "shortcut probe failed, running full pipeline")
                }
            }
        }

        // Reformulate for question-like queries, long queries, and any
        // query with conversational context.
        let reformulate = matches!(
            classification.query_type,
            QueryType::Question | QueryType::Search
        ) || query.len() > 50
            || !history.is_empty();
        let queries = if reformulate {
            let variants = self.intents.reformulate(query, history).await;
            if variants.len() > 1 {
                steps.push("reformulation".to_string());
            }
            variants
        } else {
            vec![query.to_string()]
        };

        let docs = match self.searcher.hybrid_search(&queries, filter).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!(error = %e, "hybrid search failed");
                let answer = self.generator.render_error(query, &e.to_string(), &[]).await;
                steps.push("error".to_string());
                return (answer, Vec::new(), 0.0, 0, None);
            }
        };
        steps.push("hybrid_search".to_string());
        let retrieved = docs.len();

        let processed = self.context.process(docs, query);
        steps.push("context_compression".to_string());

        if let Some(tx) = stream {
            let _ = tx
                .send(PipelineEvent::Sources {
                    sources: processed.sources.clone(),
                })
                .await;
        }

        let answer = match stream {
            Some(tx) => {
                let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(32);
                let generation = self.generator.generate_stream(
                    query,
                    &processed.context,
                    history,
                    classification.query_type,
                    chunk_tx,
                );
                let forward = async {
                    while let Some(text) = chunk_rx.recv().await {
                        let _ = tx.send(PipelineEvent::Chunk { text }).await;
                    }
                };
                let (result, ()) = tokio::join!(generation, forward);
                result
            }
            None => {
                self.generator
                    .generate(query, &processed.context, history, classification.query_type)
                    .await
            }
        };
        steps.push("answer_generation".to_string());

        let answer = match answer {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "answer generation failed");
                steps.push("error".to_string());
                let answer = self.generator.render_error(query, &e.to_string(), &[]).await;
                return (answer, processed.sources, 0.0, retrieved, None);
            }
        };

        let grounded = Generator::check_grounding(&answer, &processed.compressed);
        steps.push("grounding_check".to_string());
        let confidence = Generator::confidence(&processed.compressed, grounded);

        (answer, processed.sources, confidence, retrieved, None)
    }

    /// Answer directly from the top dense hits with a minimal prompt.
    async fn answer_shortcut(
        &self,
        query: &str,
        mut docs: Vec<RetrievedDoc>,
        stream: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> (
        String,
        Vec<SourceCitation>,
        f32,
        usize,
        Option<Vec<FunctionCall>>,
    ) {
        docs.truncate(search_tuning::MMR_SELECT);
        let retrieved = docs.len();

        let context: String = docs
            .iter()
            .enumerate()
            .map(|(i, d)| format!("[{}] {}\n", i + 1, d.text))
            .collect();
        let sources: Vec<SourceCitation> = docs
            .iter()
            .enumerate()
            .map(|(i, d)| SourceCitation {
                entity_type: d.entity_type,
                entity_id: d.entity_id.clone(),
                text: d.text.chars().take(200).collect::<String>() + "...",
                score: d.score,
                citation: format!("[{}]", i + 1),
            })
            .collect();

        if let Some(tx) = stream {
            let _ = tx
                .send(PipelineEvent::Sources {
                    sources: sources.clone(),
                })
                .await;
        }

        let answer = match self
            .generator
            .generate_raw(&prompts::shortcut_prompt(query, &context))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "shortcut generation failed");
                self.generator.render_error(query, &e.to_string(), &[]).await
            }
        };

        let confidence = Generator::confidence(&docs, true);
        (answer, sources, confidence, retrieved, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        started: Instant,
        session_id: String,
        answer: String,
        sources: Vec<SourceCitation>,
        confidence: f32,
        query_classification: String,
        retrieved_documents: usize,
        steps_executed: Vec<String>,
        function_calls: Option<Vec<FunctionCall>>,
        from_cache: bool,
    ) -> ChatResponse {
        ChatResponse {
            answer,
            sources,
            confidence,
            session_id,
            metadata: ResponseMetadata {
                processing_ms: started.elapsed().as_millis() as u64,
                steps_executed,
                retrieved_documents,
                query_classification,
                from_cache,
                function_calls,
            },
        }
    }

    /// Cache key over the normalised query; the session id joins in only
    /// when the scoping flag is on.
    fn cache_key(&self, query: &str, session_id: &str) -> String {
        let normalized = query.trim().to_lowercase();
        let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut hasher = Sha256::new();
        hasher.update(collapsed.as_bytes());
        if self.config.scope_response_cache_to_session {
            hasher.update([0]);
            hasher.update(session_id.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

fn quick_reply(kind: QuickIntent) -> String {
    let pool = match kind {
        QuickIntent::Greeting => GREETING_REPLIES,
        QuickIntent::Goodbye => GOODBYE_REPLIES,
        QuickIntent::Thanks => THANKS_REPLIES,
    };
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Hello!")
        .to_string()
}

fn matches_shortcut(query: &str) -> bool {
    let trimmed = query.trim();
    SHORTCUT_PATTERNS.iter().any(|re| re.is_match(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortcut_patterns() {
        assert!(matches_shortcut("list overdue tasks"));
        assert!(matches_shortcut("Show all tasks"));
        assert!(matches_shortcut("get in progress tasks"));
        assert!(matches_shortcut("list users"));
        assert!(!matches_shortcut("why is the database slow"));
        assert!(!matches_shortcut("list overdue tasks for Youssef"));
    }

    #[test]
    fn test_quick_reply_draws_from_pool() {
        let reply = quick_reply(QuickIntent::Greeting);
        assert!(GREETING_REPLIES.contains(&reply.as_str()));
    }
}
