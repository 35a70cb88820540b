//! Intent classification
//!
//! Four stages, each pure given (query, history): regex-first quick
//! intents with a constrained LLM fallback, typed classification, query
//! reformulation, and filter extraction. Quick-intent LLM failures are
//! silent; classification parse failures degrade to a plain question.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use task_agent_config::constants::intent as tuning;
use task_agent_core::{EntityKind, TaskStatus, Turn};
use task_agent_llm::{CompletionOptions, LlmBackend};
use task_agent_rag::SearchFilter;

use crate::prompts;

static GREETING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(hi|hello|hey|howdy|greetings|good\s+(morning|afternoon|evening))\b")
        .expect("greeting pattern")
});

static GOODBYE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(bye|goodbye|farewell|see\s+you|good\s+night)\b").expect("goodbye pattern")
});

static THANKS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(thanks|thank\s+you|thx)\b").expect("thanks pattern"));

static CRUD_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(create|add|new|update|change|rename|assign|set|mark|delete|remove|complete)\b")
        .expect("crud verb pattern")
});

/// Conversational intents that bypass the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickIntent {
    Greeting,
    Goodbye,
    Thanks,
}

impl QuickIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuickIntent::Greeting => "greeting",
            QuickIntent::Goodbye => "goodbye",
            QuickIntent::Thanks => "thank",
        }
    }
}

/// Request type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Create,
    Update,
    Delete,
    Question,
    Search,
    List,
    Statistics,
    Help,
    Requirements,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Create => "create",
            QueryType::Update => "update",
            QueryType::Delete => "delete",
            QueryType::Question => "question",
            QueryType::Search => "search",
            QueryType::List => "list",
            QueryType::Statistics => "statistics",
            QueryType::Help => "help",
            QueryType::Requirements => "requirements",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "create" => Some(QueryType::Create),
            "update" => Some(QueryType::Update),
            "delete" => Some(QueryType::Delete),
            "question" => Some(QueryType::Question),
            "search" => Some(QueryType::Search),
            "list" => Some(QueryType::List),
            "statistics" => Some(QueryType::Statistics),
            "help" => Some(QueryType::Help),
            "requirements" => Some(QueryType::Requirements),
            _ => None,
        }
    }

    /// Write intents go through the action executor.
    pub fn is_action(&self) -> bool {
        matches!(self, QueryType::Create | QueryType::Update | QueryType::Delete)
    }

    /// Types answered from synthetic documents.
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            QueryType::Statistics | QueryType::Help | QueryType::Requirements
        )
    }
}

/// Typed classification result
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub query_type: QueryType,
    pub entities: Vec<EntityKind>,
}

impl Classification {
    pub fn fallback() -> Self {
        Self {
            query_type: QueryType::Question,
            entities: Vec::new(),
        }
    }

    pub fn primary_entity(&self) -> Option<EntityKind> {
        self.entities.first().copied()
    }
}

/// Filter spec extracted from a classification plus lexical cues
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// `entity_type` values; multiple values need OR semantics
    pub entity_types: Vec<EntityKind>,
    /// Synthetic-document target (`system_info` or `statistics`)
    pub special: Option<EntityKind>,
    pub is_overdue: bool,
    pub is_urgent: bool,
    pub task_status: Option<TaskStatus>,
}

impl FilterSpec {
    /// Translate into a store filter. A single entity type is a `must`
    /// condition; several become `should` alternatives.
    pub fn to_search_filter(&self) -> Option<SearchFilter> {
        let mut filter = SearchFilter::new();

        if let Some(special) = self.special {
            filter = filter.must("metadata.type", special.as_str());
        } else if self.entity_types.len() == 1 {
            filter = filter.must("entity_type", self.entity_types[0].as_str());
        } else {
            for kind in &self.entity_types {
                filter = filter.should("entity_type", kind.as_str());
            }
        }

        if self.is_overdue {
            filter = filter.must("metadata.is_overdue", true);
        }
        if self.is_urgent {
            filter = filter.must("metadata.is_urgent", true);
        }
        if let Some(status) = self.task_status {
            filter = filter.must("metadata.task_status", status.as_str());
        }

        if filter.is_empty() {
            None
        } else {
            Some(filter)
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    entities: Vec<String>,
}

/// Intent classifier
pub struct IntentClassifier {
    llm: Arc<dyn LlmBackend>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Regex-first quick intent detection.
    ///
    /// Falls back to a one-word LLM probe only for short queries without
    /// CRUD verbs; any probe failure means "no quick intent".
    pub async fn quick_intent(&self, query: &str) -> Option<QuickIntent> {
        if GREETING_RE.is_match(query) {
            return Some(QuickIntent::Greeting);
        }
        if GOODBYE_RE.is_match(query) {
            return Some(QuickIntent::Goodbye);
        }
        if THANKS_RE.is_match(query) {
            return Some(QuickIntent::Thanks);
        }

        if query.len() >= tuning::QUICK_INTENT_MAX_CHARS || CRUD_VERB_RE.is_match(query) {
            return None;
        }

        let opts = CompletionOptions {
            model: Some(self.llm.fast_model().to_string()),
            temperature: Some(0.0),
            max_tokens: Some(5),
            ..CompletionOptions::default()
        };
        let answer = self
            .llm
            .complete(&prompts::quick_intent_prompt(query), &opts)
            .await
            .ok()?;

        match answer.trim().to_lowercase().as_str() {
            "greeting" => Some(QuickIntent::Greeting),
            "goodbye" => Some(QuickIntent::Goodbye),
            "thank" | "thanks" => Some(QuickIntent::Thanks),
            _ => None,
        }
    }

    /// Typed classification with history for coreference.
    pub async fn classify(&self, query: &str, history: &[Turn]) -> Classification {
        let opts = CompletionOptions {
            model: Some(self.llm.fast_model().to_string()),
            temperature: Some(0.0),
            max_tokens: Some(100),
            ..CompletionOptions::default()
        };

        let raw = match self
            .llm
            .complete(&prompts::classification_prompt(query, history), &opts)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "classification call failed");
                return Classification::fallback();
            }
        };

        Self::parse_classification(&raw).unwrap_or_else(Classification::fallback)
    }

    fn parse_classification(raw: &str) -> Option<Classification> {
        let json = crate::actions::first_json_object(raw)?;
        let parsed: RawClassification = serde_json::from_str(&json).ok()?;
        let query_type = QueryType::parse(&parsed.r#type)?;

        let mut entities: Vec<EntityKind> = parsed
            .entities
            .iter()
            .filter_map(|e| EntityKind::parse(e))
            .filter(|k| matches!(k, EntityKind::User | EntityKind::Task | EntityKind::Team | EntityKind::Project))
            .collect();
        entities.dedup();

        Some(Classification {
            query_type,
            entities,
        })
    }

    /// Pure intent derivation from a classification.
    pub fn derive_intent(classification: &Classification) -> String {
        let suffix = match classification.query_type {
            QueryType::Create | QueryType::Update | QueryType::Delete => "management",
            QueryType::Question | QueryType::Search | QueryType::List | QueryType::Statistics => {
                "info"
            }
            _ => return "general".to_string(),
        };

        match classification.primary_entity() {
            Some(entity) => format!("{}_{}", entity.as_str(), suffix),
            None => "general".to_string(),
        }
    }

    /// Reformulate a query into focused search variants; the original is
    /// always first. Short queries skip the LLM entirely.
    pub async fn reformulate(&self, query: &str, history: &[Turn]) -> Vec<String> {
        if query.len() < tuning::REFORMULATE_MIN_CHARS {
            return vec![query.to_string()];
        }

        let opts = CompletionOptions {
            model: Some(self.llm.fast_model().to_string()),
            temperature: Some(0.3),
            max_tokens: Some(100),
            ..CompletionOptions::default()
        };

        let raw = match self
            .llm
            .complete(&prompts::reformulation_prompt(query, history), &opts)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(error = %e, "reformulation failed, using original query");
                return vec![query.to_string()];
            }
        };

        let mut queries = vec![query.to_string()];
        for line in raw.lines() {
            let variant = line.trim().trim_start_matches(['-', '*', ' ']).trim();
            if variant.is_empty() || variant.eq_ignore_ascii_case(query) {
                continue;
            }
            let words = variant.split_whitespace().count();
            if !(2..=5).contains(&words) {
                continue;
            }
            if queries.iter().any(|q| q.eq_ignore_ascii_case(variant)) {
                continue;
            }
            queries.push(variant.to_string());
            if queries.len() > tuning::MAX_VARIANTS {
                break;
            }
        }
        queries
    }

    /// Filter extraction from classification plus lexical cues in the
    /// query. Entity sets are sorted, so reordering the input cannot
    /// change the result.
    pub fn extract_filters(classification: &Classification, query: &str) -> FilterSpec {
        let mut spec = FilterSpec::default();

        match classification.query_type {
            QueryType::Statistics => spec.special = Some(EntityKind::Statistics),
            QueryType::Help | QueryType::Requirements => {
                spec.special = Some(EntityKind::SystemInfo)
            }
            _ => {
                let mut kinds = classification.entities.clone();
                kinds.sort_by_key(|k| k.as_str());
                kinds.dedup();
                spec.entity_types = kinds;
            }
        }

        let folded = query.to_lowercase();
        if folded.contains("overdue") {
            spec.is_overdue = true;
        }
        if folded.contains("urgent") {
            spec.is_urgent = true;
        }
        if folded.contains("in progress") || folded.contains("in_progress") {
            spec.task_status = Some(TaskStatus::InProgress);
        } else if folded.contains("to do") || folded.contains("todo") {
            spec.task_status = Some(TaskStatus::Todo);
        } else if folded.contains("done") || folded.contains("completed") {
            spec.task_status = Some(TaskStatus::Done);
        }

        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use task_agent_llm::LlmError;
    use tokio::sync::mpsc;

    struct CannedLlm {
        response: String,
    }

    #[async_trait]
    impl LlmBackend for CannedLlm {
        async fn complete(
            &self,
            _prompt: &str,
            _opts: &CompletionOptions,
        ) -> Result<String, LlmError> {
            Ok(self.response.clone())
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
            "canned"
        }

        fn fast_model(&self) -> &str {
            "canned-fast"
        }
    }

    fn classifier(response: &str) -> IntentClassifier {
        IntentClassifier::new(Arc::new(CannedLlm {
            response: response.to_string(),
        }))
    }

    #[tokio::test]
    async fn test_quick_intent_regex_first() {
        // The canned LLM would answer "none"; regex must win before it.
        let c = classifier("none");
        assert_eq!(c.quick_intent("hello").await, Some(QuickIntent::Greeting));
        assert_eq!(c.quick_intent("Good morning!").await, Some(QuickIntent::Greeting));
        assert_eq!(c.quick_intent("bye now").await, Some(QuickIntent::Goodbye));
        assert_eq!(c.quick_intent("thanks a lot").await, Some(QuickIntent::Thanks));
    }

    #[tokio::test]
    async fn test_quick_intent_skips_llm_for_crud_and_long_queries() {
        // LLM says "greeting", but CRUD verbs and long queries never reach it.
        let c = classifier("greeting");
        assert_eq!(c.quick_intent("create a task for me").await, None);
        let long = "x".repeat(60);
        assert_eq!(c.quick_intent(&long).await, None);
    }

    #[tokio::test]
    async fn test_classification_parses_json() {
        let c = classifier(r#"{"type": "list", "entities": ["task"]}"#);
        let result = c.classify("show me all overdue tasks", &[]).await;
        assert_eq!(result.query_type, QueryType::List);
        assert_eq!(result.entities, vec![EntityKind::Task]);
    }

    #[tokio::test]
    async fn test_classification_falls_back_on_garbage() {
        let c = classifier("I am not JSON");
        let result = c.classify("anything", &[]).await;
        assert_eq!(result.query_type, QueryType::Question);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_derive_intent() {
        let c = Classification {
            query_type: QueryType::Create,
            entities: vec![EntityKind::Task, EntityKind::User],
        };
        assert_eq!(IntentClassifier::derive_intent(&c), "task_management");

        let c = Classification {
            query_type: QueryType::List,
            entities: vec![EntityKind::User],
        };
        assert_eq!(IntentClassifier::derive_intent(&c), "user_info");

        let c = Classification {
            query_type: QueryType::Help,
            entities: vec![EntityKind::Task],
        };
        assert_eq!(IntentClassifier::derive_intent(&c), "general");

        // Pure: same input, same output.
        assert_eq!(
            IntentClassifier::derive_intent(&c),
            IntentClassifier::derive_intent(&c)
        );
    }

    #[tokio::test]
    async fn test_reformulate_short_query_skips_llm() {
        let c = classifier("overdue tasks\nlate work items");
        let queries = c.reformulate("overdue?", &[]).await;
        assert_eq!(queries, vec!["overdue?".to_string()]);
    }

    #[tokio::test]
    async fn test_reformulate_keeps_original_first() {
        let c = classifier("overdue tasks\nlate work items\nnoise that is far too long to keep around");
        let queries = c.reformulate("show me everything overdue", &[]).await;
        assert_eq!(queries[0], "show me everything overdue");
        assert!(queries.contains(&"overdue tasks".to_string()));
        assert!(queries.len() <= 5);
    }

    #[test]
    fn test_extract_filters_specials() {
        let stats = Classification {
            query_type: QueryType::Statistics,
            entities: vec![],
        };
        let spec = IntentClassifier::extract_filters(&stats, "how many tasks");
        assert_eq!(spec.special, Some(EntityKind::Statistics));

        let help = Classification {
            query_type: QueryType::Help,
            entities: vec![],
        };
        let spec = IntentClassifier::extract_filters(&help, "what can you do");
        assert_eq!(spec.special, Some(EntityKind::SystemInfo));
    }

    #[test]
    fn test_extract_filters_lexical_cues() {
        let c = Classification {
            query_type: QueryType::List,
            entities: vec![EntityKind::Task],
        };
        let spec = IntentClassifier::extract_filters(&c, "Show me all overdue tasks");
        assert!(spec.is_overdue);
        assert_eq!(spec.entity_types, vec![EntityKind::Task]);

        let filter = spec.to_search_filter().unwrap();
        assert_eq!(filter.must.len(), 2);
        assert!(filter.should.is_empty());

        let spec = IntentClassifier::extract_filters(&c, "tasks in progress");
        assert_eq!(spec.task_status, Some(TaskStatus::InProgress));
    }

    #[test]
    fn test_extract_filters_commutes_over_entity_order() {
        let ab = Classification {
            query_type: QueryType::Search,
            entities: vec![EntityKind::Task, EntityKind::User],
        };
        let ba = Classification {
            query_type: QueryType::Search,
            entities: vec![EntityKind::User, EntityKind::Task],
        };
        let query = "things assigned to Youssef";
        assert_eq!(
            IntentClassifier::extract_filters(&ab, query),
            IntentClassifier::extract_filters(&ba, query)
        );

        // Multiple kinds become should-alternatives.
        let filter = IntentClassifier::extract_filters(&ab, query)
            .to_search_filter()
            .unwrap();
        assert_eq!(filter.should.len(), 2);
    }
}
