//! Action executor flow against the in-memory entity store.
//!
//! The LLM is scripted and the vector store points at an unused port, so
//! these tests exercise extraction, resolution, dispatch and the
//! tolerate-stale-reindex policy without any live service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use task_agent_agent::{
    ActionExecutor, Classification, EntityResolver, Generator, QueryType,
};
use task_agent_core::{
    EntityKind, RetrievedDoc, ScoreKind, Task, TaskStatus, Team, User, UserRole,
};
use task_agent_entities::{EntityGateway, InMemoryEntityStore, TaskService};
use task_agent_indexer::Indexer;
use task_agent_llm::{CompletionOptions, LlmBackend, LlmError};
use task_agent_rag::{
    EmbeddingClient, EmbeddingConfig, Searcher, VectorStore, VectorStoreConfig,
};

/// Backend that replays a scripted sequence of completions.
struct ScriptedLlm {
    responses: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().rev().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(
        &self,
        _prompt: &str,
        _opts: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.responses
            .lock()
            .pop()
            .ok_or_else(|| LlmError::Generation("script exhausted".to_string()))
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
        Ok(vec![0.1, 0.2, 0.3, 0.4])
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    fn fast_model(&self) -> &str {
        "scripted-fast"
    }
}

struct Fixture {
    executor: ActionExecutor,
    store: Arc<InMemoryEntityStore>,
    task_id: String,
}

fn fixture(responses: Vec<&str>) -> Fixture {
    let store = Arc::new(InMemoryEntityStore::new());
    let now = Utc::now();

    store.insert_user(User {
        id: "U1".into(),
        name: "Youssef Mohamed".into(),
        email: "youssef@example.com".into(),
        role: UserRole::Member,
        team_id: Some("T1".into()),
        created_at: now,
        updated_at: now,
    });
    store.insert_team(Team {
        id: "T1".into(),
        name: "Backend Team".into(),
        owner_id: "U1".into(),
        project_id: None,
        created_at: now,
        updated_at: now,
    });
    store.insert_task(Task {
        id: "K1".into(),
        title: "Database Optimization".into(),
        description: None,
        status: TaskStatus::InProgress,
        assigned_to: Some("U1".into()),
        deadline: Some(now - chrono::Duration::days(2)),
        created_at: now,
        updated_at: now,
    });

    let gateway = EntityGateway::in_memory(store.clone());
    let llm: Arc<dyn LlmBackend> = Arc::new(ScriptedLlm::new(responses));

    // Port nothing listens on; reindex failures are tolerated by design.
    let vector_store = Arc::new(
        VectorStore::new(VectorStoreConfig {
            endpoint: "http://127.0.0.1:1".into(),
            timeout: Duration::from_millis(50),
            vector_dim: 4,
            ..VectorStoreConfig::default()
        })
        .expect("client construction is offline"),
    );
    let embeddings = Arc::new(EmbeddingClient::new(
        llm.clone(),
        EmbeddingConfig {
            dim: 4,
            ..EmbeddingConfig::default()
        },
    ));

    let searcher = Arc::new(Searcher::new(embeddings.clone(), vector_store.clone()));
    let indexer = Arc::new(Indexer::new(gateway.clone(), embeddings, vector_store));
    let resolver = Arc::new(EntityResolver::new(gateway.clone()));
    let generator = Arc::new(Generator::new(llm.clone()));

    let executor = ActionExecutor::new(gateway, searcher, resolver, indexer, generator, llm);
    Fixture {
        executor,
        store,
        task_id: "K1".into(),
    }
}

fn task_doc() -> RetrievedDoc {
    RetrievedDoc {
        id: "1".into(),
        score: 0.92,
        score_kind: ScoreKind::Dense,
        text: "Task: Database Optimization. Status: In Progress.".into(),
        entity_type: EntityKind::Task,
        entity_id: "K1".into(),
        metadata: HashMap::new(),
    }
}

fn classification(query_type: QueryType) -> Classification {
    Classification {
        query_type,
        entities: vec![EntityKind::Task],
    }
}

#[tokio::test]
async fn update_resolves_name_and_commits_status() {
    let fx = fixture(vec![
        r#"{"name": "update_task", "arguments": {"taskId": "Database Optimization", "status": "Done"}}"#,
    ]);

    let outcome = fx
        .executor
        .execute(
            "mark Database Optimization as done",
            &classification(QueryType::Update),
            &[],
            vec![task_doc()],
        )
        .await;

    assert_eq!(outcome.function_calls.len(), 1);
    let call = &outcome.function_calls[0];
    assert_eq!(call.name, "update_task");
    assert_eq!(call.arguments["taskId"], "K1");
    assert_eq!(call.arguments["status"], "done");
    assert!(outcome.answer.contains("Updated task"));

    let snapshot = TaskService::find_one(fx.store.as_ref(), &fx.task_id).await.unwrap();
    assert_eq!(snapshot.task.status, TaskStatus::Done);
}

#[tokio::test]
async fn create_with_assignee_resolution() {
    let fx = fixture(vec![
        r#"{"name": "create_task", "arguments": {"title": "Fix Login", "assignedTo": "Youssef"}}"#,
    ]);

    let outcome = fx
        .executor
        .execute(
            "create task 'Fix Login' and assign it to Youssef",
            &classification(QueryType::Create),
            &[],
            vec![task_doc()],
        )
        .await;

    assert_eq!(outcome.function_calls.len(), 1);
    assert_eq!(outcome.function_calls[0].arguments["assignedTo"], "U1");
    assert!(outcome.answer.contains("Created task \"Fix Login\""));

    let page = TaskService::find_all(fx.store.as_ref(), 1, 1000, Some("Fix Login")).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].assigned_to.as_deref(), Some("U1"));
}

#[tokio::test]
async fn missing_required_argument_blocks_dispatch() {
    let fx = fixture(vec![
        r#"{"name": "create_task", "arguments": {"assignedTo": "Youssef"}}"#,
    ]);

    let outcome = fx
        .executor
        .execute(
            "create a task for Youssef",
            &classification(QueryType::Create),
            &[],
            vec![task_doc()],
        )
        .await;

    assert!(outcome.function_calls.is_empty());
    assert!(outcome.answer.contains("title"));
    // Extracted arguments are echoed so the next turn can continue.
    assert!(outcome.answer.contains("[Extracted so far:"));
    assert!(outcome.answer.contains("assignedTo=\"Youssef\""));

    let page = TaskService::find_all(fx.store.as_ref(), 1, 1000, None).await.unwrap();
    assert_eq!(page.total, 1, "no task may be created");
}

#[tokio::test]
async fn unresolvable_reference_names_the_entity() {
    let fx = fixture(vec![
        r#"{"name": "create_task", "arguments": {"title": "Fix Login", "assignedTo": "Nonexistent Person"}}"#,
    ]);

    let outcome = fx
        .executor
        .execute(
            "create task 'Fix Login' for Nonexistent Person",
            &classification(QueryType::Create),
            &[],
            vec![task_doc()],
        )
        .await;

    assert!(outcome.function_calls.is_empty());
    assert!(outcome.answer.contains("Nonexistent Person"));

    let page = TaskService::find_all(fx.store.as_ref(), 1, 1000, Some("Fix Login")).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn delete_removes_the_entity() {
    let fx = fixture(vec![
        r#"{"name": "delete_task", "arguments": {"taskId": "Database Optimization"}}"#,
    ]);

    let outcome = fx
        .executor
        .execute(
            "delete the Database Optimization task",
            &classification(QueryType::Delete),
            &[],
            vec![task_doc()],
        )
        .await;

    assert_eq!(outcome.function_calls.len(), 1);
    assert!(outcome.answer.contains("Deleted"));
    assert!(TaskService::find_one(fx.store.as_ref(), &fx.task_id).await.is_err());
}
