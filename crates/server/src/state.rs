//! Application state
//!
//! Builds the component graph once at startup and shares it across
//! handlers. No globals: every component is constructed here and owned
//! through `Arc`s.

use std::sync::Arc;
use std::time::Duration;

use task_agent_agent::{
    ActionExecutor, ConversationStore, EntityResolver, Generator, IntentClassifier, Pipeline,
};
use task_agent_config::Settings;
use task_agent_core::Result;
use task_agent_entities::{EntityClientConfig, EntityGateway, HttpEntityClient};
use task_agent_indexer::Indexer;
use task_agent_llm::build_backend;
use task_agent_rag::{
    EmbeddingClient, EmbeddingConfig, Searcher, VectorStore, VectorStoreConfig,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub indexer: Arc<Indexer>,
    pub store: Arc<VectorStore>,
}

impl AppState {
    /// Wire every component from settings.
    pub fn build(settings: &Settings) -> Result<Self> {
        let llm = build_backend(&settings.llm)?;

        let store = Arc::new(VectorStore::new(VectorStoreConfig {
            endpoint: settings.qdrant.url(),
            collection: settings.qdrant.collection.clone(),
            vector_dim: settings.qdrant.vector_size,
            api_key: settings.qdrant.api_key.clone(),
            timeout: Duration::from_secs(settings.qdrant.timeout_secs),
        })?);

        let embeddings = Arc::new(EmbeddingClient::new(
            llm.clone(),
            EmbeddingConfig {
                model: settings.llm.embedding_model.clone(),
                dim: settings.qdrant.vector_size,
                ..EmbeddingConfig::default()
            },
        ));

        let entity_client = Arc::new(HttpEntityClient::new(EntityClientConfig {
            base_url: settings.entities.api_url.clone(),
            ..EntityClientConfig::default()
        })?);
        let gateway = EntityGateway::new(
            entity_client.clone(),
            entity_client.clone(),
            entity_client.clone(),
            entity_client,
        );

        let searcher = Arc::new(Searcher::new(embeddings.clone(), store.clone()));
        let indexer = Arc::new(Indexer::new(gateway.clone(), embeddings, store.clone()));
        let resolver = Arc::new(EntityResolver::new(gateway.clone()));
        let generator = Arc::new(Generator::new(llm.clone()));

        let actions = Arc::new(ActionExecutor::new(
            gateway,
            searcher.clone(),
            resolver,
            indexer.clone(),
            generator.clone(),
            llm.clone(),
        ));

        let history = Arc::new(ConversationStore::new(
            llm.clone(),
            Duration::from_secs(settings.pipeline.session_ttl_secs),
        ));
        let intents = Arc::new(IntentClassifier::new(llm));

        let pipeline = Arc::new(Pipeline::new(
            settings.pipeline.clone(),
            history,
            intents,
            searcher,
            actions,
            generator,
        ));

        Ok(Self {
            pipeline,
            indexer,
            store,
        })
    }
}
