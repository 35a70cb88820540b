//! Application settings
//!
//! Layered configuration: defaults consult the recognised environment
//! variables, an optional `config/{env}.yaml` file overrides them, and a
//! prefixed environment source (`TASK_AGENT__`) overrides everything for
//! nested keys the flat variables don't reach.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{embedding, endpoints, history, response_cache, search};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Vector store configuration
    #[serde(default)]
    pub qdrant: QdrantConfig,

    /// LLM backends configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Relational store coordinates (owned by the entity services)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Entity CRUD service configuration
    #[serde(default)]
    pub entities: EntitiesConfig,

    /// Pipeline behaviour knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port (env: SERVER_PORT)
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Permit cross-origin requests
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            cors_enabled: true,
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Host name (env: QDRANT_HOST)
    #[serde(default = "default_qdrant_host")]
    pub host: String,

    /// Port (env: QDRANT_PORT)
    #[serde(default = "default_qdrant_port")]
    pub port: u16,

    /// API key (env: QDRANT_API_KEY)
    #[serde(default = "default_qdrant_api_key")]
    pub api_key: Option<String>,

    /// Use TLS (env: QDRANT_HTTPS)
    #[serde(default = "default_qdrant_https")]
    pub https: bool,

    /// Request timeout in seconds (env: QDRANT_TIMEOUT)
    #[serde(default = "default_qdrant_timeout")]
    pub timeout_secs: u64,

    /// Collection name (env: QDRANT_COLLECTION_NAME)
    #[serde(default = "default_qdrant_collection")]
    pub collection: String,

    /// Vector dimension (env: QDRANT_VECTOR_SIZE)
    #[serde(default = "default_qdrant_vector_size")]
    pub vector_size: usize,
}

fn default_qdrant_host() -> String {
    std::env::var("QDRANT_HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn default_qdrant_port() -> u16 {
    std::env::var("QDRANT_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(6334)
}

fn default_qdrant_api_key() -> Option<String> {
    std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty())
}

fn default_qdrant_https() -> bool {
    env_flag("QDRANT_HTTPS")
}

fn default_qdrant_timeout() -> u64 {
    std::env::var("QDRANT_TIMEOUT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30)
}

fn default_qdrant_collection() -> String {
    std::env::var("QDRANT_COLLECTION_NAME").unwrap_or_else(|_| "task_manager".to_string())
}

fn default_qdrant_vector_size() -> usize {
    std::env::var("QDRANT_VECTOR_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(embedding::DIM)
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            host: default_qdrant_host(),
            port: default_qdrant_port(),
            api_key: default_qdrant_api_key(),
            https: default_qdrant_https(),
            timeout_secs: default_qdrant_timeout(),
            collection: default_qdrant_collection(),
            vector_size: default_qdrant_vector_size(),
        }
    }
}

impl QdrantConfig {
    /// Connection URL for the gRPC client
    pub fn url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// LLM backends configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Ollama endpoint (env: OLLAMA_API_URL)
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Embedding model (env: OLLAMA_EMBEDDING_MODEL)
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Primary generation model (env: OLLAMA_LLM_MODEL)
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Fast model for classification and extraction (env: OLLAMA_FAST_LLM_MODEL)
    #[serde(default = "default_fast_llm_model")]
    pub fast_llm_model: String,

    /// Route completions through the hosted backend (env: USE_OPENAI)
    #[serde(default = "default_use_openai")]
    pub use_openai: bool,

    /// Hosted backend token (env: OPENAI_API_KEY)
    #[serde(default = "default_openai_api_key")]
    pub openai_api_key: Option<String>,

    /// Hosted backend base URL (env: OPENAI_API_BASE)
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,
}

fn default_ollama_url() -> String {
    endpoints::OLLAMA_DEFAULT.clone()
}

fn default_embedding_model() -> String {
    std::env::var("OLLAMA_EMBEDDING_MODEL").unwrap_or_else(|_| "nomic-embed-text".to_string())
}

fn default_llm_model() -> String {
    std::env::var("OLLAMA_LLM_MODEL").unwrap_or_else(|_| "llama3.1:8b".to_string())
}

fn default_fast_llm_model() -> String {
    std::env::var("OLLAMA_FAST_LLM_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string())
}

fn default_use_openai() -> bool {
    env_flag("USE_OPENAI")
}

fn default_openai_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

fn default_openai_api_base() -> String {
    endpoints::OPENAI_DEFAULT.clone()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            llm_model: default_llm_model(),
            fast_llm_model: default_fast_llm_model(),
            use_openai: default_use_openai(),
            openai_api_key: default_openai_api_key(),
            openai_api_base: default_openai_api_base(),
        }
    }
}

/// Relational store coordinates.
///
/// The pipeline never opens a SQL connection itself; these are recognised
/// so one environment file can configure the whole deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// env: DB_HOST
    #[serde(default = "default_db_host")]
    pub host: String,
    /// env: DB_PORT
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// env: DB_USERNAME
    #[serde(default = "default_db_username")]
    pub username: String,
    /// env: DB_PASSWORD
    #[serde(default = "default_db_password")]
    pub password: String,
    /// env: DB_NAME
    #[serde(default = "default_db_name")]
    pub name: String,
}

fn default_db_host() -> String {
    std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn default_db_port() -> u16 {
    std::env::var("DB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5432)
}

fn default_db_username() -> String {
    std::env::var("DB_USERNAME").unwrap_or_else(|_| "postgres".to_string())
}

fn default_db_password() -> String {
    std::env::var("DB_PASSWORD").unwrap_or_default()
}

fn default_db_name() -> String {
    std::env::var("DB_NAME").unwrap_or_else(|_| "task_manager".to_string())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            username: default_db_username(),
            password: default_db_password(),
            name: default_db_name(),
        }
    }
}

/// Entity CRUD service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesConfig {
    /// Base URL of the entity services (env: ENTITY_API_URL)
    #[serde(default = "default_entity_api_url")]
    pub api_url: String,
}

fn default_entity_api_url() -> String {
    endpoints::ENTITY_API_DEFAULT.clone()
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            api_url: default_entity_api_url(),
        }
    }
}

/// Pipeline behaviour knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Query response cache TTL (seconds)
    #[serde(default = "default_response_cache_ttl")]
    pub response_cache_ttl_secs: u64,

    /// Include the session id in the response cache key.
    ///
    /// Off by default: cached answers are shared across sessions for hit
    /// rate, at the cost of possible cross-session context leakage.
    #[serde(default)]
    pub scope_response_cache_to_session: bool,

    /// Key the completion cache on a digest of the retrieved context too
    #[serde(default)]
    pub llm_cache_includes_context: bool,

    /// Session mirror TTL (seconds)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Context compression token budget
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Dense score needed for the shortcut path
    #[serde(default = "default_shortcut_score")]
    pub shortcut_min_score: f32,
}

fn default_response_cache_ttl() -> u64 {
    response_cache::TTL_SECS
}

fn default_session_ttl() -> u64 {
    history::SESSION_TTL_SECS
}

fn default_max_context_tokens() -> usize {
    search::MAX_CONTEXT_TOKENS
}

fn default_shortcut_score() -> f32 {
    search::SHORTCUT_MIN_SCORE
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            response_cache_ttl_secs: default_response_cache_ttl(),
            scope_response_cache_to_session: false,
            llm_cache_includes_context: false,
            session_ttl_secs: default_session_ttl(),
            max_context_tokens: default_max_context_tokens(),
            shortcut_min_score: default_shortcut_score(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Load settings from files and environment.
///
/// `env` selects `config/{env}.yaml`; pass `None` for `config/default.yaml`
/// only. Missing files are fine — defaults already honour the flat
/// environment variables.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(env) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("TASK_AGENT").separator("__"))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let settings: Settings = config
        .try_deserialize()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Sanity-check values that would fail far from their source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.qdrant.vector_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "qdrant.vector_size".to_string(),
                message: "vector dimension must be positive".to_string(),
            });
        }
        if self.llm.use_openai && self.llm.openai_api_key.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "llm.openai_api_key".to_string(),
                message: "USE_OPENAI is set but OPENAI_API_KEY is missing".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.pipeline.shortcut_min_score) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.shortcut_min_score".to_string(),
                message: "must be within [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.qdrant.collection, "task_manager");
        assert_eq!(settings.qdrant.vector_size, embedding::DIM);
        assert!(!settings.pipeline.scope_response_cache_to_session);
    }

    #[test]
    fn test_qdrant_url() {
        let config = QdrantConfig {
            https: true,
            host: "qdrant.internal".into(),
            port: 6334,
            ..QdrantConfig::default()
        };
        assert_eq!(config.url(), "https://qdrant.internal:6334");
    }
}
