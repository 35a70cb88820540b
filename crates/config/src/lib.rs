//! Configuration for the task-manager assistant
//!
//! Settings are layered: built-in defaults that honour the recognised
//! environment variables, optional YAML files, then a prefixed environment
//! source for nested overrides. [`constants`] carries the algorithmic
//! defaults that are not operator-tunable.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, DatabaseConfig, EntitiesConfig, LlmSettings, ObservabilityConfig,
    PipelineConfig, QdrantConfig, ServerConfig, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
