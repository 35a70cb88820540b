//! Centralized constants
//!
//! Single source of truth for the tuning values used across the pipeline.
//! Anything an operator may want to override at runtime lives in
//! [`crate::Settings`] instead; these are the algorithmic defaults.

/// Service endpoints (loaded from env vars with fallback defaults)
pub mod endpoints {
    use once_cell::sync::Lazy;

    /// Ollama API endpoint (env: OLLAMA_API_URL)
    pub static OLLAMA_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("OLLAMA_API_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
    });

    /// OpenAI-compatible API base (env: OPENAI_API_BASE)
    pub static OPENAI_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
    });

    /// Entity CRUD service base URL (env: ENTITY_API_URL)
    pub static ENTITY_API_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("ENTITY_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
    });
}

/// Embedding defaults
pub mod embedding {
    /// Vector dimension
    pub const DIM: usize = 768;

    /// Input truncated to this many characters before embedding
    pub const MAX_CHARS: usize = 32_000;

    /// Batch embedding chunk size
    pub const BATCH_SIZE: usize = 10;

    /// Embedding cache TTL (seconds)
    pub const CACHE_TTL_SECS: u64 = 3_600;
}

/// LLM client defaults
pub mod llm {
    /// Completion request timeout (seconds)
    pub const COMPLETION_TIMEOUT_SECS: u64 = 120;

    /// Embedding request timeout (seconds)
    pub const EMBEDDING_TIMEOUT_SECS: u64 = 30;

    /// Retry budget for completions
    pub const COMPLETION_RETRIES: u32 = 2;

    /// Retry budget for embeddings
    pub const EMBEDDING_RETRIES: u32 = 3;

    /// Initial retry backoff (milliseconds), doubles each attempt
    pub const INITIAL_BACKOFF_MS: u64 = 200;

    /// Completion cache TTL (seconds)
    pub const CACHE_TTL_SECS: u64 = 600;

    /// Token cap for streamed answers
    pub const STREAM_MAX_TOKENS: usize = 500;
}

/// Vector store defaults
pub mod vector_store {
    /// HNSW graph connectivity
    pub const HNSW_M: u64 = 16;

    /// HNSW construction beam width
    pub const HNSW_EF_CONSTRUCT: u64 = 100;

    /// Vectors below this count are searched unindexed
    pub const INDEXING_THRESHOLD: u64 = 10_000;

    /// Retry budget for transport failures
    pub const MAX_RETRIES: u32 = 3;

    /// Initial retry backoff (milliseconds)
    pub const INITIAL_BACKOFF_MS: u64 = 100;
}

/// Search tuning
pub mod search {
    /// Dense search result cap
    pub const VECTOR_TOP_K: usize = 10;

    /// Sparse search result cap
    pub const BM25_TOP_K: usize = 10;

    /// Candidate pool scrolled for sparse scoring
    pub const BM25_CANDIDATES: usize = 60;

    /// BM25 term-frequency saturation
    pub const BM25_K1: f32 = 1.2;

    /// BM25 length normalisation
    pub const BM25_B: f32 = 0.75;

    /// Tokens this short are dropped before sparse scoring
    pub const MIN_TOKEN_LEN: usize = 2;

    /// RRF rank constant
    pub const RRF_K: f32 = 60.0;

    /// Docs kept after rerank
    pub const RERANK_TOP: usize = 10;

    /// MMR relevance/diversity trade-off
    pub const MMR_LAMBDA: f32 = 0.85;

    /// Docs selected by MMR
    pub const MMR_SELECT: usize = 5;

    /// MMR only runs at or above this many reranked docs
    pub const MMR_MIN_DOCS: usize = 5;

    /// Context compression token budget
    pub const MAX_CONTEXT_TOKENS: usize = 3_000;

    /// Rough characters-per-token ratio used by compression
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Citation preview length (characters)
    pub const CITATION_PREVIEW_CHARS: usize = 200;

    /// Dense score needed for the orchestrator shortcut path
    pub const SHORTCUT_MIN_SCORE: f32 = 0.80;
}

/// Conversation history bounds
pub mod history {
    /// Hard cap on non-summary turns per session
    pub const MAX_TURNS: usize = 10;

    /// Summarisation kicks in at this length
    pub const SUMMARIZE_THRESHOLD: usize = 8;

    /// Turns preserved verbatim through summarisation
    pub const KEEP_RECENT: usize = 3;

    /// Fewer old turns than this skips summarisation
    pub const MIN_FOLD: usize = 3;

    /// Summary length cap (tokens)
    pub const SUMMARY_MAX_TOKENS: usize = 300;

    /// Summary generation temperature
    pub const SUMMARY_TEMPERATURE: f32 = 0.3;

    /// Session mirror TTL (seconds)
    pub const SESSION_TTL_SECS: u64 = 1_800;
}

/// Generation tuning
pub mod generation {
    /// Temperature for statistics answers
    pub const STATISTICS_TEMPERATURE: f32 = 0.3;

    /// Temperature for everything else
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Parameter extraction temperature
    pub const EXTRACTION_TEMPERATURE: f32 = 0.1;

    /// Answer token overlap must exceed this to count as grounded
    pub const GROUNDING_THRESHOLD: f32 = 0.30;

    /// Confidence bonus for grounded answers
    pub const GROUNDING_BONUS: f32 = 0.2;

    /// History turns included in the answer prompt
    pub const PROMPT_HISTORY_TURNS: usize = 2;
}

/// Response cache
pub mod response_cache {
    /// Query response cache TTL (seconds)
    pub const TTL_SECS: u64 = 300;
}

/// Intent classification
pub mod intent {
    /// Queries shorter than this skip LLM reformulation
    pub const REFORMULATE_MIN_CHARS: usize = 15;

    /// Queries at or above this length skip the quick-intent LLM probe
    pub const QUICK_INTENT_MAX_CHARS: usize = 50;

    /// Reformulation variant cap (original query excluded)
    pub const MAX_VARIANTS: usize = 4;
}

/// Entity resolution
pub mod resolver {
    /// Page size used when listing entities for name matching
    pub const LIST_PAGE_SIZE: usize = 1_000;
}

/// Action execution
pub mod actions {
    /// Docs kept per forced entity kind during reference retrieval
    pub const CONTEXT_TOP_K: usize = 5;

    /// History turns included in the extraction prompt
    pub const EXTRACTION_HISTORY_TURNS: usize = 4;
}
