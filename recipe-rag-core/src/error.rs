//! Error types for the recipe-rag core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the LLM endpoint, the vector store, embedding, indexing,
//! configuration and inbound request validation.

use std::path::PathBuf;

/// Top-level error type for the recipe-rag core library.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Indexing error: {0}")]
    Index(#[from] IndexError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conversation log error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Model not supported: {model}")]
    UnsupportedModel { model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the vector store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Vector store request failed: {message}")]
    Request { message: String },

    #[error("Vector store returned HTTP {status}: {body}")]
    Response { status: u16, body: String },

    #[error("Vector store response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Collection not found: {collection}")]
    CollectionMissing { collection: String },

    #[error("Vector space '{space}' is not declared on collection {collection}")]
    UnknownVectorSpace { collection: String, space: String },

    #[error("Dense vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {message}")]
    Request { message: String },

    #[error("Embedding response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedding API key not set (expected in ${env})")]
    MissingApiKey { env: String },

    #[error("Embedding model unavailable: {message}")]
    ModelUnavailable { message: String },

    #[error("Unknown embedding provider: {provider}")]
    UnknownProvider { provider: String },
}

/// Errors from reading and preparing the recipe source.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Recipe source not readable at {path}: {message}")]
    Source { path: PathBuf, message: String },

    #[error("Malformed recipe record {record}: {reason}")]
    MalformedRecord { record: String, reason: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Inbound request validation failures, raised before the pipeline runs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error("conversation_id is required")]
    MissingConversationId,

    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: usize, max: usize },
}

/// Errors from the conversation log.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Conversation database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Conversation log lock poisoned")]
    Poisoned,

    #[error("Conversation log task failed: {message}")]
    Task { message: String },
}

/// A type alias for results using the top-level `RagError`.
pub type Result<T> = std::result::Result<T, RagError>;
