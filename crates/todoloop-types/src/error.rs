use thiserror::Error;

/// Errors from repository operations (used by trait definitions in todoloop-core).
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

/// The caller's event sink refused an event.
#[derive(Debug, Clone, Error)]
#[error("event sink closed: {0}")]
pub struct SinkError(pub String);

/// The event bus did not accept a published event.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("no subscribers listening")]
    NoSubscribers,

    #[error("publish failed: {0}")]
    Failed(String),
}

/// Errors loading the global configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}
