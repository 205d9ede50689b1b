use thiserror::Error;

/// Fatal at boot: rejected before any engine starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stream configuration is not valid JSON: {0}")]
    Malformed(String),

    #[error("duplicate stream name: {0}")]
    DuplicateStreamName(String),

    #[error("stream {stream} references unregistered strategy id {strategy_id}")]
    UnknownStrategy { stream: String, strategy_id: String },

    #[error("stream {0} has an invalid session window")]
    InvalidSessionWindow(String),
}

/// Errors surfaced by the broker contract. `Transient` drives the
/// retry/backoff helper in `engine::retry`; `Permanent` fails the current
/// cycle without retrying.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("transient broker error: {0}")]
    Transient(String),

    #[error("permanent broker error: {0}")]
    Permanent(String),
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient(_))
    }
}

/// Wraps `sqlx::Error`; a write conflict is retried once by the repository
/// before escalating to `EngineError::InvariantViolation`.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("write would violate a lifecycle invariant: {0}")]
    InvariantViolation(String),
}

/// A bug, not an expected failure mode: logged with full diagnostic and
/// halts the offending engine only. Other engines keep running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invariant violation in stream {stream}: {detail}")]
    InvariantViolation { stream: String, detail: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
