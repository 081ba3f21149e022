use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors. Every variant's `Display` output is the user-facing
/// text; full diagnostic detail goes to the tracing log at the point of
/// failure, never into these messages.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The statement or query document was rejected before reaching the
    /// backend (non-SELECT, denied keyword, malformed JSON, dialect
    /// mismatch, unknown name).
    #[error("{0}")]
    InvalidQuery(String),

    /// The backend rejected the operation; `context` carries the list of
    /// known names to steer the next attempt.
    #[error("{message}{context}")]
    Execution { message: String, context: String },

    /// A schema probe failed for one name.
    #[error("{0}")]
    Probe(String),

    /// A chart could not be produced (missing precondition, unknown
    /// column, nothing numeric to aggregate).
    #[error("{0}")]
    Chart(String),
}
