use thiserror::Error;

/// Error taxonomy for the engine.
///
/// Absence is never an error: repository lookups report "not there"
/// through `Option`/`bool` return channels, and `Err` always means the
/// operation itself failed.
#[derive(Debug, Error)]
pub enum SatchelError {
    /// The durable store could not complete an operation. A failed write
    /// leaves the store in its pre-call state.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The remote endpoint rejected the item or the transport failed.
    /// Subject to retry by the orchestrator.
    #[error("delivery failed: {message}")]
    Delivery {
        /// HTTP status, when the endpoint answered at all.
        status: Option<u16>,
        message: String,
    },

    /// The in-flight attempt was aborted via `cancel_current`. Counted
    /// as a transient failure for retry purposes.
    #[error("attempt cancelled")]
    Cancelled,

    #[error("payload codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SatchelError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn delivery(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Delivery {
            status,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for SatchelError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
