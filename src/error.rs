use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Transport-level failure: unreachable host, timeout, reset.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx status or a payload that does not match the wire shape.
    #[error("unexpected response ({status}): {message}")]
    Malformed { status: u16, message: String },

    #[error("not found")]
    NotFound,

    /// Durable-store failure. Logged and absorbed on the write path; the
    /// in-memory state stays authoritative.
    #[error("storage error: {0}")]
    Persistence(String),

    #[error("sync failed: {0}")]
    Sync(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    pub fn malformed(status: u16, message: impl Into<String>) -> Self {
        AppError::Malformed {
            status,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}
