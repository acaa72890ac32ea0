//! Error types for restyle-core.
//!
//! None of these cross the worker boundary: the worker turns every failure
//! into status, log, or banner events before anything reaches the UI.

/// Top-level error type for the core library.
#[derive(Debug, thiserror::Error)]
pub enum RestyleError {
    /// Model download or load failed.
    #[error("model load failed: {0}")]
    Load(String),

    /// Token generation failed for a reason other than interruption.
    #[error("generation failed: {0}")]
    Generation(String),

    /// HTTP transport error talking to the model server.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encode/decode error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The other side of a command or event channel went away.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RestyleError>;
