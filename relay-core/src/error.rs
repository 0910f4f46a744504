use thiserror::Error;

/// Core error type for the relay.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
///
/// The orchestrator is the single place where these are converted into
/// user-facing text; raw variants never cross an HTTP handler.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no usable credentials: {0}")]
    Configuration(String),

    #[error("rate limited by provider {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("provider unavailable: {provider}")]
    Unavailable { provider: String },

    #[error("request to {provider} timed out")]
    Timeout { provider: String },

    #[error("upstream error from {provider}: {code} {message}")]
    Upstream {
        provider: String,
        code: String,
        message: String,
    },

    #[error("unparseable payload from {provider}: {message}")]
    Protocol { provider: String, message: String },

    #[error("stream aborted: sink closed before completion")]
    StreamAborted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, RelayError>;
