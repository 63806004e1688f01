//! Top-level error types for tipscout.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Bearer token check failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("authorization header is not a bearer token")]
    NotBearer,

    #[error("invalid bearer token")]
    InvalidToken,
}

/// Messaging network (session, history, media) errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("failed to connect session: {0}")]
    Connect(String),

    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("chat {chat_id} not found")]
    ChatNotFound { chat_id: String },

    #[error("messaging request failed: {0}")]
    Request(String),

    #[error("messaging API error ({code}): {description}")]
    Api { code: i64, description: String },
}

/// Object store upload errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to decode image {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("upload request failed: {0}")]
    Request(String),

    #[error("storage rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Language-model API and response parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("provider returned an error ({status}): {message}")]
    ProviderStatus { status: u16, message: String },

    #[error("failed to load image {source_ref}: {reason}")]
    ImageFetch { source_ref: String, reason: String },

    #[error("model response is not a valid tip object: {reason}; raw: {raw}")]
    Parse { reason: String, raw: String },
}
