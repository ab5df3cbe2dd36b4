use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnowballError>;

#[derive(Debug, Error)]
pub enum SnowballError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown starting set \"{name}\" (known sets: {known})")]
    UnknownSet { name: String, known: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("Credentials rejected by the API (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Target size {target} is smaller than the seed ({seed} channels)")]
    InvalidTarget { target: usize, seed: usize },
}

impl SnowballError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SnowballError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SnowballError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
