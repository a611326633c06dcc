/// Errors surfaced by the store, the write endpoints and their clients.
///
/// Store messages are passed through verbatim: the user sees what the
/// backend said.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Config(String),

    #[error("{message}")]
    Backend { message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    /// Message shown to the user. API errors carry the endpoint's own text.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
