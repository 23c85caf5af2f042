use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Action error: {0}")]
    Action(String),

    #[error("No pending action request for conversation '{0}'")]
    NoPendingRequest(String),

    #[error("Conversation '{0}' has an unresolved pending action request")]
    PendingDecision(String),

    #[error("Invalid decision payload: {0}")]
    InvalidDecision(String),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
