use thiserror::Error;

/// Failures the feed can observe while talking to the catalogue backend.
///
/// Queue exhaustion and history boundaries are not errors: the queue engine regenerates
/// itself and the history log answers `None`.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid server address: {0}")]
    Address(#[from] url::ParseError),
}

impl FeedError {
    /// Message suitable for the error state / notification area.
    pub fn user_message(&self) -> String {
        match self {
            FeedError::Network(_) | FeedError::Address(_) => String::from("Failed to load videos"),
            other => other.to_string(),
        }
    }
}
