// Error types shared by the transports and services
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// No bearer credential configured
    #[error("no API credential available")]
    MissingCredential,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("push transport error: {0}")]
    Transport(String),

    #[error("push transport is not connected")]
    NotConnected,

    #[error("push transport already connected")]
    AlreadyConnected,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
