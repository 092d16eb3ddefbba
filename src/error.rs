//! Error types for binding and routing.

use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for binder, transport and router operations.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport is closed")]
    TransportClosed,

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("No url to derive a topic from")]
    MissingUrl,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("Expected a JSON array body, got {0}")]
    NotAnArray(&'static str),

    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Broker error: {0}")]
    Broker(String),
}

/// Result type for binder, transport and router operations.
pub type Result<T> = std::result::Result<T, BindError>;
