//! Demo server wiring: config, static assets and the router loop.

pub mod config;
pub mod http;

pub use config::{HttpConfig, ServerConfig};

use crate::error::BindError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("config {context}: {detail}")]
    Config {
        context: &'static str,
        detail: String,
    },

    #[error("broker: {0}")]
    Broker(#[from] BindError),

    #[error("http: {0}")]
    Http(String),
}
