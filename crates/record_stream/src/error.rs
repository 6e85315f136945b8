use std::{path::PathBuf, time::Duration};

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the underlying chunked-HTTP or socket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to `{url}` failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{url}` answered with non-success status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed reading response body: {0}")]
    Body(#[source] reqwest::Error),
    #[error("websocket failure: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),
    #[error("connecting to `{url}` timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("transport failure: {0}")]
    Other(String),
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        TransportError::WebSocket(Box::new(err))
    }
}

/// Errors surfaced to stream consumers.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("record stream idle for {idle_for:?}")]
    IdleTimeout { idle_for: Duration },
    #[error("failed to join stream task: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("socket driver has shut down")]
    DriverClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
