#![forbid(unsafe_code)]
//! Streaming clients for newline-delimited JSON record feeds.
//!
//! Two pipelines share the ingestion loop from [`ndjson_ingest`]:
//! - [`HttpRecordStream`] reads a chunked HTTP response body (`reqwest`) and reports each
//!   record as it arrives, finishing with `on_complete` or failing with `on_error`.
//! - [`SocketStreamClient`] keeps a WebSocket connection (`tokio-tungstenite`) behind an
//!   explicit `disconnected -> connecting -> connected` state machine, with state changes
//!   published on a `watch` channel.
//!
//! Per-line failures never stop a stream; they are handed to
//! [`StreamObserver::on_line_error`] and ingestion continues.
//!
//! ```no_run
//! use record_stream::{ConnectionState, Record, SharedCollector, SocketStreamClient, StreamConfig};
//!
//! # async fn demo() -> Result<(), record_stream::StreamError> {
//! let collector = SharedCollector::<Record>::new();
//! let client = SocketStreamClient::websocket(&StreamConfig::default(), collector.clone());
//! client.connect()?;
//! client.wait_for_state(ConnectionState::Connected).await?;
//! // ...
//! client.disconnect()?;
//! client.wait_for_state(ConnectionState::Disconnected).await?;
//! println!("{} records", collector.with(|c| c.records.len()));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod events;
mod handle;
mod http;
mod observer;
pub mod socket;

pub use config::{
    FrameMode, SocketOptions, StreamConfig, DEFAULT_CLOSE_REASON, DEFAULT_HTTP_URL,
    DEFAULT_SOCKET_URL, DEFAULT_TRIGGER_PAYLOAD,
};
pub use error::{ConfigError, StreamError, TransportError};
pub use events::RecordStream;
pub use handle::{CancelFlag, StreamHandle};
pub use http::{open_chunked_body, ChunkStream, HttpRecordStream, HttpStreamPipeline};
pub use observer::{
    Callbacks, DiagnosticLog, LogEntry, RecordCollector, Severity, SharedCollector,
    StreamObserver, StreamSummary,
};
pub use socket::{ConnectionState, SocketStreamClient};

pub use ndjson_ingest::{
    EnvelopeDecoder, IngestConfig, IngestLimits, LineDecoder, LineError, LineErrorKind,
    LineRecord, Record, RecordId, TrailingFragment,
};
