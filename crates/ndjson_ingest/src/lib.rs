#![forbid(unsafe_code)]
//! Ingestion primitives for newline-delimited JSON record streams.
//!
//! This crate performs no I/O. It provides:
//! - [`LineAssembler`]: turns arbitrary text chunks into complete lines, retaining the
//!   trailing fragment between feeds.
//! - [`Utf8ChunkDecoder`]: turns byte chunks into text without splitting multi-byte sequences.
//! - [`EnvelopeDecoder`]: decodes one line into a [`Record`], accepting both the wrapped
//!   (`{"result": {...}}`) and bare envelope shapes.
//! - [`LineIngestor`]: the loop shared by every transport pipeline, combining the above and
//!   classifying per-line failures as recoverable [`LineError`]s.

mod assembler;
mod config;
mod decoder;
mod error;
mod ingest;
mod record;
mod text;

pub use assembler::LineAssembler;
pub use config::{IngestConfig, IngestLimits, TrailingFragment};
pub use decoder::{DecodeError, EnvelopeDecoder, LineDecoder, UpstreamStatus};
pub use error::{LineError, LineErrorKind, LineRecord};
pub use ingest::LineIngestor;
pub use record::{Record, RecordId};
pub use text::Utf8ChunkDecoder;
