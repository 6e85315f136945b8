use tracing::{debug, warn};

use crate::assembler::LineAssembler;
use crate::config::{IngestConfig, TrailingFragment};
use crate::decoder::LineDecoder;
use crate::error::{LineError, LineErrorKind, LineRecord};
use crate::text::Utf8ChunkDecoder;

/// Line-oriented ingestion loop shared by the transport pipelines.
///
/// Owns the assembler, the streaming text decoder and the record decoder of exactly one stream
/// session. Per-line failures come back as `Err` outcomes; nothing here is fatal.
pub struct LineIngestor<D: LineDecoder> {
    assembler: LineAssembler,
    text: Utf8ChunkDecoder,
    decoder: D,
    config: IngestConfig,
    line_number: usize,
    /// Bytes dropped so far from a line that outgrew `max_line_bytes`.
    overflow: Option<usize>,
}

impl<D: LineDecoder> LineIngestor<D> {
    pub fn new(decoder: D, config: IngestConfig) -> Self {
        Self {
            assembler: LineAssembler::new(),
            text: Utf8ChunkDecoder::new(),
            decoder,
            config,
            line_number: 0,
            overflow: None,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Number of lines seen in the current session, blank ones included.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Bytes held back waiting for a newline or for the rest of a UTF-8 sequence.
    pub fn pending_bytes(&self) -> usize {
        self.assembler.pending_bytes() + self.text.pending_bytes()
    }

    /// Feeds a raw byte chunk, decoding it as UTF-8 across chunk boundaries.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<LineRecord<D::Record>> {
        let text = self.text.decode(bytes);
        self.push_text(&text)
    }

    /// Feeds a text chunk and returns the outcome of every non-blank line it completes.
    pub fn push_text(&mut self, text: &str) -> Vec<LineRecord<D::Record>> {
        let lines = self.assembler.feed(text);
        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            self.line_number += 1;
            if let Some(dropped) = self.overflow.take() {
                out.push(self.too_long(self.line_number, dropped + line.len(), &line));
                continue;
            }
            if let Some(record) = self.decode_line(self.line_number, &line) {
                out.push(record);
            }
        }
        self.enforce_fragment_limit();
        out
    }

    /// Treats the retained fragment as a complete line, for transports whose frames are
    /// self-delimiting.
    pub fn end_frame(&mut self) -> Option<LineRecord<D::Record>> {
        let fragment = self.assembler.take_fragment();
        if let Some(dropped) = self.overflow.take() {
            self.line_number += 1;
            return Some(self.too_long(self.line_number, dropped + fragment.len(), &fragment));
        }
        if fragment.trim().is_empty() {
            return None;
        }
        self.line_number += 1;
        self.decode_line(self.line_number, &fragment)
    }

    /// Ends the stream, applying the configured [`TrailingFragment`] policy.
    pub fn finish(&mut self) -> Option<LineRecord<D::Record>> {
        let tail = self.text.finish();
        if !tail.is_empty() {
            self.assembler.feed(&tail);
        }
        let fragment = self.assembler.take_fragment();

        if let Some(dropped) = self.overflow.take() {
            warn!(
                bytes = dropped + fragment.len(),
                "discarding oversized unterminated line at end of stream"
            );
            return None;
        }
        if fragment.trim().is_empty() {
            return None;
        }

        let line_number = self.line_number + 1;
        match self.config.trailing_fragment {
            TrailingFragment::Discard => {
                warn!(
                    line_number,
                    bytes = fragment.len(),
                    "discarding unterminated line at end of stream"
                );
                None
            }
            TrailingFragment::DecodeIfComplete => {
                let line = fragment.strip_suffix('\r').unwrap_or(&fragment);
                match self.decoder.decode(line) {
                    Ok(Some(record)) => {
                        self.line_number = line_number;
                        Some(LineRecord {
                            line_number,
                            outcome: Ok(record),
                        })
                    }
                    Ok(None) => None,
                    Err(err) => {
                        debug!(
                            line_number,
                            kind = err.kind.as_str(),
                            "unterminated line at end of stream is not a complete record"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Clears all per-session state so the next chunk starts a fresh stream.
    pub fn reset(&mut self) {
        self.assembler.reset();
        self.text.reset();
        self.decoder.reset();
        self.line_number = 0;
        self.overflow = None;
    }

    fn decode_line(&mut self, line_number: usize, raw: &str) -> Option<LineRecord<D::Record>> {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.chars().all(|ch| ch.is_whitespace()) {
            return None;
        }
        if let Some(max) = self.config.limits.max_line_bytes {
            if line.len() > max {
                return Some(self.too_long(line_number, line.len(), line));
            }
        }

        match self.decoder.decode(line) {
            Ok(None) => None,
            Ok(Some(record)) => Some(LineRecord {
                line_number,
                outcome: Ok(record),
            }),
            Err(err) => {
                debug!(line_number, kind = err.kind.as_str(), "skipping undecodable line");
                Some(LineRecord {
                    line_number,
                    outcome: Err(LineError {
                        line_number,
                        kind: err.kind,
                        detail: err.detail,
                        raw: self.capture(line),
                    }),
                })
            }
        }
    }

    fn too_long(&self, line_number: usize, observed: usize, tail: &str) -> LineRecord<D::Record> {
        let max = self.config.limits.max_line_bytes.unwrap_or(usize::MAX);
        warn!(line_number, observed, max, "discarded oversized line");
        LineRecord {
            line_number,
            outcome: Err(LineError {
                line_number,
                kind: LineErrorKind::LineTooLong,
                detail: format!("observed_bytes={observed}, max_line_bytes={max}"),
                raw: self.capture(tail),
            }),
        }
    }

    fn enforce_fragment_limit(&mut self) {
        let Some(max) = self.config.limits.max_line_bytes else {
            return;
        };
        if self.overflow.is_none() && self.assembler.pending_bytes() <= max {
            return;
        }
        let dropped = self.assembler.take_fragment().len();
        self.overflow = Some(self.overflow.unwrap_or(0) + dropped);
    }

    fn capture(&self, line: &str) -> String {
        let budget = self.config.limits.max_raw_capture_bytes;
        if line.len() <= budget {
            return line.to_string();
        }
        let mut end = budget;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        line[..end].to_string()
    }
}
