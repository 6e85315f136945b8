use thiserror::Error;

/// Classification of a line that could not be turned into a record.
///
/// Every kind is recoverable: the line is reported and ingestion moves on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LineErrorKind {
    /// The line is not valid JSON.
    MalformedJson,
    /// The envelope parsed but does not carry both an identifier and a label.
    IncompleteRecord,
    /// The envelope is an upstream error report (`{"error": {...}}`).
    Upstream,
    /// The line exceeded the configured size limit and was discarded unread.
    LineTooLong,
}

impl LineErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LineErrorKind::MalformedJson => "malformed_json",
            LineErrorKind::IncompleteRecord => "incomplete_record",
            LineErrorKind::Upstream => "upstream",
            LineErrorKind::LineTooLong => "line_too_long",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("line {line_number}: {} ({detail})", .kind.as_str())]
pub struct LineError {
    pub line_number: usize,
    pub kind: LineErrorKind,
    pub detail: String,
    /// The offending line, truncated to the configured capture budget.
    pub raw: String,
}

/// Outcome of one non-blank line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord<T> {
    /// 1-based line number within the current stream session.
    pub line_number: usize,
    pub outcome: Result<T, LineError>,
}

impl<T> LineRecord<T> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
