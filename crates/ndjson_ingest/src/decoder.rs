use serde::{de::IgnoredAny, Deserialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::LineErrorKind;
use crate::record::{Record, RecordId};

/// Turns one assembled line into a typed record.
///
/// Implementations may keep per-stream state; [`LineDecoder::reset`] is called whenever a new
/// stream session starts.
pub trait LineDecoder {
    type Record;

    fn reset(&mut self);

    /// Returns `Ok(None)` for lines that carry nothing (blank lines).
    fn decode(&mut self, line: &str) -> Result<Option<Self::Record>, DecodeError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}: {detail}", .kind.as_str())]
pub struct DecodeError {
    pub kind: LineErrorKind,
    pub detail: String,
}

impl DecodeError {
    fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: LineErrorKind::MalformedJson,
            detail: detail.into(),
        }
    }

    fn incomplete(detail: impl Into<String>) -> Self {
        Self {
            kind: LineErrorKind::IncompleteRecord,
            detail: detail.into(),
        }
    }
}

/// Error report streamed in place of a record when the upstream call fails mid-stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpstreamStatus {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub http_code: Option<i64>,
}

/// Top-level shape of one line. Variants are tried in order; a bare record is always the
/// whole value.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { result: Value },
    Record { id: IgnoredAny, name: IgnoredAny },
    Failed { error: UpstreamStatus },
    Bare(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct CandidateRecord {
    #[serde(default)]
    id: Option<RecordId>,
    #[serde(default)]
    name: Option<Value>,
}

/// Decoder for the `{"result": {"id", "name"}}` / `{"id", "name"}` wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeDecoder;

impl EnvelopeDecoder {
    pub fn new() -> Self {
        Self
    }

    fn candidate(value: Value) -> Result<Value, DecodeError> {
        let envelope =
            Envelope::deserialize(&value).map_err(|err| DecodeError::incomplete(err.to_string()))?;
        match envelope {
            Envelope::Wrapped { result } => Ok(result),
            Envelope::Failed { error } => Err(DecodeError {
                kind: LineErrorKind::Upstream,
                detail: format!(
                    "upstream error (code={}): {}",
                    error
                        .code
                        .map_or_else(|| "unknown".to_string(), |code| code.to_string()),
                    error.message.as_deref().unwrap_or("no message"),
                ),
            }),
            Envelope::Record { .. } | Envelope::Bare(_) => Ok(value),
        }
    }

    fn record(candidate: Value) -> Result<Record, DecodeError> {
        let fields = match candidate {
            Value::Object(map) => map,
            other => {
                return Err(DecodeError::incomplete(format!(
                    "record must be a JSON object, found {}",
                    json_type(&other)
                )))
            }
        };
        let candidate = serde_json::from_value::<CandidateRecord>(Value::Object(fields))
            .map_err(|err| DecodeError::incomplete(err.to_string()))?;

        let id = candidate
            .id
            .ok_or_else(|| DecodeError::incomplete("record missing `id`"))?;
        let name = match candidate.name {
            Some(Value::String(name)) => name,
            None | Some(Value::Null) => return Err(DecodeError::incomplete("record missing `name`")),
            Some(other) => {
                return Err(DecodeError::incomplete(format!(
                    "record `name` must be text, found {}",
                    json_type(&other)
                )))
            }
        };
        Ok(Record { id, name })
    }
}

impl LineDecoder for EnvelopeDecoder {
    type Record = Record;

    fn reset(&mut self) {}

    fn decode(&mut self, line: &str) -> Result<Option<Record>, DecodeError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.chars().all(|ch| ch.is_whitespace()) {
            return Ok(None);
        }

        let value: Value =
            serde_json::from_str(line).map_err(|err| DecodeError::malformed(err.to_string()))?;
        Self::candidate(value).and_then(Self::record).map(Some)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
