use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a streamed record, kept exactly as it appeared on the wire.
///
/// 64-bit integers frequently arrive as JSON strings (`"id": "42"`); no coercion is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
    Other(Value),
}

impl RecordId {
    /// Numeric view of the identifier, parsing textual integers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RecordId::Int(id) => Some(*id),
            RecordId::Text(text) => text.trim().parse().ok(),
            RecordId::Other(_) => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Text(text) => f.write_str(text),
            RecordId::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

/// One decoded entry of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_keep_their_wire_shape() {
        let int: RecordId = serde_json::from_str("7").unwrap();
        let text: RecordId = serde_json::from_str("\"7\"").unwrap();
        let other: RecordId = serde_json::from_str("1.5").unwrap();

        assert_eq!(int, RecordId::Int(7));
        assert_eq!(text, RecordId::Text("7".to_string()));
        assert!(matches!(other, RecordId::Other(_)));

        assert_eq!(int.as_i64(), Some(7));
        assert_eq!(text.as_i64(), Some(7));
        assert_eq!(other.as_i64(), None);
        assert_eq!(text.to_string(), "7");
    }
}
