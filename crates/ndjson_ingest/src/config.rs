use serde::Deserialize;

/// What to do with an unterminated fragment left over when a stream ends.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingFragment {
    /// Drop it; an unterminated line cannot be proven complete.
    #[default]
    Discard,
    /// Emit it only if it decodes into a valid record. Failures are dropped silently.
    DecodeIfComplete,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestLimits {
    /// Upper bound for a single line, including a fragment still waiting for its newline.
    /// `None` buffers without limit.
    pub max_line_bytes: Option<usize>,
    /// Upper bound for the raw text copied into a [`crate::LineError`].
    pub max_raw_capture_bytes: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: None,
            max_raw_capture_bytes: 4 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub limits: IngestLimits,
    pub trailing_fragment: TrailingFragment,
}

impl IngestConfig {
    pub fn max_line_bytes(mut self, max: usize) -> Self {
        self.limits.max_line_bytes = Some(max);
        self
    }

    pub fn trailing_fragment(mut self, policy: TrailingFragment) -> Self {
        self.trailing_fragment = policy;
        self
    }
}
