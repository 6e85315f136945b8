use std::{path::Path, time::Duration};

use ndjson_ingest::IngestConfig;
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_HTTP_URL: &str = "http://localhost:8080/v1/users";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:8080/v1/users";
pub const DEFAULT_TRIGGER_PAYLOAD: &str = "{}";
pub const DEFAULT_CLOSE_REASON: &str = "Client closing connection";

/// How socket frames relate to lines.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Every frame ends a line, whether or not it carries a trailing newline.
    #[default]
    FrameIsComplete,
    /// A line may continue across frames until a newline arrives.
    Continuous,
}

/// Settings for one streaming client, loadable from TOML.
///
/// ```toml
/// http_url = "http://localhost:8080/v1/users"
/// socket_url = "ws://localhost:8080/v1/users"
/// idle_timeout_ms = 30000
/// framing = "continuous"
///
/// [ingest]
/// trailing_fragment = "decode_if_complete"
///
/// [ingest.limits]
/// max_line_bytes = 65536
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub http_url: String,
    pub socket_url: String,
    pub connect_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub send_trigger: bool,
    pub trigger_payload: String,
    pub close_reason: String,
    pub framing: FrameMode,
    pub ingest: IngestConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            http_url: DEFAULT_HTTP_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            connect_timeout_ms: None,
            idle_timeout_ms: None,
            send_trigger: true,
            trigger_payload: DEFAULT_TRIGGER_PAYLOAD.to_string(),
            close_reason: DEFAULT_CLOSE_REASON.to_string(),
            framing: FrameMode::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl StreamConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            trigger_payload: self.send_trigger.then(|| self.trigger_payload.clone()),
            close_reason: self.close_reason.clone(),
            framing: self.framing,
            idle_timeout: self.idle_timeout(),
            ingest: self.ingest,
        }
    }
}

/// Behaviour of a socket stream session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SocketOptions {
    /// Sent once the connection opens; `None` when the server streams unprompted.
    pub trigger_payload: Option<String>,
    pub close_reason: String,
    pub framing: FrameMode,
    pub idle_timeout: Option<Duration>,
    pub ingest: IngestConfig,
}

impl Default for SocketOptions {
    fn default() -> Self {
        StreamConfig::default().socket_options()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use ndjson_ingest::TrailingFragment;

    use super::*;

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
socket_url = "ws://example.test/v1/users"
idle_timeout_ms = 1500
send_trigger = false
framing = "continuous"

[ingest]
trailing_fragment = "decode_if_complete"

[ingest.limits]
max_line_bytes = 1024
"#
        )
        .unwrap();

        let config = StreamConfig::load(file.path()).unwrap();
        assert_eq!(config.http_url, DEFAULT_HTTP_URL);
        assert_eq!(config.socket_url, "ws://example.test/v1/users");
        assert_eq!(config.idle_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.ingest.limits.max_line_bytes, Some(1024));
        assert_eq!(
            config.ingest.trailing_fragment,
            TrailingFragment::DecodeIfComplete
        );

        let options = config.socket_options();
        assert_eq!(options.trigger_payload, None);
        assert_eq!(options.framing, FrameMode::Continuous);
        assert_eq!(options.close_reason, DEFAULT_CLOSE_REASON);
    }

    #[test]
    fn unreadable_and_invalid_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            StreamConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "framing = \"sideways\"\n").unwrap();
        assert!(matches!(
            StreamConfig::load(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn empty_inline_toml_yields_defaults() {
        let config = StreamConfig::from_toml_str("").unwrap();
        assert_eq!(config, StreamConfig::default());
        assert!(StreamConfig::from_toml_str("idle_timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn default_socket_options_send_trigger() {
        let options = SocketOptions::default();
        assert_eq!(options.trigger_payload.as_deref(), Some("{}"));
        assert_eq!(options.framing, FrameMode::FrameIsComplete);
    }
}
