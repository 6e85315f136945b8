use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use record_stream::{
    ConnectionState, LineError, LogEntry, Record, StreamError, StreamObserver, StreamSummary,
};
use tokio::sync::Notify;
use tracing::{info, warn};

/// Writes each record to stdout as one JSON line. Everything else goes to stderr.
#[derive(Clone, Default)]
pub struct PrintObserver {
    console: bool,
    failed: Arc<AtomicBool>,
    disconnected: Arc<Notify>,
}

impl PrintObserver {
    pub fn new(console: bool) -> Self {
        Self {
            console,
            ..Self::default()
        }
    }

    /// Whether a terminal or transport error was reported.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Resolves once the connection has returned to `disconnected`.
    pub async fn disconnected(&self) {
        self.disconnected.notified().await
    }
}

impl StreamObserver<Record> for PrintObserver {
    fn on_record(&mut self, _line_number: usize, record: Record) {
        match serde_json::to_string(&record) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                if writeln!(stdout, "{line}").and_then(|()| stdout.flush()).is_err() {
                    warn!("stdout closed; dropping record");
                }
            }
            Err(err) => warn!(error = %err, id = %record.id, "failed to encode record"),
        }
    }

    fn on_line_error(&mut self, error: LineError) {
        warn!(
            line_number = error.line_number,
            kind = error.kind.as_str(),
            detail = %error.detail,
            "skipped line"
        );
    }

    fn on_error(&mut self, error: &StreamError) {
        self.failed.store(true, Ordering::SeqCst);
        warn!(error = %error, "stream error");
    }

    fn on_complete(&mut self, summary: &StreamSummary) {
        info!(
            records = summary.records,
            line_errors = summary.line_errors,
            "stream complete"
        );
    }

    fn on_state_change(&mut self, _from: ConnectionState, to: ConnectionState) {
        if to == ConnectionState::Disconnected {
            self.disconnected.notify_one();
        }
    }

    fn on_diagnostic(&mut self, entry: LogEntry) {
        if self.console {
            eprintln!("{entry}");
        }
    }
}
