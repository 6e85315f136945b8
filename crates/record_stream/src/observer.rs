use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use chrono::{DateTime, Local};
use ndjson_ingest::{LineError, LineRecord};
use tracing::debug;

use crate::error::StreamError;
use crate::socket::ConnectionState;

/// Counters for one stream session.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct StreamSummary {
    /// Non-blank lines processed.
    pub lines: usize,
    pub records: usize,
    pub line_errors: usize,
    /// Set when the consumer stopped the stream before the transport ended.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Severity {
    Info,
    Success,
    Data,
    Error,
}

/// Human-oriented diagnostic line, as shown in a connection console.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: SystemTime,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            at: SystemTime::now(),
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = DateTime::<Local>::from(self.at);
        write!(f, "[{}] {}", local.format("%H:%M:%S"), self.message)
    }
}

/// Receives everything a pipeline produces, in arrival order.
///
/// Only [`StreamObserver::on_record`] is required. Callbacks run on the pipeline's task and
/// must not block.
pub trait StreamObserver<R> {
    fn on_record(&mut self, line_number: usize, record: R);

    /// A line was skipped. Ingestion continues.
    fn on_line_error(&mut self, _error: LineError) {}

    /// A transport failure. Terminal for HTTP streams; socket streams settle on the close event.
    fn on_error(&mut self, _error: &StreamError) {}

    /// The HTTP body ended normally.
    fn on_complete(&mut self, _summary: &StreamSummary) {}

    fn on_state_change(&mut self, _from: ConnectionState, _to: ConnectionState) {}

    fn on_diagnostic(&mut self, _entry: LogEntry) {}
}

impl<R, O: StreamObserver<R> + ?Sized> StreamObserver<R> for Box<O> {
    fn on_record(&mut self, line_number: usize, record: R) {
        (**self).on_record(line_number, record)
    }

    fn on_line_error(&mut self, error: LineError) {
        (**self).on_line_error(error)
    }

    fn on_error(&mut self, error: &StreamError) {
        (**self).on_error(error)
    }

    fn on_complete(&mut self, summary: &StreamSummary) {
        (**self).on_complete(summary)
    }

    fn on_state_change(&mut self, from: ConnectionState, to: ConnectionState) {
        (**self).on_state_change(from, to)
    }

    fn on_diagnostic(&mut self, entry: LogEntry) {
        (**self).on_diagnostic(entry)
    }
}

/// Routes one line outcome to the observer and updates the counters.
pub(crate) fn deliver<R, O>(observer: &mut O, summary: &mut StreamSummary, line: LineRecord<R>)
where
    O: StreamObserver<R> + ?Sized,
{
    summary.lines += 1;
    match line.outcome {
        Ok(record) => {
            summary.records += 1;
            observer.on_record(line.line_number, record);
        }
        Err(error) => {
            summary.line_errors += 1;
            observer.on_diagnostic(LogEntry::new(
                Severity::Error,
                format!("Parse error for message: {error}"),
            ));
            observer.on_line_error(error);
        }
    }
}

type RecordFn<R> = Box<dyn FnMut(R) + Send>;
type LineErrorFn = Box<dyn FnMut(LineError) + Send>;
type ErrorFn = Box<dyn FnMut(&StreamError) + Send>;
type CompleteFn = Box<dyn FnMut(&StreamSummary) + Send>;

/// Observer assembled from closures: `on_record`, plus optional `on_line_error`, `on_error`
/// and `on_complete`.
pub struct Callbacks<R> {
    on_record: RecordFn<R>,
    on_line_error: Option<LineErrorFn>,
    on_error: Option<ErrorFn>,
    on_complete: Option<CompleteFn>,
}

impl<R> Callbacks<R> {
    pub fn new(on_record: impl FnMut(R) + Send + 'static) -> Self {
        Self {
            on_record: Box::new(on_record),
            on_line_error: None,
            on_error: None,
            on_complete: None,
        }
    }

    /// Called for each skipped line; without it skipped lines are only traced.
    pub fn on_line_error(mut self, on_line_error: impl FnMut(LineError) + Send + 'static) -> Self {
        self.on_line_error = Some(Box::new(on_line_error));
        self
    }

    pub fn on_error(mut self, on_error: impl FnMut(&StreamError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn on_complete(mut self, on_complete: impl FnMut(&StreamSummary) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(on_complete));
        self
    }
}

impl<R> StreamObserver<R> for Callbacks<R> {
    fn on_record(&mut self, _line_number: usize, record: R) {
        (self.on_record)(record)
    }

    fn on_line_error(&mut self, error: LineError) {
        match self.on_line_error.as_mut() {
            Some(on_line_error) => on_line_error(error),
            None => debug!(line_number = error.line_number, kind = error.kind.as_str(), "line skipped"),
        }
    }

    fn on_error(&mut self, error: &StreamError) {
        if let Some(on_error) = self.on_error.as_mut() {
            on_error(error)
        }
    }

    fn on_complete(&mut self, summary: &StreamSummary) {
        if let Some(on_complete) = self.on_complete.as_mut() {
            on_complete(summary)
        }
    }
}

/// Bounded, append-only console of [`LogEntry`] values. The oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl DiagnosticLog {
    pub const DEFAULT_CAPACITY: usize = 500;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

/// Accumulates everything a pipeline reports; the model behind a record list view.
#[derive(Debug, Clone)]
pub struct RecordCollector<R> {
    pub records: Vec<R>,
    pub line_errors: Vec<LineError>,
    pub failures: Vec<String>,
    pub states: Vec<ConnectionState>,
    pub completed: Option<StreamSummary>,
    pub log: DiagnosticLog,
}

impl<R> Default for RecordCollector<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            line_errors: Vec::new(),
            failures: Vec::new(),
            states: Vec::new(),
            completed: None,
            log: DiagnosticLog::default(),
        }
    }
}

impl<R> StreamObserver<R> for RecordCollector<R> {
    fn on_record(&mut self, _line_number: usize, record: R) {
        self.records.push(record);
    }

    fn on_line_error(&mut self, error: LineError) {
        self.line_errors.push(error);
    }

    fn on_error(&mut self, error: &StreamError) {
        self.failures.push(error.to_string());
    }

    fn on_complete(&mut self, summary: &StreamSummary) {
        self.completed = Some(*summary);
    }

    fn on_state_change(&mut self, _from: ConnectionState, to: ConnectionState) {
        self.states.push(to);
    }

    fn on_diagnostic(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }
}

/// [`RecordCollector`] shared between a running pipeline and its consumer.
pub struct SharedCollector<R>(Arc<Mutex<RecordCollector<R>>>);

impl<R> SharedCollector<R> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(RecordCollector::default())))
    }

    /// Runs `f` against the current contents.
    pub fn with<T>(&self, f: impl FnOnce(&RecordCollector<R>) -> T) -> T {
        let guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Empties records, errors and the log, keeping the state history.
    pub fn clear(&self) {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        guard.records.clear();
        guard.line_errors.clear();
        guard.failures.clear();
        guard.log.clear();
    }

    fn update(&self, f: impl FnOnce(&mut RecordCollector<R>)) {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl<R: Clone> SharedCollector<R> {
    pub fn snapshot(&self) -> RecordCollector<R> {
        self.with(|collector| collector.clone())
    }
}

impl<R> Clone for SharedCollector<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> Default for SharedCollector<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> StreamObserver<R> for SharedCollector<R> {
    fn on_record(&mut self, line_number: usize, record: R) {
        self.update(|c| c.on_record(line_number, record));
    }

    fn on_line_error(&mut self, error: LineError) {
        self.update(|c| c.on_line_error(error));
    }

    fn on_error(&mut self, error: &StreamError) {
        self.update(|c| c.on_error(error));
    }

    fn on_complete(&mut self, summary: &StreamSummary) {
        self.update(|c| c.on_complete(summary));
    }

    fn on_state_change(&mut self, from: ConnectionState, to: ConnectionState) {
        self.update(|c| c.on_state_change(from, to));
    }

    fn on_diagnostic(&mut self, entry: LogEntry) {
        self.update(|c| c.on_diagnostic(entry));
    }
}
