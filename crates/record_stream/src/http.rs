use std::{pin::Pin, time::Duration};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use ndjson_ingest::{EnvelopeDecoder, IngestConfig, LineDecoder, LineIngestor, Record};
use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{StreamError, TransportError};
use crate::events::{ChannelObserver, RecordStream};
use crate::handle::{CancelFlag, StreamHandle};
use crate::observer::{deliver, StreamObserver, StreamSummary};

/// Body chunks as they come off the wire.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Issues a GET against `url` and returns the response body as a chunk stream.
///
/// A non-success status is a transport failure; the body is not read in that case.
pub async fn open_chunked_body(
    client: &reqwest::Client,
    url: &str,
) -> Result<ChunkStream, TransportError> {
    let response = client
        .get(url)
        .header(ACCEPT, "application/x-ndjson")
        .send()
        .await
        .map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            url: url.to_string(),
            status,
        });
    }

    debug!(url, %status, "record stream body opened");
    Ok(Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::Body)),
    ))
}

/// Drives one chunked body through a [`LineIngestor`], reporting to a [`StreamObserver`].
///
/// The pipeline never retries. Cancellation is checked before every read and between
/// deliveries; a read already in flight is allowed to finish.
pub struct HttpStreamPipeline<D: LineDecoder> {
    ingest: LineIngestor<D>,
    cancel: CancelFlag,
    idle_timeout: Option<Duration>,
}

impl<D: LineDecoder> HttpStreamPipeline<D> {
    pub fn new(decoder: D, config: IngestConfig) -> Self {
        Self {
            ingest: LineIngestor::new(decoder, config),
            cancel: CancelFlag::new(),
            idle_timeout: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Consumes `source` to the end.
    ///
    /// Returns the summary on normal exhaustion (after `on_complete`) or on cancellation
    /// (without `on_complete`). A transport failure or idle timeout is passed to `on_error`
    /// and returned.
    pub async fn run<S, O>(
        &mut self,
        mut source: S,
        observer: &mut O,
    ) -> Result<StreamSummary, StreamError>
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
        O: StreamObserver<D::Record> + ?Sized,
    {
        self.ingest.reset();
        let mut summary = StreamSummary::default();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(summary));
            }

            let next = match self.idle_timeout {
                Some(idle_for) => match tokio::time::timeout(idle_for, source.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(?idle_for, "record stream went idle");
                        let err = StreamError::IdleTimeout { idle_for };
                        observer.on_error(&err);
                        return Err(err);
                    }
                },
                None => source.next().await,
            };

            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(summary));
            }

            match next {
                Some(Ok(chunk)) => {
                    for line in self.ingest.push_bytes(&chunk) {
                        if self.cancel.is_cancelled() {
                            return Ok(self.cancelled(summary));
                        }
                        deliver(observer, &mut summary, line);
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "record stream transport failed");
                    let err = StreamError::from(err);
                    observer.on_error(&err);
                    return Err(err);
                }
                None => break,
            }
        }

        if let Some(line) = self.ingest.finish() {
            deliver(observer, &mut summary, line);
        }
        info!(
            lines = summary.lines,
            records = summary.records,
            line_errors = summary.line_errors,
            "record stream complete"
        );
        observer.on_complete(&summary);
        Ok(summary)
    }

    fn cancelled(&mut self, mut summary: StreamSummary) -> StreamSummary {
        debug!(records = summary.records, "record stream cancelled");
        self.ingest.reset();
        summary.cancelled = true;
        summary
    }
}

/// Client for a chunked NDJSON endpoint.
///
/// ```no_run
/// use record_stream::{Callbacks, HttpRecordStream};
///
/// # async fn demo() -> Result<(), record_stream::StreamError> {
/// let handle = HttpRecordStream::new("http://localhost:8080/v1/users")
///     .start(Callbacks::new(|record: record_stream::Record| println!("{}", record.name)));
/// let summary = handle.join().await?;
/// println!("{} records", summary.records);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpRecordStream {
    client: reqwest::Client,
    url: String,
    ingest: IngestConfig,
    idle_timeout: Option<Duration>,
}

impl HttpRecordStream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            ingest: IngestConfig::default(),
            idle_timeout: None,
        }
    }

    /// Builds a client from `config`, applying its connect timeout to the HTTP client.
    pub fn from_config(config: &StreamConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| TransportError::Other(format!("failed to build HTTP client: {err}")))?;

        Ok(Self::new(config.http_url.clone())
            .with_client(client)
            .ingest_config(config.ingest)
            .idle_timeout(config.idle_timeout()))
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn ingest_config(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Starts a session decoding [`Record`]s. Must be called within a Tokio runtime.
    pub fn start<O>(&self, observer: O) -> StreamHandle
    where
        O: StreamObserver<Record> + Send + 'static,
    {
        self.start_with_decoder(EnvelopeDecoder::new(), observer)
    }

    pub fn start_with_decoder<D, O>(&self, decoder: D, mut observer: O) -> StreamHandle
    where
        D: LineDecoder + Send + 'static,
        D::Record: Send + 'static,
        O: StreamObserver<D::Record> + Send + 'static,
    {
        let cancel = CancelFlag::new();
        let session = self.session(decoder, cancel.clone());
        let task = tokio::spawn(async move { session.run(&mut observer).await });
        StreamHandle::new(cancel, task)
    }

    /// Starts a session whose outcomes are read as a [`futures_core::Stream`].
    ///
    /// Dropping the returned stream cancels the session.
    pub fn records(&self) -> RecordStream<Record> {
        self.records_with_decoder(EnvelopeDecoder::new())
    }

    pub fn records_with_decoder<D>(&self, decoder: D) -> RecordStream<D::Record>
    where
        D: LineDecoder + Send + 'static,
        D::Record: Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();
        let session = self.session(decoder, cancel.clone());
        let mut observer = ChannelObserver::new(tx.clone(), cancel.clone());
        tokio::spawn(async move {
            if let Err(err) = session.run(&mut observer).await {
                let _ = tx.send(Err(err));
            }
        });
        RecordStream::new(rx, cancel)
    }

    fn session<D: LineDecoder>(&self, decoder: D, cancel: CancelFlag) -> HttpSession<D> {
        HttpSession {
            client: self.client.clone(),
            url: self.url.clone(),
            pipeline: HttpStreamPipeline::new(decoder, self.ingest)
                .with_cancel(cancel)
                .with_idle_timeout(self.idle_timeout),
        }
    }
}

struct HttpSession<D: LineDecoder> {
    client: reqwest::Client,
    url: String,
    pipeline: HttpStreamPipeline<D>,
}

impl<D: LineDecoder> HttpSession<D> {
    async fn run<O>(mut self, observer: &mut O) -> Result<StreamSummary, StreamError>
    where
        O: StreamObserver<D::Record> + ?Sized,
    {
        info!(url = %self.url, "opening record stream");
        let source = match open_chunked_body(&self.client, &self.url).await {
            Ok(source) => source,
            Err(err) => {
                warn!(url = %self.url, error = %err, "record stream failed to open");
                let err = StreamError::from(err);
                observer.on_error(&err);
                return Err(err);
            }
        };
        self.pipeline.run(source, observer).await
    }
}
