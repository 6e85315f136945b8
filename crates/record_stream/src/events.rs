use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures_core::Stream;
use ndjson_ingest::{LineError, LineRecord};
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::handle::CancelFlag;
use crate::observer::StreamObserver;

pub(crate) type RecordSender<R> = mpsc::UnboundedSender<Result<LineRecord<R>, StreamError>>;

/// Line outcomes of one HTTP session, in arrival order.
///
/// Yields `Ok` for every line (a record or a recoverable line error) and at most one `Err`
/// for the terminal failure. Ends when the body is exhausted. Dropping the stream cancels the
/// session.
pub struct RecordStream<R> {
    rx: mpsc::UnboundedReceiver<Result<LineRecord<R>, StreamError>>,
    cancel: CancelFlag,
}

impl<R> RecordStream<R> {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Result<LineRecord<R>, StreamError>>,
        cancel: CancelFlag,
    ) -> Self {
        Self { rx, cancel }
    }

    /// Stops the session at the next chunk boundary; outcomes already queued are still yielded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<R> Stream for RecordStream<R> {
    type Item = Result<LineRecord<R>, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<R> Drop for RecordStream<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Observer that forwards line outcomes into a [`RecordStream`].
pub(crate) struct ChannelObserver<R> {
    tx: RecordSender<R>,
    cancel: CancelFlag,
}

impl<R> ChannelObserver<R> {
    pub(crate) fn new(tx: RecordSender<R>, cancel: CancelFlag) -> Self {
        Self { tx, cancel }
    }

    fn forward(&mut self, line: LineRecord<R>) {
        if self.tx.send(Ok(line)).is_err() {
            self.cancel.cancel();
        }
    }
}

impl<R> StreamObserver<R> for ChannelObserver<R> {
    fn on_record(&mut self, line_number: usize, record: R) {
        self.forward(LineRecord {
            line_number,
            outcome: Ok(record),
        });
    }

    fn on_line_error(&mut self, error: LineError) {
        self.forward(LineRecord {
            line_number: error.line_number,
            outcome: Err(error),
        });
    }
}
