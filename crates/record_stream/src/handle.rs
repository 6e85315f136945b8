use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::task::JoinHandle;

use crate::error::StreamError;
use crate::observer::StreamSummary;

/// Shared stop flag, checked by a pipeline between chunk reads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a running HTTP stream session.
///
/// Dropping the handle does not stop the session; call [`StreamHandle::cancel`] for that.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancelFlag,
    task: JoinHandle<Result<StreamSummary, StreamError>>,
}

impl StreamHandle {
    pub(crate) fn new(cancel: CancelFlag, task: JoinHandle<Result<StreamSummary, StreamError>>) -> Self {
        Self { cancel, task }
    }

    /// Stops the session at the next chunk boundary. Idempotent; once the pipeline observes
    /// the flag no further callbacks are made.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Waits for the session to end.
    pub async fn join(self) -> Result<StreamSummary, StreamError> {
        self.task.await?
    }
}
