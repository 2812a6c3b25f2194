//! Settle-once completion markers for pipeline tasks.

use crate::error::ConnectionError;
use tokio::sync::watch;

/// How a pipeline finished.
pub type PipeOutcome = Result<(), ConnectionError>;

/// Awaitable "this pipeline has closed" marker.
///
/// Settles exactly once; every clone and every later [`wait`](Self::wait)
/// sees the same outcome, and waiting on a settled marker returns at once.
#[derive(Debug, Clone)]
pub struct ClosedMarker {
    rx: watch::Receiver<Option<PipeOutcome>>,
}

/// Write side of a [`ClosedMarker`], owned by the pipeline task.
///
/// Dropping it unsettled (the task panicked or was cancelled) settles the
/// marker with [`ConnectionError::Interrupted`].
#[derive(Debug)]
pub(crate) struct MarkerSetter {
    tx: watch::Sender<Option<PipeOutcome>>,
}

impl ClosedMarker {
    pub(crate) fn pending() -> (MarkerSetter, ClosedMarker) {
        let (tx, rx) = watch::channel(None);
        (MarkerSetter { tx }, ClosedMarker { rx })
    }

    /// A marker that is already settled.
    pub fn settled(outcome: PipeOutcome) -> Self {
        let (setter, marker) = Self::pending();
        setter.settle(outcome);
        marker
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The outcome, if the pipeline has finished.
    pub fn outcome(&self) -> Option<PipeOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the pipeline to finish.
    pub async fn wait(&self) -> PipeOutcome {
        let mut rx = self.rx.clone();
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        settled.unwrap_or(Err(ConnectionError::Interrupted))
    }
}

impl MarkerSetter {
    pub(crate) fn settle(self, outcome: PipeOutcome) {
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for MarkerSetter {
    fn drop(&mut self) {
        self.tx.send_if_modified(|outcome| {
            if outcome.is_some() {
                return false;
            }
            *outcome = Some(Err(ConnectionError::Interrupted));
            true
        });
    }
}
