//! One-shot abort signal shared by both pipelines of a connection.

use crate::error::ConnectionError;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Reason reported when the signal fired without one being recorded.
const DEFAULT_REASON: &str = "aborted";

/// Broadcast, one-shot abort signal carrying a reason.
///
/// Clones share the same state. Once triggered it stays triggered, and the
/// first reason wins.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal. Returns `true` only for the call that fired it.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        let first = self.reason.set(reason.into()).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason given to the first [`abort`](Self::abort) call.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// The error that operations cut short by this signal report.
    pub fn error(&self) -> ConnectionError {
        ConnectionError::Aborted(self.reason().unwrap_or(DEFAULT_REASON).to_string())
    }

    /// Resolve once the signal fires, yielding the abort error.
    pub async fn aborted(&self) -> ConnectionError {
        self.token.cancelled().await;
        self.error()
    }

    /// A token cancelled by this signal that can also be cancelled on its own,
    /// used to end a single pipeline without aborting the session.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
