//! Caller-side cancellation handle.
//!
//! An [`AbortSignal`] spans one logical call, including every retry attempt
//! and the lifetime of a streaming response. It wraps a
//! [`CancellationToken`] so per-attempt controllers can be derived as child
//! tokens, and remembers an optional reason so the caller can tell why the
//! call was aborted.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A cloneable cancellation handle shared between a caller and a call.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortSignal {
    /// Create a signal that has not been aborted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort without a reason.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Abort and record `reason`. Only the first reason is kept.
    pub fn abort_with(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    /// Whether the signal has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason passed to [`abort_with`](Self::abort_with), if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once the signal is aborted.
    pub fn aborted(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Derive a per-attempt token that is cancelled when this signal is.
    ///
    /// Cancelling the child never affects the signal itself.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl From<CancellationToken> for AbortSignal {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::default(),
        }
    }
}
