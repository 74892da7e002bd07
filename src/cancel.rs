//! Cooperative cancellation for long scans.
//!
//! A [`CancelToken`] is a cheap cloneable handle shared between the caller
//! and an analysis call. The scan polls it between outer-loop iterations
//! and bails out with [`AnalysisError::Cancelled`](crate::AnalysisError)
//! when it fires; partial results are dropped, never returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation handle for batch analyses.
///
/// Cloning produces another handle to the same flag, so one token can be
/// held by a UI thread while its clone travels into the scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; already-finished scans are unaffected.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Checkpoint helper: `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub(crate) fn checkpoint(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}
