use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EngineError, Result};

/// Cooperative cancellation for one generation run.
///
/// The token watches a shared "latest run" counter: once a newer run is
/// requested the counter moves past this token's run and every later
/// checkpoint fails with `EngineError::Cancelled`.
#[derive(Clone, Debug)]
pub struct CancelToken {
    latest: Arc<AtomicU64>,
    run: u64,
}

impl CancelToken {
    /// A standalone token, cancelled only through [`CancelToken::cancel`].
    pub fn new() -> Self {
        Self {
            latest: Arc::new(AtomicU64::new(0)),
            run: 0,
        }
    }

    /// A token that is never cancelled; used by the direct stage entry points.
    pub fn never() -> Self {
        Self::new()
    }

    pub(crate) fn for_run(latest: Arc<AtomicU64>, run: u64) -> Self {
        Self { latest, run }
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn cancel(&self) {
        self.latest.fetch_max(self.run.wrapping_add(1), Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.run
    }

    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
