//! Cooperative cancellation shared between a caller and an in-flight call.

use crate::error::{Result, TranscodeError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clonable cancellation flag.
///
/// The subprocess runner polls it while waiting on the converter and kills
/// the child when it is set. The adaptive encoder checks it at the top of each
/// resize/encode iteration, so an iteration already running completes first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TranscodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
