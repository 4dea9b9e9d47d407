use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{AppError, AppResult};

/// Cooperative cancellation shared between a scheduler and running units
///
/// Generation checks the token between stages and right before persisting,
/// so a cancelled unit never writes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with `AppError::Cancelled` once cancellation was requested
    pub fn check(&self, during: &str) -> AppResult<()> {
        if self.is_cancelled() {
            return Err(AppError::Cancelled(format!("Cancelled before {}", during)));
        }
        Ok(())
    }
}
