use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ExtractError;

/// Cooperative cancellation flag shared between the caller and the
/// reconstruction threads. Cloning shares the flag.
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

    pub fn check(&self) -> Result<(), ExtractError> {
        if self.is_cancelled() {
            Err(ExtractError::Interrupted)
        } else {
            Ok(())
        }
    }
}
