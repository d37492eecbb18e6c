//! Cooperative cancellation between pipeline stages

use crate::report::PipelineState;
use glbtidy_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked at every state transition
///
/// Clones observe the same flag. A stage that is already running finishes before the
/// cancellation takes effect.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested before entering `next`
    pub fn check(&self, next: PipelineState) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled(next.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check(PipelineState::Deduped).is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        let err = token.check(PipelineState::Pruned).unwrap_err();
        assert!(matches!(err, Error::Cancelled(ref s) if s == "pruned"));
    }
}
