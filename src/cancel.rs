//! Cooperative cancellation of long-running operations

use crate::error::{LockboxError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag checked between units of work (chunks, files).
///
/// Clones share the same flag. A cancelled transform discards its temporary
/// output and returns an `Aborted` error.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
    armed: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Returns `Aborted` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LockboxError::aborted())
        } else {
            Ok(())
        }
    }

    /// Marks the start of a section that polls this token. The returned guard
    /// disarms it again when dropped.
    pub fn arm(&self) -> ArmedGuard<'_> {
        self.armed.store(true, Ordering::SeqCst);
        ArmedGuard { token: self }
    }

    /// Whether a cancellable section is currently running. Interrupt handlers
    /// use this to decide between requesting cancellation and exiting.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

pub struct ArmedGuard<'a> {
    token: &'a CancelToken,
}

impl Drop for ArmedGuard<'_> {
    fn drop(&mut self) {
        self.token.armed.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(token.check().is_ok());

        handle.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check().unwrap_err().kind, Some(ErrorKind::Aborted));
    }

    #[test]
    fn test_arm_guard() {
        let token = CancelToken::new();
        assert!(!token.is_armed());
        {
            let _guard = token.arm();
            assert!(token.clone().is_armed());
        }
        assert!(!token.is_armed());
    }
}
