use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

use crate::error::{ProverError, ProverResult};

/// Cooperative cancellation signal shared between the analysis and provers.
///
/// Cloning yields a handle on the same signal. Once requested, a shutdown
/// cannot be revoked.
#[derive(Debug, Clone, Default)]
pub struct ShutdownNotifier {
    requested: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self, reason: impl Into<String>) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.requested.store(true, Ordering::Release);
    }

    pub fn should_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// `Err(Interrupted)` once a shutdown was requested.
    pub fn check(&self) -> ProverResult<()> {
        if self.should_shutdown() {
            return Err(ProverError::Interrupted {
                reason: self.reason().unwrap_or_else(|| "shutdown requested".to_string()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_wins() {
        let notifier = ShutdownNotifier::new();
        let handle = notifier.clone();
        assert!(notifier.check().is_ok());

        handle.request_shutdown("time limit");
        handle.request_shutdown("user");
        assert!(notifier.should_shutdown());
        assert_eq!(
            notifier.check(),
            Err(ProverError::Interrupted {
                reason: "time limit".to_string()
            })
        );
    }
}
