//! One-shot completion events
//!
//! A [`Completion`] is handed to whoever waits on a frame or capture job and
//! signalled exactly once, either by the interrupt path or by a forced
//! completion when the output is torn down.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dpu_hw::ErrorKind;

/// How a frame or job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    /// Hardware finished normally
    Done,
    /// Hardware or programming failure, the frame was abandoned
    Failed(ErrorKind),
    /// Completed without hardware involvement (output disabled, job dropped)
    Forced,
}

impl CompletionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug, Default)]
struct Inner {
    status: Mutex<Option<CompletionStatus>>,
    cond: Condvar,
}

/// Shareable one-shot completion event
#[derive(Debug, Clone, Default)]
pub struct Completion {
    inner: Arc<Inner>,
}

impl Completion {
    /// Create a new unsignalled completion
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the completion. Returns `false` if it was already signalled,
    /// in which case the first status is kept.
    pub fn complete(&self, status: CompletionStatus) -> bool {
        let mut slot = self.inner.status.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(status);
        self.inner.cond.notify_all();
        true
    }

    pub fn is_complete(&self) -> bool {
        self.inner.status.lock().is_some()
    }

    /// Status, if already signalled
    pub fn status(&self) -> Option<CompletionStatus> {
        *self.inner.status.lock()
    }

    /// Block until signalled
    pub fn wait(&self) -> CompletionStatus {
        let mut slot = self.inner.status.lock();
        loop {
            if let Some(status) = *slot {
                return status;
            }
            self.inner.cond.wait(&mut slot);
        }
    }

    /// Block until signalled or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CompletionStatus> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.status.lock();
        while slot.is_none() {
            if self.inner.cond.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        *slot
    }

    /// Two handles refer to the same event
    pub fn same_as(&self, other: &Completion) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_signalled_once() {
        let completion = Completion::new();
        assert!(!completion.is_complete());
        assert!(completion.complete(CompletionStatus::Done));
        assert!(!completion.complete(CompletionStatus::Forced));
        assert_eq!(completion.status(), Some(CompletionStatus::Done));
    }

    #[test]
    fn test_wait_across_threads() {
        let completion = Completion::new();
        let signaller = completion.clone();
        let handle = thread::spawn(move || {
            signaller.complete(CompletionStatus::Failed(ErrorKind::Hardware));
        });
        assert_eq!(completion.wait(), CompletionStatus::Failed(ErrorKind::Hardware));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout() {
        let completion = Completion::new();
        assert_eq!(completion.wait_timeout(Duration::from_millis(5)), None);
        completion.complete(CompletionStatus::Forced);
        assert_eq!(
            completion.wait_timeout(Duration::from_millis(5)),
            Some(CompletionStatus::Forced)
        );
    }
}
