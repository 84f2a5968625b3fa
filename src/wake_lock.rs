use std::sync::{Arc, Mutex, MutexGuard};

use crate::interfaces::power::{NoRetention, WakeRetention};

/// Reference-counted wake lock.
///
/// Each wake-up or boot handler takes a [`WakeLockGuard`] before it starts;
/// the backend is held on the first acquisition and released when the last
/// guard drops, whatever the handler's outcome.
///
/// Count changes and the backend calls they trigger happen under one lock,
/// so a release can never land after a later acquisition's hold.
#[derive(Clone)]
pub struct WakeLock {
    inner: Arc<WakeLockInner>,
}

struct WakeLockInner {
    count: Mutex<usize>,
    backend: Arc<dyn WakeRetention>,
}

impl WakeLockInner {
    fn count(&self) -> MutexGuard<'_, usize> {
        match self.count.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl WakeLock {
    pub fn new(backend: Arc<dyn WakeRetention>) -> Self {
        Self {
            inner: Arc::new(WakeLockInner {
                count: Mutex::new(0),
                backend,
            }),
        }
    }

    pub fn acquire(&self, reason: &'static str) -> WakeLockGuard {
        let holders = {
            let mut count = self.inner.count();
            if *count == 0 {
                self.inner.backend.hold();
            }
            *count += 1;
            *count
        };
        tracing::trace!(reason, holders, "Wake lock acquired");
        WakeLockGuard {
            inner: Arc::clone(&self.inner),
            reason,
        }
    }

    pub fn holders(&self) -> usize {
        *self.inner.count()
    }

    pub fn is_held(&self) -> bool {
        self.holders() > 0
    }
}

impl Default for WakeLock {
    fn default() -> Self {
        Self::new(Arc::new(NoRetention))
    }
}

pub struct WakeLockGuard {
    inner: Arc<WakeLockInner>,
    reason: &'static str,
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        let holders = {
            let mut count = self.inner.count();
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.inner.backend.release();
            }
            *count
        };
        tracing::trace!(reason = self.reason, holders, "Wake lock released");
    }
}
