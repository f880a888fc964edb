//! Run lifecycle primitives shared by the coordinator and the sustained-load controller
//!
//! - [`CancelToken`]: cooperative cancellation with a cancellable sleep.
//! - [`RunGuard`]: the system-wide "is any run active" flag. Hand the same guard to
//!   every component that must be mutually exclusive.
//! - [`ResultSlot`]: the observable "latest published result" for a component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Cooperative cancellation flag.
///
/// Cloning shares the flag. Work is never interrupted; callers check
/// [`CancelToken::is_cancelled`] at boundaries and use [`CancelToken::sleep`] for
/// waits that must end early on cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = lock_recover(&self.inner.cancelled);
        *cancelled = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock_recover(&self.inner.cancelled)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` when the sleep ended because of cancellation (including a
    /// cancellation that was already requested before the call).
    ///
    /// A duration past the clock's range waits until cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut cancelled = lock_recover(&self.inner.cancelled);
        loop {
            if *cancelled {
                return true;
            }
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    match self.inner.wake.wait_timeout(cancelled, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.inner.wake.wait(cancelled) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}

/// Exclusive run flag shared between every component that exposes `start`.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    active: Arc<AtomicBool>,
}

/// Held for the duration of one run; releases the guard on drop.
#[derive(Debug)]
pub struct RunPermit {
    active: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` when another run already holds it.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                active: Arc::clone(&self.active),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Latest published value of a component, observable through `tokio::sync::watch`.
///
/// Publishing replaces the whole value at once so observers never see a
/// partially-built result.
#[derive(Debug)]
pub struct ResultSlot<T> {
    tx: watch::Sender<Option<Arc<T>>>,
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultSlot<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn publish(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.tx.send_replace(Some(Arc::clone(&value)));
        value
    }

    pub fn latest(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.tx.subscribe()
    }
}

pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
