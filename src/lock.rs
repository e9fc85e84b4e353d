//! Dual-mode mutual exclusion usable from blocking and async call paths.

use std::fmt;
use std::pin::pin;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// Mutual-exclusion primitive shared by blocking and non-blocking callers.
///
/// Blocking callers park on a condition variable; async callers wait on a
/// [`Notify`] and never block the executor thread. Every release wakes one
/// waiter of each kind and the losers go back to waiting, so exclusive access
/// holds no matter how the two styles are mixed.
///
/// A guard must not be held by a blocking caller while the same thread drives
/// an async caller of the same lock.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::Lock;
///
/// # #[tokio::main] async fn main() {
/// let lock = Lock::new();
/// {
///     let _guard = lock.lock();
///     assert!(lock.try_lock().is_none());
/// }
/// let _guard = lock.lock_async().await;
/// assert!(lock.is_locked());
/// # }
/// ```
pub struct Lock {
    locked: Mutex<bool>,
    released: Condvar,
    notify: Notify,
}

impl Lock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            released: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Acquires the lock, blocking the current thread until it is available.
    pub fn lock(&self) -> LockGuard<'_> {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
        LockGuard { lock: self }
    }

    /// Acquires the lock, suspending the current task until it is available.
    pub async fn lock_async(&self) -> LockGuard<'_> {
        loop {
            // Register interest before checking so a release in between is not lost
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if let Some(guard) = self.try_lock() {
                return guard;
            }
            notified.await;
        }
    }

    /// Acquires the lock only if it is free.
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        let mut locked = self.locked.lock();
        if *locked {
            None
        } else {
            *locked = true;
            Some(LockGuard { lock: self })
        }
    }

    /// Returns whether some caller currently holds the lock.
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }

    fn unlock(&self) {
        *self.locked.lock() = false;
        self.released.notify_one();
        self.notify.notify_one();
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock").field("locked", &self.is_locked()).finish()
    }
}

/// Releases the [`Lock`] when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
