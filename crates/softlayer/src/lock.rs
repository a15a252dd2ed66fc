//! Serialization of remote API interaction.
//!
//! One [`ApiLock`] is shared by every driver in a process, so a batch of
//! machines provisions one remote interaction at a time. Build it once with
//! [`ApiLock::serialized`] and clone it into each driver: clones share the
//! mutex, separately built locks do not. Guards are never held across poll
//! sleeps and never nested.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-wide API lock, or a no-op stand-in.
#[derive(Debug, Clone)]
pub struct ApiLock {
    inner: Option<Arc<Mutex<()>>>,
}

/// Held while talking to the provider.
#[derive(Debug)]
#[must_use = "the lock is released when the guard is dropped"]
pub struct ApiGuard {
    _guard: Option<OwnedMutexGuard<()>>,
}

impl ApiLock {
    /// A new lock admitting one holder at a time, independent of every
    /// other lock built this way.
    #[must_use]
    pub fn serialized() -> Self {
        Self {
            inner: Some(Arc::new(Mutex::new(()))),
        }
    }

    /// A lock that never blocks.
    #[must_use]
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Whether acquiring may block.
    #[must_use]
    pub fn is_serialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Wait for the lock.
    pub async fn acquire(&self) -> ApiGuard {
        let guard = match &self.inner {
            Some(mutex) => Some(Arc::clone(mutex).lock_owned().await),
            None => None,
        };
        ApiGuard { _guard: guard }
    }
}
