//! Settle and suppression primitives shared by every adapter.
//!
//! A [`SingleFlight`] hands out monotonically increasing tokens. Every new
//! token invalidates the ones issued before it, so an edit that wakes up after
//! its settle delay can tell whether a newer edit arrived in the meantime.
//!
//! A [`SuppressionWindow`] uses the same tokens to ignore device echoes for a
//! fixed time after a local command. Only the timer belonging to the most
//! recent token may close the window.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

/// How long device echoes are ignored after a local command.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdateToken(u64);

#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    generation: Arc<AtomicU64>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new token, superseding every handle issued before.
    pub fn begin(&self) -> SettleHandle {
        let token = UpdateToken(self.generation.fetch_add(1, Ordering::AcqRel) + 1);
        SettleHandle {
            token,
            generation: self.generation.clone(),
        }
    }

    /// Invalidates whatever handle is current.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Takes a token, waits `delay`, and returns the handle only if no newer
    /// token was issued while waiting.
    pub async fn settle(&self, delay: Duration) -> Option<SettleHandle> {
        let handle = self.begin();
        let settled = handle.settle(delay).await;
        settled.then_some(handle)
    }

    /// Runs `action` after `delay` unless the returned handle is cancelled or
    /// superseded first.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> SettleHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.begin();
        let pending = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if pending.is_current() {
                action.await;
            }
        });
        handle
    }
}

#[derive(Debug, Clone)]
pub struct SettleHandle {
    token: UpdateToken,
    generation: Arc<AtomicU64>,
}

impl SettleHandle {
    pub fn token(&self) -> UpdateToken {
        self.token
    }

    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.token.0
    }

    /// Waits `delay`, then reports whether this handle is still the latest.
    pub async fn settle(&self, delay: Duration) -> bool {
        tokio::time::sleep(delay).await;
        if self.is_current() {
            true
        } else {
            debug!("Update {:?} superseded during settle", self.token);
            false
        }
    }

    /// Invalidates this handle. Has no effect once a newer handle exists.
    pub fn cancel(&self) {
        let _ = self.generation.compare_exchange(
            self.token.0,
            self.token.0 + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[derive(Debug, Clone)]
pub struct SuppressionWindow {
    tokens: SingleFlight,
    active: Arc<Mutex<Option<UpdateToken>>>,
    duration: Duration,
}

impl Default for SuppressionWindow {
    fn default() -> Self {
        Self::new(SUPPRESSION_WINDOW)
    }
}

impl SuppressionWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            tokens: SingleFlight::new(),
            active: Arc::new(Mutex::new(None)),
            duration,
        }
    }

    /// Opens (or re-opens) the window and schedules it to close after the
    /// configured duration, unless it is armed again before then.
    pub fn arm(&self) -> UpdateToken {
        let token = self.tokens.begin().token();
        *self.active.lock() = Some(token);

        let active = self.active.clone();
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut current = active.lock();
            if *current == Some(token) {
                *current = None;
            }
        });
        token
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn current(&self) -> Option<UpdateToken> {
        *self.active.lock()
    }
}
