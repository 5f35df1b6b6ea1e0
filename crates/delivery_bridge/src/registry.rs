//! Process-wide table of calls that are waiting on a completion callback.
//!
//! A token is present exactly while its call is in flight. Whichever of
//! the completion callback, the timeout path or the start-failure path
//! reaches [`Registry::complete`]/[`Registry::cancel`] first removes it;
//! everybody after that sees `false` and leaves the call alone.

use std::{
    collections::HashMap,
    ffi::{c_int, c_void},
    fmt,
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use once_cell::sync::Lazy;
use tracing::trace;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Correlates a completion callback with its waiting caller.
///
/// Tokens are plain counters, never addresses. They cross the C boundary
/// as the integer value of the `user_data` pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallToken(u64);

impl CallToken {
    pub fn next() -> Self {
        CallToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_user_data(self) -> *mut c_void {
        self.0 as usize as *mut c_void
    }

    pub fn from_user_data(user_data: *mut c_void) -> Self {
        CallToken(user_data as usize as u64)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the completion callback reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    pub return_code: c_int,
    pub message: Option<String>,
}

/// One in-flight call: a one-shot signal plus the slot it guards.
///
/// Shared between the registry and the blocked caller, so a callback that
/// shows up after the caller gave up still touches live memory.
pub struct PendingCall {
    token: CallToken,
    outcome: Mutex<Option<CallOutcome>>,
    ready: Condvar,
}

impl PendingCall {
    pub fn new(token: CallToken) -> Arc<Self> {
        Arc::new(Self {
            token,
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    pub fn token(&self) -> CallToken {
        self.token
    }

    /// Blocks until the outcome lands or `timeout` elapses.
    ///
    /// A timeout too large to express as an `Instant` waits without a deadline.
    pub fn wait(&self, timeout: Duration) -> Option<CallOutcome> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = slot.take() {
                return Some(outcome);
            }
            let Some(deadline) = deadline else {
                slot = self.ready.wait(slot).unwrap_or_else(|poisoned| poisoned.into_inner());
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot = guard;
        }
    }

    /// Non-blocking read, used once the caller knows the callback won.
    pub fn take(&self) -> Option<CallOutcome> {
        lock(&self.outcome).take()
    }

    fn deposit(&self, outcome: CallOutcome) {
        *lock(&self.outcome) = Some(outcome);
    }

    fn signal(&self) {
        self.ready.notify_one();
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall").field("token", &self.token).finish()
    }
}

#[derive(Default)]
pub struct Registry {
    pending: Mutex<HashMap<CallToken, Arc<PendingCall>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shared by the bridge and the C completion callback.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub fn register(&self, call: Arc<PendingCall>) {
        let token = call.token();
        lock(&self.pending).insert(token, call);
        trace!(%token, "registered pending call");
    }

    /// Hands `outcome` to the waiter behind `token` and wakes it.
    ///
    /// Returns `false` when the token is unknown (already timed out, or a
    /// second delivery); nothing is touched in that case.
    pub fn complete(&self, token: CallToken, outcome: CallOutcome) -> bool {
        let call = {
            let mut pending = lock(&self.pending);
            let Some(call) = pending.remove(&token) else {
                return false;
            };
            // Deposit before the entry disappears from anyone's view, so a
            // losing `cancel` can read it straight away.
            call.deposit(outcome);
            call
        };
        call.signal();
        trace!(%token, "completed pending call");
        true
    }

    /// Drops the entry for `token`; `false` means someone else got there first.
    pub fn cancel(&self, token: CallToken) -> bool {
        let removed = lock(&self.pending).remove(&token).is_some();
        if removed {
            trace!(%token, "cancelled pending call");
        }
        removed
    }

    pub fn contains(&self, token: CallToken) -> bool {
        lock(&self.pending).contains_key(&token)
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// A panic while holding one of these locks leaves plain data behind, never a
// half-applied invariant, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
