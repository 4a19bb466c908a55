//! # Blocking Policy and Interruption
//!
//! Every blocking point in the rendezvous core (the sender's reply wait,
//! the receiver's channel wait) takes a [`Wait`] describing how long to
//! block and whether the wait can be cancelled from outside.
//!
//! [`Interrupt`] is the crate's stand-in for signal delivery: the
//! transport binding raises it from its signal path, every wait
//! registered against the token wakes, and the cancelled operation
//! returns [`Error::Interrupted`](crate::Error::Interrupted). Tokens are
//! cheap handles over shared state and can be cloned across threads.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Something a raised interrupt must wake.
///
/// Implemented by the channel (receiver side) and the message record
/// (sender side). Implementations take their own wait lock before
/// notifying so a concurrent sleeper cannot miss the wake.
pub(crate) trait WaitTarget: Send + Sync {
    fn wake(&self);
}

#[derive(Default)]
struct InterruptShared {
    raised: AtomicBool,
    next_id: AtomicU64,
    waiters: Mutex<Vec<(u64, Weak<dyn WaitTarget>)>>,
}

/// Cancellation token for blocking sends and receives.
///
/// Raising the token wakes every registered waiter; the affected
/// operations observe the token and fail with `Interrupted`. The token
/// stays raised until [`Interrupt::clear`] is called, mirroring a
/// pending signal that has not been consumed.
#[derive(Clone, Default)]
pub struct Interrupt {
    shared: Arc<InterruptShared>,
}

impl Interrupt {
    /// Create a new, unraised token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every wait currently registered against this token
    pub fn raise(&self) {
        self.shared.raised.store(true, Ordering::SeqCst);
        let waiters = self.shared.waiters.lock();
        for (_, target) in waiters.iter() {
            if let Some(target) = target.upgrade() {
                target.wake();
            }
        }
    }

    /// Whether the token has been raised and not yet cleared
    pub fn is_raised(&self) -> bool {
        self.shared.raised.load(Ordering::SeqCst)
    }

    /// Reset the token so it can be reused for later waits
    pub fn clear(&self) {
        self.shared.raised.store(false, Ordering::SeqCst);
    }

    /// Register a wait target for the duration of a blocking call.
    ///
    /// The returned guard deregisters on drop; a raise between
    /// registration and sleep is caught by the caller re-checking
    /// [`Interrupt::is_raised`] under its own wait lock.
    pub(crate) fn attach(&self, target: Weak<dyn WaitTarget>) -> InterruptGuard {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.waiters.lock().push((id, target));
        InterruptGuard {
            shared: Arc::clone(&self.shared),
            id,
        }
    }
}

/// RAII deregistration for an attached wait target
pub(crate) struct InterruptGuard {
    shared: Arc<InterruptShared>,
    id: u64,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        let mut waiters = self.shared.waiters.lock();
        waiters.retain(|(id, _)| *id != self.id);
    }
}

/// How long a blocking operation may wait.
///
/// - [`Wait::forever`] blocks until completion (a send with no timeout).
/// - [`Wait::for_ms`] / [`Wait::for_duration`] block up to a deadline.
/// - [`Wait::immediate`] never sleeps: a receive polls the queue and
///   reports `TimedOut` when it is empty.
///
/// Any of the three can be made cancellable with
/// [`Wait::interruptible`].
#[derive(Clone, Copy, Default)]
pub struct Wait<'a> {
    timeout: Option<Duration>,
    interrupt: Option<&'a Interrupt>,
}

impl<'a> Wait<'a> {
    /// Block until the operation completes
    pub fn forever() -> Self {
        Self {
            timeout: None,
            interrupt: None,
        }
    }

    /// Block up to `ms` milliseconds
    pub fn for_ms(ms: u64) -> Self {
        Self::for_duration(Duration::from_millis(ms))
    }

    /// Block up to `timeout`
    pub fn for_duration(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            interrupt: None,
        }
    }

    /// Do not block at all; report `TimedOut` when nothing is ready
    pub fn immediate() -> Self {
        Self::for_duration(Duration::ZERO)
    }

    /// Allow the wait to be cancelled through `interrupt`
    pub fn interruptible(mut self, interrupt: &'a Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Absolute deadline for this wait, computed at block entry
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }

    /// Whether the attached token (if any) has been raised
    pub(crate) fn interrupted(&self) -> bool {
        self.interrupt.map(Interrupt::is_raised).unwrap_or(false)
    }

    pub(crate) fn interrupt(&self) -> Option<&'a Interrupt> {
        self.interrupt
    }
}
