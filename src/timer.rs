use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;

use crate::clock::ClockShared;
use crate::real::RealTimer;
use crate::{SignedDuration, Timestamp};

/// Identifier of a timer registered with a virtual clock. Stable for the life of the timer;
/// also the tie-breaker that keeps same-deadline callbacks firing in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TimerId(pub(crate) u64);

/// What a timer does when its deadline is crossed.
#[derive(Clone)]
pub(crate) enum FireAction {
    /// Deliver the fire time into the single-slot channel. The send is non-blocking: a slot
    /// still holding an unconsumed earlier fire is left untouched.
    Deliver(SyncSender<Timestamp>),
    /// Invoke a user callback.
    Invoke(Arc<dyn Fn() + Send + Sync>),
}

/// One-shot timer handle returned by [`TimeSource::new_timer`](crate::TimeSource::new_timer)
/// and [`TimeSource::after_func`](crate::TimeSource::after_func).
///
/// The backend — real wall-clock or virtual — is chosen once, at creation, by the facade;
/// both variants expose identical behaviour through this handle. A negative delay is the
/// documented "never fire" state everywhere a delay is accepted.
///
/// Dropping the handle does not cancel an armed timer: an `after_func` callback still runs at
/// its deadline. Call [`stop`](Self::stop) first to cancel.
pub struct Timer {
    backend: TimerBackend,
    fires: Receiver<Timestamp>,
    /// Keeps the slot's sender alive so `channel()` reports empty rather than disconnected on
    /// timers whose backend never delivers (e.g. `after_func`).
    _fires_tx: SyncSender<Timestamp>,
}

enum TimerBackend {
    Real(RealTimer),
    Virtual(VirtualTimer),
}

impl Timer {
    pub(crate) fn real(
        timer: RealTimer,
        fires: Receiver<Timestamp>,
        tx: SyncSender<Timestamp>,
    ) -> Self {
        Self { backend: TimerBackend::Real(timer), fires, _fires_tx: tx }
    }

    pub(crate) fn virtual_(
        timer: VirtualTimer,
        fires: Receiver<Timestamp>,
        tx: SyncSender<Timestamp>,
    ) -> Self {
        Self { backend: TimerBackend::Virtual(timer), fires, _fires_tx: tx }
    }

    /// The single-slot fire channel, carrying the backend's current time at each fire.
    ///
    /// At most one unconsumed fire is buffered; for `after_func` timers the channel exists but
    /// is never sent to.
    pub fn channel(&self) -> &Receiver<Timestamp> {
        &self.fires
    }

    /// Rearms the timer to fire `delay` after the backend's current time.
    ///
    /// Legal in every state: an armed timer moves to the new deadline, a fired or stopped one
    /// is armed afresh. A negative `delay` disarms instead.
    pub fn reset(&self, delay: SignedDuration) {
        match &self.backend {
            TimerBackend::Real(t) => t.reset(delay),
            TimerBackend::Virtual(t) => t.reset(delay),
        }
    }

    /// Disarms the timer and clears any unconsumed fire. Idempotent; stopping a disarmed timer
    /// is a no-op.
    pub fn stop(&self) {
        match &self.backend {
            TimerBackend::Real(t) => t.stop(),
            TimerBackend::Virtual(t) => t.stop(),
        }
        // Fires are delivered under the backend lock `stop` just held, so nothing can land
        // after this drain.
        while self.fires.try_recv().is_ok() {}
    }
}

/// Virtual-backend side of a [`Timer`]: a stable id plus the clock it is registered with.
pub(crate) struct VirtualTimer {
    clock: Arc<ClockShared>,
    id: TimerId,
    action: FireAction,
}

impl VirtualTimer {
    pub(crate) fn new(clock: Arc<ClockShared>, id: TimerId, action: FireAction) -> Self {
        Self { clock, id, action }
    }

    fn reset(&self, delay: SignedDuration) {
        self.clock.rearm(self.id, &self.action, delay);
    }

    fn stop(&self) {
        self.clock.disarm(self.id);
    }
}
