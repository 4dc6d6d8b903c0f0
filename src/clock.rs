//! The manually-advanced virtual clock and the [`TimeSource`] facade that switches between it
//! and real time.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use tracing::{debug, trace};

use crate::real::RealTimer;
use crate::timer::{FireAction, Timer, TimerId, VirtualTimer};
use crate::{SignedDuration, Timestamp};

struct ArmedTimer {
    deadline: Timestamp,
    action: FireAction,
}

#[derive(Default)]
struct ClockState {
    now: Timestamp,
    /// Armed timers only: firing and stopping remove the entry, resetting re-inserts it, so a
    /// long-lived clock scans live timers and nothing else.
    armed: BTreeMap<TimerId, ArmedTimer>,
    next_id: u64,
    /// Bumped on every registration and reset; [`VirtualClock::wait_for_timer`] waits for a
    /// change, which makes the wait immune to spurious condvar wakeups.
    registrations: u64,
}

pub(crate) struct ClockShared {
    state: Mutex<ClockState>,
    registered: Condvar,
}

impl ClockShared {
    fn new() -> Self {
        Self { state: Mutex::new(ClockState::default()), registered: Condvar::new() }
    }

    fn register(self: &Arc<Self>, delay: SignedDuration, action: FireAction) -> VirtualTimer {
        let mut state = self.state.lock().expect("clock state lock");
        let id = TimerId(state.next_id);
        state.next_id += 1;
        if !delay.is_negative() {
            let deadline = state.now.saturating_add_signed(delay);
            state.armed.insert(id, ArmedTimer { deadline, action: action.clone() });
        }
        state.registrations += 1;
        self.registered.notify_all();
        drop(state);
        VirtualTimer::new(Arc::clone(self), id, action)
    }

    pub(crate) fn rearm(&self, id: TimerId, action: &FireAction, delay: SignedDuration) {
        let mut state = self.state.lock().expect("clock state lock");
        if delay.is_negative() {
            state.armed.remove(&id);
        } else {
            let deadline = state.now.saturating_add_signed(delay);
            state.armed.insert(id, ArmedTimer { deadline, action: action.clone() });
        }
        state.registrations += 1;
        self.registered.notify_all();
    }

    pub(crate) fn disarm(&self, id: TimerId) {
        self.state.lock().expect("clock state lock").armed.remove(&id);
    }
}

/// Control handle over an installed virtual clock, returned by
/// [`TimeSource::install_virtual`]. Cloneable; all clones drive the same clock.
#[derive(Clone)]
pub struct VirtualClock {
    shared: Arc<ClockShared>,
}

impl VirtualClock {
    /// Moves virtual time forward by `delta` and fires every timer whose deadline the move
    /// crossed, returning how many fired.
    ///
    /// The deadline boundary is exclusive: a timer armed with delay `d` does not fire when the
    /// clock lands exactly on its deadline, only when it moves strictly past it.
    ///
    /// Channel fires are delivered under the clock lock; `after_func` callbacks run on the
    /// calling thread in (deadline, registration) order after the lock is released and before
    /// this method returns. A callback may therefore freely use the source or its own timer
    /// handle, and every side effect of due callbacks is visible once `advance` returns.
    ///
    /// A negative `delta` moves time backwards (saturating at zero) and fires nothing.
    pub fn advance(&self, delta: SignedDuration) -> usize {
        let mut callbacks: Vec<(Timestamp, TimerId, Arc<dyn Fn() + Send + Sync>)> = Vec::new();
        let fired;
        {
            let mut state = self.shared.state.lock().expect("clock state lock");
            let now = state.now.saturating_add_signed(delta);
            state.now = now;
            let due: Vec<TimerId> = state
                .armed
                .iter()
                .filter(|(_, timer)| timer.deadline < now)
                .map(|(id, _)| *id)
                .collect();
            fired = due.len();
            for id in due {
                let timer = state.armed.remove(&id).expect("due timer is armed");
                match timer.action {
                    FireAction::Deliver(tx) => {
                        let _ = tx.try_send(now);
                    }
                    FireAction::Invoke(callback) => callbacks.push((timer.deadline, id, callback)),
                }
            }
        }
        trace!(delta_ns = delta.as_nanos(), fired, "virtual clock advanced");
        callbacks.sort_by_key(|entry| (entry.0, entry.1));
        for (_, _, callback) in callbacks {
            callback();
        }
        fired
    }

    /// Current virtual time. A freshly installed clock reads zero.
    pub fn now(&self) -> Timestamp {
        self.shared.state.lock().expect("clock state lock").now
    }

    /// Blocks until another thread registers or resets a timer on this clock.
    ///
    /// Used by orchestration that must know a delayed action has been scheduled before it can
    /// safely advance past it. There is no timeout variant: a caller that waits when nothing
    /// will ever register again blocks forever.
    pub fn wait_for_timer(&self) {
        let mut state = self.shared.state.lock().expect("clock state lock");
        let seen = state.registrations;
        while state.registrations == seen {
            state = self.shared.registered.wait(state).expect("clock state lock");
        }
    }

    /// Earliest armed deadline, or `None` when no timer is armed.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        let state = self.shared.state.lock().expect("clock state lock");
        state.armed.values().map(|timer| timer.deadline).min()
    }

    /// Number of currently armed timers.
    pub fn armed_timers(&self) -> usize {
        self.shared.state.lock().expect("clock state lock").armed.len()
    }
}

/// Switchable time source: the single entry point through which calling code reads the time
/// and creates timers, without knowing whether real or virtual time is in effect.
///
/// A `TimeSource` is an explicit, cloneable context object; clones share the same switch state.
/// Components that schedule work hold a clone and never talk to a clock or a platform timer
/// directly. Tests call [`install_virtual`](Self::install_virtual), drive the returned
/// [`VirtualClock`], and [`clear_virtual`](Self::clear_virtual) when done; production code
/// simply uses the source as created. Independent sources are fully isolated, so parallel
/// tests each own one without cross-contamination.
#[derive(Clone)]
pub struct TimeSource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    /// Anchor for real-time [`Timestamp`]s; virtual time ignores it.
    origin: Instant,
    /// The installed virtual clock. Guarded by its own lock, which is never held together with
    /// a clock's internal lock.
    installed: Mutex<Option<Arc<ClockShared>>>,
}

impl TimeSource {
    /// Creates a source reading real time, with `Timestamp` zero anchored at the call.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner { origin: Instant::now(), installed: Mutex::new(None) }),
        }
    }

    fn virtual_clock(&self) -> Option<Arc<ClockShared>> {
        self.inner.installed.lock().expect("time source lock").clone()
    }

    /// Nanoseconds into this source's timeline: the virtual clock's now when one is installed,
    /// wall-clock time since creation otherwise.
    pub fn now(&self) -> Timestamp {
        match self.virtual_clock() {
            Some(clock) => clock.state.lock().expect("clock state lock").now,
            None => Timestamp::since(self.inner.origin),
        }
    }

    /// Creates a one-shot timer that fires into its channel `delay` from now.
    ///
    /// A negative `delay` creates the timer disarmed: it never fires until
    /// [`reset`](Timer::reset).
    pub fn new_timer(&self, delay: SignedDuration) -> Timer {
        let (tx, rx) = mpsc::sync_channel(1);
        self.make_timer(delay, FireAction::Deliver(tx.clone()), tx, rx)
    }

    /// Creates a one-shot timer that invokes `callback` `delay` from now.
    ///
    /// The callback runs once per arming and again after each [`reset`](Timer::reset). Virtual
    /// timers invoke it on the thread calling [`VirtualClock::advance`]; real timers on the
    /// timer's worker thread.
    pub fn after_func(
        &self,
        delay: SignedDuration,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Timer {
        let (tx, rx) = mpsc::sync_channel(1);
        self.make_timer(delay, FireAction::Invoke(Arc::new(callback)), tx, rx)
    }

    fn make_timer(
        &self,
        delay: SignedDuration,
        action: FireAction,
        tx: mpsc::SyncSender<Timestamp>,
        rx: mpsc::Receiver<Timestamp>,
    ) -> Timer {
        match self.virtual_clock() {
            Some(clock) => Timer::virtual_(clock.register(delay, action), rx, tx),
            None => Timer::real(RealTimer::spawn(self.inner.origin, delay, action), rx, tx),
        }
    }

    /// Installs a fresh virtual clock starting at `Timestamp` zero and returns its control
    /// handle.
    ///
    /// At most one clock is active per source; installing over an active one replaces it
    /// silently. Install/clear are expected in matched, non-nested pairs. Timers registered
    /// with a replaced clock stay bound to it and only fire if its handle is still driven.
    pub fn install_virtual(&self) -> VirtualClock {
        let shared = Arc::new(ClockShared::new());
        *self.inner.installed.lock().expect("time source lock") = Some(Arc::clone(&shared));
        debug!("virtual clock installed");
        VirtualClock { shared }
    }

    /// Uninstalls the virtual clock, reverting the source to real time.
    pub fn clear_virtual(&self) {
        *self.inner.installed.lock().expect("time source lock") = None;
        debug!("virtual clock cleared");
    }

    /// True while a virtual clock is installed.
    pub fn is_virtual(&self) -> bool {
        self.inner.installed.lock().expect("time source lock").is_some()
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: i64) -> SignedDuration {
        SignedDuration::from_millis(n)
    }

    #[test]
    fn fired_and_stopped_timers_leave_the_registry() {
        let time = TimeSource::new();
        let clock = time.install_virtual();

        let fired = time.new_timer(ms(10));
        let stopped = time.new_timer(ms(10));
        assert_eq!(clock.armed_timers(), 2);

        stopped.stop();
        assert_eq!(clock.armed_timers(), 1);

        assert_eq!(clock.advance(ms(11)), 1);
        assert_eq!(clock.armed_timers(), 0);
        assert_eq!(clock.next_deadline(), None);

        // A reset re-inserts under the timer's stable id.
        fired.reset(ms(5));
        assert_eq!(clock.armed_timers(), 1);
        assert_eq!(clock.next_deadline(), Some(Timestamp::from_nanos(16_000_000)));
    }

    #[test]
    fn advance_counts_only_crossed_deadlines() {
        let time = TimeSource::new();
        let clock = time.install_virtual();

        let _a = time.new_timer(ms(10));
        let _b = time.new_timer(ms(20));
        let _c = time.new_timer(ms(30));
        assert_eq!(clock.advance(ms(25)), 2);
        assert_eq!(clock.advance(ms(25)), 1);
        assert_eq!(clock.advance(ms(25)), 0);
    }

    #[test]
    fn negative_advance_saturates_and_fires_nothing() {
        let time = TimeSource::new();
        let clock = time.install_virtual();

        let _timer = time.new_timer(ms(10));
        assert_eq!(clock.advance(ms(-5)), 0);
        assert_eq!(clock.now(), Timestamp::from_nanos(0));
        assert_eq!(clock.advance(ms(5)), 0);
        assert_eq!(clock.advance(ms(-1)), 0);
        assert_eq!(clock.now(), Timestamp::from_nanos(4_000_000));
    }

    #[test]
    fn registration_wakes_recorded_sequence() {
        let time = TimeSource::new();
        let clock = time.install_virtual();

        let before = clock.shared.state.lock().unwrap().registrations;
        let timer = time.new_timer(ms(-1));
        let after_new = clock.shared.state.lock().unwrap().registrations;
        assert!(after_new > before, "registration must wake waiters even when disarmed");

        timer.reset(ms(5));
        let after_reset = clock.shared.state.lock().unwrap().registrations;
        assert!(after_reset > after_new, "reset must wake waiters");
    }
}
