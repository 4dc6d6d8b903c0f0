//! Wall-clock backend for [`Timer`](crate::Timer), used whenever no virtual clock is
//! installed.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;

use tracing::trace;

use crate::timer::FireAction;
use crate::{SignedDuration, Timestamp};

/// Thread-backed one-shot timer.
///
/// A dedicated worker parks until the armed deadline. Arming, firing and disarming are all
/// decided under one lock, and channel delivery happens while that lock is held, which is what
/// makes `reset`/`stop` race-safe against an expiry that has already woken the worker: the
/// worker re-reads the deadline after every wakeup, and firing consumes the arming atomically.
pub(crate) struct RealTimer {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

struct State {
    /// Absolute wall-clock deadline; `None` means disarmed.
    deadline: Option<Instant>,
    /// The handle was dropped while armed; fire once, then exit.
    detached: bool,
    shutdown: bool,
}

/// `None` for negative delays (the "never fire" state) and for deadlines beyond what `Instant`
/// can represent.
fn deadline_after(delay: SignedDuration) -> Option<Instant> {
    Instant::now().checked_add(delay.to_std()?)
}

impl RealTimer {
    pub(crate) fn spawn(origin: Instant, delay: SignedDuration, action: FireAction) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                deadline: deadline_after(delay),
                detached: false,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name("faketime-timer".into())
            .spawn(move || worker.run(origin, action))
            .expect("spawn timer worker");
        Self { shared }
    }

    pub(crate) fn reset(&self, delay: SignedDuration) {
        let mut state = self.shared.state.lock().expect("timer state lock");
        state.deadline = deadline_after(delay);
        self.shared.cond.notify_all();
    }

    pub(crate) fn stop(&self) {
        let mut state = self.shared.state.lock().expect("timer state lock");
        state.deadline = None;
        self.shared.cond.notify_all();
    }
}

impl Drop for RealTimer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().expect("timer state lock");
        if state.deadline.is_some() {
            // Dropping does not cancel: let the worker fire the pending arming, then exit.
            state.detached = true;
        } else {
            state.shutdown = true;
        }
        // The worker is signalled, not joined: a callback that drops its own timer handle must
        // not deadlock on its own thread.
        self.shared.cond.notify_all();
    }
}

impl Shared {
    fn run(self: Arc<Self>, origin: Instant, action: FireAction) {
        let mut state = self.state.lock().expect("timer state lock");
        loop {
            if state.shutdown {
                return;
            }
            let Some(deadline) = state.deadline else {
                if state.detached {
                    return;
                }
                state = self.cond.wait(state).expect("timer state lock");
                continue;
            };
            match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => {
                    let (guard, _) = self
                        .cond
                        .wait_timeout(state, remaining)
                        .expect("timer state lock");
                    state = guard;
                }
                _ => {
                    // Due: consume the arming while still holding the lock so a concurrent
                    // `stop` cannot observe a fire after it drained the channel.
                    state.deadline = None;
                    let fired_at = Timestamp::since(origin);
                    trace!(at_ns = fired_at.as_nanos(), "wall-clock timer fired");
                    match &action {
                        FireAction::Deliver(tx) => {
                            let _ = tx.try_send(fired_at);
                        }
                        FireAction::Invoke(callback) => {
                            // The arming is already consumed; run user code unlocked so it may
                            // reset or drop this very timer.
                            let callback = Arc::clone(callback);
                            drop(state);
                            callback();
                            state = self.state.lock().expect("timer state lock");
                        }
                    }
                }
            }
        }
    }
}
