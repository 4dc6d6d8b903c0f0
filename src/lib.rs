//! Deterministic, swappable time for timer-driven code.
//!
//! Production code reads the time and schedules one-shot timers through a [`TimeSource`];
//! tests install a [`VirtualClock`] on that source and advance it manually, observing exactly
//! which deferred actions fire and when, with no real sleeping involved. Calling code never
//! learns which backend is active: both expose the same [`Timer`] handle.
//!
//! ```
//! use faketime::{SignedDuration, TimeSource};
//!
//! let time = TimeSource::new();
//! let clock = time.install_virtual();
//!
//! let timer = time.new_timer(SignedDuration::from_millis(100));
//! assert_eq!(clock.advance(SignedDuration::from_millis(100)), 0); // the boundary is exclusive
//! assert_eq!(clock.advance(SignedDuration::from_millis(1)), 1);
//! assert!(timer.channel().try_recv().is_ok());
//!
//! time.clear_virtual(); // back to the wall clock
//! ```
//!
//! [`SignedDuration`] and [`Span`] are the plain value types the timer API trades in:
//! durations are signed (a negative delay is the documented "never fire" state), parse from
//! human-readable text (`"1h30m"`), and round to unit multiples; spans are start-plus-extent
//! intervals with intersection and bounding-union.

mod clock;
mod duration;
mod real;
mod span;
mod timer;
mod timestamp;

pub use clock::{TimeSource, VirtualClock};
pub use duration::{ParseDurationError, SignedDuration};
pub use span::Span;
pub use timer::Timer;
pub use timestamp::Timestamp;
