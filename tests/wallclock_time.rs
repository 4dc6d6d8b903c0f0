//! Real-backend behaviour. Margins are generous on purpose: these tests assert ordering and
//! delivery, not latency.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use faketime::{SignedDuration, TimeSource};

#[test]
fn timer_fires_exactly_once() {
    let time = TimeSource::new();
    let timer = time.new_timer(SignedDuration::from_millis(10));

    let fired_at = timer.channel().recv_timeout(Duration::from_secs(5)).expect("timer fired");
    assert!(fired_at.as_nanos() > 0);

    thread::sleep(Duration::from_millis(50));
    assert!(timer.channel().try_recv().is_err());
}

#[test]
fn negative_delay_never_fires_until_reset() {
    let time = TimeSource::new();
    let timer = time.new_timer(SignedDuration::from_millis(-1));

    thread::sleep(Duration::from_millis(100));
    assert!(timer.channel().try_recv().is_err());

    timer.reset(SignedDuration::from_millis(5));
    timer.channel().recv_timeout(Duration::from_secs(5)).expect("reset rearms");
}

#[test]
fn stop_prevents_the_fire() {
    let time = TimeSource::new();
    let timer = time.new_timer(SignedDuration::from_millis(100));
    timer.stop();

    thread::sleep(Duration::from_millis(300));
    assert!(timer.channel().try_recv().is_err());
}

#[test]
fn stop_leaves_the_channel_empty() {
    let time = TimeSource::new();
    let timer = time.new_timer(SignedDuration::from_millis(5));

    // Whether or not the fire has already been delivered by now, stopping must leave nothing
    // behind to consume.
    thread::sleep(Duration::from_millis(200));
    timer.stop();
    assert!(timer.channel().try_recv().is_err());
}

#[test]
fn reset_shortens_a_long_delay() {
    let time = TimeSource::new();
    let timer = time.new_timer(SignedDuration::from_hours(1));
    timer.reset(SignedDuration::from_millis(10));

    timer.channel().recv_timeout(Duration::from_secs(5)).expect("shortened timer fired");
}

#[test]
fn after_func_invokes_the_callback() {
    let time = TimeSource::new();
    let (tx, rx) = mpsc::channel();
    let _timer = time.after_func(SignedDuration::from_millis(10), move || {
        let _ = tx.send(());
    });

    rx.recv_timeout(Duration::from_secs(5)).expect("callback ran");
}

#[test]
fn dropping_an_armed_timer_does_not_cancel_it() {
    let time = TimeSource::new();
    let (tx, rx) = mpsc::channel();
    drop(time.after_func(SignedDuration::from_millis(10), move || {
        let _ = tx.send(());
    }));

    rx.recv_timeout(Duration::from_secs(5)).expect("detached timer still fired");
}

#[test]
fn now_is_monotonic() {
    let time = TimeSource::new();
    let a = time.now();
    let b = time.now();
    assert!(b >= a);

    thread::sleep(Duration::from_millis(10));
    assert!(time.now() > b);
}
