//! A periodic timer on a run-loop fires repeatedly at its period while a
//! one-shot bound to the same run-loop fires exactly once and then stays
//! inactive (§4.6, §4.7; §8 scenario list).
//!
//! Real-time scale is compressed (a 1500ms period over a 10s window becomes
//! 50ms over ~333ms) so the test finishes quickly; the period-to-window
//! ratio, and so the expected fire count, is preserved.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use argus_core::Timeout;
use argus_kernel::{Kernel, RunLoop, RunLoopStatus, Thread, Timer, TimerMode};
use argus_port_std::StdPort;

use common::Completion;

static KERNEL: Kernel<StdPort> = Kernel::new(StdPort::new());

static IDLE: Thread<StdPort> = Thread::new("idle");
static mut IDLE_STACK: [u8; 256] = [0; 256];

static LOOPER: Thread<StdPort> = Thread::new("looper");
static mut LOOPER_STACK: [u8; 256] = [0; 256];

static RUN_LOOP: RunLoop<StdPort> = RunLoop::new("rl", &LOOPER);

const PERIOD_TICKS: u32 = 50;
const ONE_SHOT_DELAY_TICKS: u32 = 80;
const WINDOW_MS: u32 = 333;

static PERIODIC: Timer<StdPort> = Timer::new("periodic", on_periodic, 0, TimerMode::Periodic, PERIOD_TICKS);
static ONE_SHOT: Timer<StdPort> = Timer::new("oneshot", on_one_shot, 0, TimerMode::OneShot, ONE_SHOT_DELAY_TICKS);

static PERIODIC_COUNT: AtomicU32 = AtomicU32::new(0);
static ONE_SHOT_COUNT: AtomicU32 = AtomicU32::new(0);

static DONE: Completion<(u32, u32, bool)> = Completion::new();

fn on_periodic(_timer: &'static Timer<StdPort>, _arg: usize) {
    PERIODIC_COUNT.fetch_add(1, Ordering::SeqCst);
}

fn on_one_shot(_timer: &'static Timer<StdPort>, _arg: usize) {
    ONE_SHOT_COUNT.fetch_add(1, Ordering::SeqCst);
}

fn entry_looper(_arg: usize) {
    KERNEL.run_loop_add_timer(&RUN_LOOP, &PERIODIC);
    KERNEL.run_loop_add_timer(&RUN_LOOP, &ONE_SHOT);
    KERNEL.timer_start(&PERIODIC).expect("timer_start(periodic) failed");
    KERNEL.timer_start(&ONE_SHOT).expect("timer_start(one-shot) failed");

    let status = KERNEL.run_loop_run(&RUN_LOOP, Timeout::Millis(WINDOW_MS));
    assert_eq!(status, RunLoopStatus::TimedOut, "run-loop should idle out once the window passes");

    DONE.signal((
        PERIODIC_COUNT.load(Ordering::SeqCst),
        ONE_SHOT_COUNT.load(Ordering::SeqCst),
        ONE_SHOT.is_active(),
    ));
}

fn idle_entry(_arg: usize) {
    KERNEL.resume(&LOOPER);
    loop {
        std::thread::park_timeout(Duration::from_millis(50));
    }
}

#[test]
fn periodic_timer() {
    common::init_logging();

    unsafe {
        KERNEL.spawn_thread(&LOOPER, &mut LOOPER_STACK, entry_looper, 0, 60).unwrap();
    }

    let idle_stack: &'static mut [u8] = unsafe { &mut IDLE_STACK };
    common::boot(&KERNEL, &IDLE, idle_stack, idle_entry);

    let (periodic_count, one_shot_count, one_shot_active) =
        DONE.wait_timeout(Duration::from_secs(5)).expect("run-loop thread never finished");

    assert!(
        (6..=7).contains(&periodic_count),
        "expected 6 or 7 periodic fires over the window, got {periodic_count}"
    );
    assert_eq!(one_shot_count, 1, "one-shot timer should fire exactly once");
    assert!(!one_shot_active, "one-shot timer should be inactive after firing");
}
