//! Shared scaffolding for the end-to-end scenario tests.
//!
//! `Kernel::init`'s final dispatch never returns to its caller (on real
//! hardware it is an exception return into the first thread; on
//! [`argus_port_std::StdPort`] it parks the calling OS thread forever), so
//! each test spawns a dedicated "boot" thread to call it and reports back
//! over a plain [`Completion`] rather than ever observing `init` return.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use argus_kernel::{Kernel, Thread};
use argus_port_std::StdPort;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The tick quantum every scenario test runs at: fine enough that
/// millisecond-scale timeouts in test bodies resolve with low jitter, short
/// enough that tests finish quickly.
pub const MS_PER_TICK: u32 = 1;

/// Finish and boot a kernel on a dedicated OS thread, the way the module
/// doc comment above explains. Returns immediately; the kernel is running
/// by the time any of its threads' first dispatch occurs.
///
/// `idle_entry` is the scenario's choice, not a fixed park-forever loop: the
/// kernel only ever has a `current` thread to compare against once it is
/// running (§4.1), so [`Kernel::resume`] on a freshly-spawned worker thread
/// must happen from inside a thread the kernel itself is already running,
/// not from test setup code before [`boot`] is called. Every scenario's
/// `idle_entry` resumes that scenario's worker threads as its first action,
/// then settles into idleness.
pub fn boot(
    kernel: &'static Kernel<StdPort>,
    idle: &'static Thread<StdPort>,
    idle_stack: &'static mut [u8],
    idle_entry: fn(usize),
) {
    argus_port_std::install(kernel);
    kernel
        .spawn_idle_thread(idle, idle_stack, idle_entry, 0)
        .expect("idle thread stack too small");
    std::thread::Builder::new()
        .name("argus-boot".into())
        .spawn(move || kernel.init(idle, MS_PER_TICK))
        .expect("failed to spawn boot thread");
}

/// A one-shot signal a kernel thread can report a result through using
/// plain `std` synchronization (not a kernel primitive), and the test
/// thread can block on with a timeout.
pub struct Completion<T> {
    state: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T: Clone> Completion<T> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn signal(&self, value: T) {
        let mut state = self.state.lock().expect("completion mutex poisoned");
        *state = Some(value);
        self.cond.notify_all();
    }

    /// Block for up to `timeout`, returning the signaled value or `None` if
    /// nothing signaled in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let state = self.state.lock().expect("completion mutex poisoned");
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.is_none())
            .expect("completion mutex poisoned");
        state.clone()
    }
}
