//! Deleting a semaphore while threads are blocked on it wakes every one of
//! them with `ObjectDeleted` rather than leaving them parked forever (§4.2
//! "delete"; §8 scenario list).

mod common;

use std::time::Duration;

use argus_core::{Status, Timeout};
use argus_kernel::{Kernel, Semaphore, Thread};
use argus_port_std::StdPort;

use common::Completion;

static KERNEL: Kernel<StdPort> = Kernel::new(StdPort::new());

static IDLE: Thread<StdPort> = Thread::new("idle");
static mut IDLE_STACK: [u8; 256] = [0; 256];

static WAITER_1: Thread<StdPort> = Thread::new("waiter-1");
static mut WAITER_1_STACK: [u8; 256] = [0; 256];
static WAITER_2: Thread<StdPort> = Thread::new("waiter-2");
static mut WAITER_2_STACK: [u8; 256] = [0; 256];
static DELETER: Thread<StdPort> = Thread::new("deleter");
static mut DELETER_STACK: [u8; 256] = [0; 256];

static SEM: Semaphore<StdPort> = Semaphore::new("s", 0);

static WAITER_1_STATUS: Completion<Status> = Completion::new();
static WAITER_2_STATUS: Completion<Status> = Completion::new();

fn entry_waiter_1(_arg: usize) {
    let result = KERNEL.semaphore_get(&SEM, Timeout::Infinite);
    WAITER_1_STATUS.signal(result.err().expect("semaphore_get should fail once deleted"));
}

fn entry_waiter_2(_arg: usize) {
    let result = KERNEL.semaphore_get(&SEM, Timeout::Infinite);
    WAITER_2_STATUS.signal(result.err().expect("semaphore_get should fail once deleted"));
}

fn entry_deleter(_arg: usize) {
    KERNEL.semaphore_delete(&SEM);
}

fn idle_entry(_arg: usize) {
    // Each resume only returns once the resumed thread blocks or finishes,
    // so by the time the deleter is resumed both waiters are already parked
    // on `SEM`'s wait set.
    KERNEL.resume(&WAITER_1);
    KERNEL.resume(&WAITER_2);
    KERNEL.resume(&DELETER);
    loop {
        std::thread::park_timeout(Duration::from_millis(50));
    }
}

#[test]
fn semaphore_deletion() {
    common::init_logging();

    unsafe {
        KERNEL.spawn_thread(&WAITER_1, &mut WAITER_1_STACK, entry_waiter_1, 0, 60).unwrap();
        KERNEL.spawn_thread(&WAITER_2, &mut WAITER_2_STACK, entry_waiter_2, 0, 60).unwrap();
        KERNEL.spawn_thread(&DELETER, &mut DELETER_STACK, entry_deleter, 0, 70).unwrap();
    }

    let idle_stack: &'static mut [u8] = unsafe { &mut IDLE_STACK };
    common::boot(&KERNEL, &IDLE, idle_stack, idle_entry);

    let status_1 = WAITER_1_STATUS.wait_timeout(Duration::from_secs(2)).expect("waiter 1 never unblocked");
    let status_2 = WAITER_2_STATUS.wait_timeout(Duration::from_secs(2)).expect("waiter 2 never unblocked");

    assert_eq!(status_1, Status::ObjectDeleted);
    assert_eq!(status_2, Status::ObjectDeleted);
}
