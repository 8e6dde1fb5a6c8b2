//! A low-priority mutex owner is boosted to a blocked higher-priority
//! waiter's priority for the duration of ownership, and restored to its own
//! priority on unlock, handing the mutex to the waiter (§4.3; §8 scenario
//! list).

mod common;

use std::time::Duration;

use argus_core::Timeout;
use argus_kernel::{Kernel, Mutex, Thread};
use argus_port_std::StdPort;

use common::Completion;

static KERNEL: Kernel<StdPort> = Kernel::new(StdPort::new());

static IDLE: Thread<StdPort> = Thread::new("idle");
static mut IDLE_STACK: [u8; 256] = [0; 256];

static THREAD_A: Thread<StdPort> = Thread::new("A");
static mut STACK_A: [u8; 256] = [0; 256];
static THREAD_B: Thread<StdPort> = Thread::new("B");
static mut STACK_B: [u8; 256] = [0; 256];

static MUTEX: Mutex<StdPort> = Mutex::new("M");

static A_BOOSTED_PRIORITY: Completion<u8> = Completion::new();
static A_RESTORED_PRIORITY: Completion<u8> = Completion::new();
static B_GOT_OWNERSHIP: Completion<bool> = Completion::new();

fn entry_a(_arg: usize) {
    KERNEL.mutex_lock(&MUTEX, Timeout::Infinite).expect("A failed to lock M");
    // Hold long enough for B to block on it and boost us.
    KERNEL.sleep(Timeout::Millis(150));
    A_BOOSTED_PRIORITY.signal(KERNEL.get_priority(&THREAD_A));
    KERNEL.mutex_unlock(&MUTEX).expect("A failed to unlock M");
    A_RESTORED_PRIORITY.signal(KERNEL.get_priority(&THREAD_A));
}

fn entry_b(_arg: usize) {
    // Give A time to acquire the mutex first.
    KERNEL.sleep(Timeout::Millis(50));
    KERNEL.mutex_lock(&MUTEX, Timeout::Infinite).expect("B failed to lock M");
    B_GOT_OWNERSHIP.signal(core::ptr::eq(MUTEX.get_owner().expect("M has no owner"), &THREAD_B));
    KERNEL.mutex_unlock(&MUTEX).expect("B failed to unlock M");
}

fn idle_entry(_arg: usize) {
    KERNEL.resume(&THREAD_A);
    KERNEL.resume(&THREAD_B);
    loop {
        std::thread::park_timeout(Duration::from_millis(50));
    }
}

#[test]
fn priority_inheritance() {
    common::init_logging();

    unsafe {
        KERNEL.spawn_thread(&THREAD_A, &mut STACK_A, entry_a, 0, 60).unwrap();
        KERNEL.spawn_thread(&THREAD_B, &mut STACK_B, entry_b, 0, 70).unwrap();
    }

    let idle_stack: &'static mut [u8] = unsafe { &mut IDLE_STACK };
    common::boot(&KERNEL, &IDLE, idle_stack, idle_entry);

    let boosted = A_BOOSTED_PRIORITY.wait_timeout(Duration::from_secs(2)).expect("A never reported a boosted priority");
    assert_eq!(boosted, 70, "A should inherit B's priority while B is blocked on M");

    let restored = A_RESTORED_PRIORITY.wait_timeout(Duration::from_secs(2)).expect("A never reported a restored priority");
    assert_eq!(restored, 60, "A should drop back to its own priority after unlocking M");

    let got_it = B_GOT_OWNERSHIP.wait_timeout(Duration::from_secs(2)).expect("B never reported mutex ownership");
    assert!(got_it, "B should become M's owner once A unlocks");
}
