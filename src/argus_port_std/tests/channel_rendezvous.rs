//! A receiver started first blocks until a sender rendezvous, then gets
//! exactly the value sent (§4.5; §8 scenario list).

mod common;

use std::time::Duration;

use argus_core::Timeout;
use argus_kernel::{Channel, Kernel, Thread};
use argus_port_std::StdPort;

use common::Completion;

static KERNEL: Kernel<StdPort> = Kernel::new(StdPort::new());

static IDLE: Thread<StdPort> = Thread::new("idle");
static mut IDLE_STACK: [u8; 256] = [0; 256];

static PRODUCER: Thread<StdPort> = Thread::new("producer");
static mut PRODUCER_STACK: [u8; 256] = [0; 256];
static CONSUMER: Thread<StdPort> = Thread::new("consumer");
static mut CONSUMER_STACK: [u8; 256] = [0; 256];

static CHANNEL: Channel<StdPort, f64> = Channel::new("reading");

static RECEIVED: Completion<f64> = Completion::new();

fn entry_consumer(_arg: usize) {
    // Nothing has been resumed yet when this call is reached, so this
    // genuinely blocks waiting for the producer's rendezvous.
    let value = KERNEL.channel_receive(&CHANNEL, Timeout::Infinite).expect("channel_receive failed");
    RECEIVED.signal(value);
}

fn entry_producer(_arg: usize) {
    KERNEL.channel_send(&CHANNEL, 25.0, Timeout::Infinite).expect("channel_send failed");
}

fn idle_entry(_arg: usize) {
    // Resuming the consumer first and waiting for `resume` to return (which
    // only happens once it blocks and yields back to idle) guarantees the
    // consumer is parked in `channel_receive` before the producer ever runs.
    KERNEL.resume(&CONSUMER);
    KERNEL.resume(&PRODUCER);
    loop {
        std::thread::park_timeout(Duration::from_millis(50));
    }
}

#[test]
fn channel_rendezvous() {
    common::init_logging();

    unsafe {
        KERNEL.spawn_thread(&CONSUMER, &mut CONSUMER_STACK, entry_consumer, 0, 60).unwrap();
        KERNEL.spawn_thread(&PRODUCER, &mut PRODUCER_STACK, entry_producer, 0, 50).unwrap();
    }

    let idle_stack: &'static mut [u8] = unsafe { &mut IDLE_STACK };
    common::boot(&KERNEL, &IDLE, idle_stack, idle_entry);

    let value = RECEIVED.wait_timeout(Duration::from_secs(2)).expect("consumer never received a value");
    assert_eq!(value, 25.0);
}
