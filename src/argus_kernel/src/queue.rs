//! Bounded FIFO queue (§4.4).
//!
//! The original kernel's `storage`/`element_size`/`capacity` triple (a raw
//! byte buffer the caller sizes by hand) is re-expressed with a const
//! generic: `Queue<P, T, CAP>` owns `[T; CAP]` inline, and `T: Copy` stands
//! in for "byte-copied element" since Rust has no portable "copy N raw
//! bytes" operation that is also type-safe at the call site.

use core::cell::{Cell, UnsafeCell};
use core::mem::MaybeUninit;

use argus_core::{Named, Port, Result, Status, Timeout};

use crate::list::IntrusiveList;
use crate::runloop::RunLoop;
use crate::wait::FifoWaitAdapter;
use crate::Kernel;

/// A bounded FIFO queue of up to `CAP` copies of `T`. Caller-owned, `'static`
/// storage, built with [`Queue::new`].
pub struct Queue<P: Port, T: Copy, const CAP: usize> {
    name: &'static str,
    storage: UnsafeCell<[MaybeUninit<T>; CAP]>,
    head: Cell<usize>,
    tail: Cell<usize>,
    count: Cell<usize>,
    send_waiters: IntrusiveList<FifoWaitAdapter<P>>,
    recv_waiters: IntrusiveList<FifoWaitAdapter<P>>,
    run_loop: Cell<Option<&'static RunLoop<P>>>,
    #[cfg(feature = "created_registry")]
    registered: Cell<bool>,
}

impl<P: Port, T: Copy, const CAP: usize> Queue<P, T, CAP> {
    pub const fn new(name: &'static str) -> Self {
        assert!(CAP > 0, "queue capacity must be non-zero");
        Self {
            name,
            storage: UnsafeCell::new([MaybeUninit::uninit(); CAP]),
            head: Cell::new(0),
            tail: Cell::new(0),
            count: Cell::new(0),
            send_waiters: IntrusiveList::new(),
            recv_waiters: IntrusiveList::new(),
            run_loop: Cell::new(None),
            #[cfg(feature = "created_registry")]
            registered: Cell::new(false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count.get() == 0
    }

    pub fn get_count(&self) -> usize {
        self.count.get()
    }

    fn push_storage(&self, value: T) {
        let tail = self.tail.get();
        unsafe {
            (*self.storage.get())[tail] = MaybeUninit::new(value);
        }
        self.tail.set((tail + 1) % CAP);
        self.count.set(self.count.get() + 1);
    }

    fn pop_storage(&self) -> T {
        let head = self.head.get();
        let value = unsafe { (*self.storage.get())[head].assume_init() };
        self.head.set((head + 1) % CAP);
        self.count.set(self.count.get() - 1);
        value
    }

    /// Bind a run-loop to this queue; see [`Kernel::run_loop_add_queue`].
    pub(crate) fn bind_run_loop(&self, run_loop: &'static RunLoop<P>) {
        self.run_loop.set(Some(run_loop));
    }
}

impl<P: Port, T: Copy, const CAP: usize> Named for Queue<P, T, CAP> {
    fn name(&self) -> &str {
        self.name
    }
}

unsafe impl<P: Port, T: Copy + Send, const CAP: usize> Sync for Queue<P, T, CAP> {}

impl<P: Port> Kernel<P> {
    /// Send `value` into `queue` (§4.4 "send"): hands off directly to a
    /// blocked receiver if one exists (FIFO fairness bypass), else buffers
    /// it, else blocks up to `timeout`.
    pub fn queue_send<T: Copy, const CAP: usize>(
        &'static self,
        queue: &'static Queue<P, T, CAP>,
        value: T,
        timeout: Timeout,
    ) -> Result<()> {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.queues, &queue.registered, queue);
        let guard = self.lock();

        if let Some(receiver) = queue.recv_waiters.pop_front() {
            let dest = receiver.scratch.get() as *mut T;
            unsafe { dest.write(value) };
            self.finish_wake(receiver, Status::Success);
            self.dispatch_if_needed(guard);
            return Ok(());
        }

        if queue.count.get() < CAP {
            queue.push_storage(value);
            if let Some(run_loop) = queue.run_loop.get() {
                self.semaphore_put_locked(&run_loop.notify_sem);
            }
            drop(guard);
            return Ok(());
        }

        if timeout.is_no_wait() {
            drop(guard);
            return Err(Status::QueueFull);
        }
        if self.in_interrupt() {
            drop(guard);
            return Err(Status::NotFromInterrupt);
        }

        let me = self.current_thread().expect("queue_send from non-thread context");
        me.scratch.set(&value as *const T as usize);
        let status = self.block_current(guard, &queue.send_waiters, timeout, false);
        status.into_result()
    }

    /// Receive a value from `queue` (§4.4 "receive"): takes the head of the
    /// ring if non-empty (and slides a blocked sender's pending value in
    /// behind it), else blocks up to `timeout`.
    pub fn queue_receive<T: Copy, const CAP: usize>(
        &'static self,
        queue: &'static Queue<P, T, CAP>,
        timeout: Timeout,
    ) -> Result<T> {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.queues, &queue.registered, queue);
        let guard = self.lock();

        if queue.count.get() > 0 {
            let value = queue.pop_storage();
            if let Some(sender) = queue.send_waiters.pop_front() {
                let src = sender.scratch.get() as *const T;
                queue.push_storage(unsafe { src.read() });
                self.finish_wake(sender, Status::Success);
            }
            self.dispatch_if_needed(guard);
            return Ok(value);
        }

        if timeout.is_no_wait() {
            drop(guard);
            return Err(Status::QueueEmpty);
        }
        if self.in_interrupt() {
            drop(guard);
            return Err(Status::NotFromInterrupt);
        }

        let mut slot: MaybeUninit<T> = MaybeUninit::uninit();
        let me = self.current_thread().expect("queue_receive from non-thread context");
        me.scratch.set(slot.as_mut_ptr() as usize);
        let status = self.block_current(guard, &queue.recv_waiters, timeout, false);
        match status {
            Status::Success => Ok(unsafe { slot.assume_init() }),
            other => Err(other),
        }
    }

    pub fn queue_delete<T: Copy, const CAP: usize>(&'static self, queue: &'static Queue<P, T, CAP>) {
        let guard = self.lock();
        self.wake_all(&queue.send_waiters, Status::ObjectDeleted);
        self.wake_all(&queue.recv_waiters, Status::ObjectDeleted);
        self.dispatch_if_needed(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePort;
    use quickcheck_macros::quickcheck;

    const CAP: usize = 8;

    // send-then-receive order preservation for k <= capacity elements (§8
    // "Round-trip and idempotence laws"). `Timeout::NoWait` keeps every call
    // on the non-blocking path, which never needs a current thread.
    #[quickcheck]
    fn send_then_receive_preserves_order(items: Vec<u8>) -> bool {
        let items: Vec<u8> = items.into_iter().take(CAP).collect();
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let queue: &'static Queue<FakePort, u8, CAP> = Box::leak(Box::new(Queue::new("q")));

        for &item in &items {
            if kernel.queue_send(queue, item, Timeout::NoWait).is_err() {
                return false;
            }
        }
        let mut received = Vec::with_capacity(items.len());
        for _ in 0..items.len() {
            match kernel.queue_receive(queue, Timeout::NoWait) {
                Ok(v) => received.push(v),
                Err(_) => return false,
            }
        }
        received == items
    }

    // live_count in [0, capacity] under arbitrary interleavings that never
    // block (§8 "Invariants").
    #[quickcheck]
    fn live_count_never_exceeds_capacity(sends: u8, receives: u8) -> bool {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let queue: &'static Queue<FakePort, u8, CAP> = Box::leak(Box::new(Queue::new("q")));

        for i in 0..sends {
            let _ = kernel.queue_send(queue, i, Timeout::NoWait);
            if queue.get_count() > CAP {
                return false;
            }
        }
        for _ in 0..receives {
            let _ = kernel.queue_receive(queue, Timeout::NoWait);
        }
        queue.get_count() <= CAP
    }

    #[test]
    fn send_on_full_queue_with_no_wait_is_rejected_without_loss() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let queue: &'static Queue<FakePort, u8, CAP> = Box::leak(Box::new(Queue::new("q")));

        for i in 0..CAP as u8 {
            kernel.queue_send(queue, i, Timeout::NoWait).unwrap();
        }
        assert_eq!(kernel.queue_send(queue, 255, Timeout::NoWait), Err(Status::QueueFull));
        assert_eq!(queue.get_count(), CAP);
    }

    #[test]
    fn receive_on_empty_queue_with_no_wait_is_rejected() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let queue: &'static Queue<FakePort, u8, CAP> = Box::leak(Box::new(Queue::new("q")));
        assert_eq!(kernel.queue_receive(queue, Timeout::NoWait), Err(Status::QueueEmpty));
    }
}
