//! Rendezvous channel (§4.5): no buffer, sender and receiver hand a value
//! directly to each other.

use core::cell::Cell;

use argus_core::{Named, Port, Result, Status, Timeout};

use crate::list::IntrusiveList;
use crate::runloop::RunLoop;
use crate::wait::FifoWaitAdapter;
use crate::Kernel;

/// A rendezvous channel carrying values of type `T`. Caller-owned, `'static`
/// storage, built with [`Channel::new`].
pub struct Channel<P: Port, T: Copy> {
    name: &'static str,
    send_waiters: IntrusiveList<FifoWaitAdapter<P>>,
    recv_waiters: IntrusiveList<FifoWaitAdapter<P>>,
    run_loop: Cell<Option<&'static RunLoop<P>>>,
    _marker: core::marker::PhantomData<T>,
    #[cfg(feature = "created_registry")]
    registered: Cell<bool>,
}

impl<P: Port, T: Copy> Channel<P, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            send_waiters: IntrusiveList::new(),
            recv_waiters: IntrusiveList::new(),
            run_loop: Cell::new(None),
            _marker: core::marker::PhantomData,
            #[cfg(feature = "created_registry")]
            registered: Cell::new(false),
        }
    }

    /// Whether a sender is presently parked waiting for a receiver, i.e.
    /// whether a run-loop bound to this channel's receive side has
    /// something to service (see [`Kernel::run_loop_add_channel`]).
    pub(crate) fn has_pending_sender(&self) -> bool {
        !self.send_waiters.is_empty()
    }

    /// Bind a run-loop to this channel; see [`Kernel::run_loop_add_channel`].
    pub(crate) fn bind_run_loop(&self, run_loop: &'static RunLoop<P>) {
        self.run_loop.set(Some(run_loop));
    }
}

impl<P: Port, T: Copy> Named for Channel<P, T> {
    fn name(&self) -> &str {
        self.name
    }
}

unsafe impl<P: Port, T: Copy + Send> Sync for Channel<P, T> {}

impl<P: Port> Kernel<P> {
    /// Send `value` over `channel`, blocking until a receiver rendezvous or
    /// `timeout` elapses (§4.5).
    pub fn channel_send<T: Copy>(
        &'static self,
        channel: &'static Channel<P, T>,
        value: T,
        timeout: Timeout,
    ) -> Result<()> {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.channels, &channel.registered, channel);
        let guard = self.lock();

        if let Some(receiver) = channel.recv_waiters.pop_front() {
            let dest = receiver.scratch.get() as *mut T;
            unsafe { dest.write(value) };
            self.finish_wake(receiver, Status::Success);
            self.dispatch_if_needed(guard);
            return Ok(());
        }

        if timeout.is_no_wait() {
            drop(guard);
            return Err(Status::Timeout);
        }
        if self.in_interrupt() {
            drop(guard);
            return Err(Status::NotFromInterrupt);
        }

        let me = self.current_thread().expect("channel_send from non-thread context");
        me.scratch.set(&value as *const T as usize);
        if let Some(run_loop) = channel.run_loop.get() {
            self.semaphore_put_locked(&run_loop.notify_sem);
        }
        let status = self.block_current(guard, &channel.send_waiters, timeout, false);
        status.into_result()
    }

    /// Receive a value from `channel`, blocking until a sender rendezvous or
    /// `timeout` elapses (§4.5).
    pub fn channel_receive<T: Copy>(
        &'static self,
        channel: &'static Channel<P, T>,
        timeout: Timeout,
    ) -> Result<T> {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.channels, &channel.registered, channel);
        let guard = self.lock();

        if let Some(sender) = channel.send_waiters.pop_front() {
            let src = sender.scratch.get() as *const T;
            let value = unsafe { src.read() };
            self.finish_wake(sender, Status::Success);
            self.dispatch_if_needed(guard);
            return Ok(value);
        }

        if timeout.is_no_wait() {
            drop(guard);
            return Err(Status::Timeout);
        }
        if self.in_interrupt() {
            drop(guard);
            return Err(Status::NotFromInterrupt);
        }

        let mut slot = core::mem::MaybeUninit::<T>::uninit();
        let me = self.current_thread().expect("channel_receive from non-thread context");
        me.scratch.set(slot.as_mut_ptr() as usize);
        let status = self.block_current(guard, &channel.recv_waiters, timeout, false);
        match status {
            Status::Success => Ok(unsafe { slot.assume_init() }),
            other => Err(other),
        }
    }

    pub fn channel_delete<T: Copy>(&'static self, channel: &'static Channel<P, T>) {
        let guard = self.lock();
        self.wake_all(&channel.send_waiters, Status::ObjectDeleted);
        self.wake_all(&channel.recv_waiters, Status::ObjectDeleted);
        self.dispatch_if_needed(guard);
    }
}
