//! The run-loop: a cooperative event pump owned by exactly one thread,
//! unifying timers, queues, channels, and posted work (§4.7).

use core::cell::Cell;

use argus_core::{Named, Port, Result, Status, Ticks, Timeout};

use crate::channel::Channel;
use crate::list::{Adapter, IntrusiveList, Link};
use crate::queue::Queue;
use crate::semaphore::Semaphore;
use crate::thread::Thread;
use crate::timer::{Timer, TimerListAdapter};
use crate::Kernel;

/// Outcome of [`Kernel::run_loop_run`] (§4.7 "run").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLoopStatus {
    /// `stop` was called.
    Stopped,
    /// The overall `run` timeout elapsed with nothing to service.
    TimedOut,
    /// Called from a thread that does not own this run-loop.
    Error,
}

const PERFORM_QUEUE_CAPACITY: usize = 8;
const MAX_QUEUE_BINDINGS: usize = 4;
const MAX_CHANNEL_BINDINGS: usize = 4;

/// A queue or channel bound to a run-loop, type-erased so a run-loop's
/// binding lists can hold entries for queues/channels of different element
/// types (§3 "associated queues"/"associated channels").
trait RunLoopSource {
    fn has_data(&self) -> bool;
    fn invoke(&self);
}

/// Binds `queue` to a run-loop: the run-loop invokes `callback(queue, arg)`
/// whenever `queue` has a live element, expecting the callback to call
/// [`Kernel::queue_receive`] (§4.7 "add-queue").
pub struct QueueBinding<P: Port, T: Copy + 'static, const CAP: usize> {
    queue: &'static Queue<P, T, CAP>,
    callback: fn(&'static Queue<P, T, CAP>, usize),
    arg: usize,
}

impl<P: Port, T: Copy + 'static, const CAP: usize> QueueBinding<P, T, CAP> {
    pub const fn new(queue: &'static Queue<P, T, CAP>, callback: fn(&'static Queue<P, T, CAP>, usize), arg: usize) -> Self {
        Self { queue, callback, arg }
    }
}

impl<P: Port, T: Copy + 'static, const CAP: usize> RunLoopSource for QueueBinding<P, T, CAP> {
    fn has_data(&self) -> bool {
        !self.queue.is_empty()
    }
    fn invoke(&self) {
        (self.callback)(self.queue, self.arg);
    }
}

/// Binds `channel` to a run-loop the same way [`QueueBinding`] does for a
/// queue (§4.7 "add-channel").
pub struct ChannelBinding<P: Port, T: Copy + 'static> {
    channel: &'static Channel<P, T>,
    callback: fn(&'static Channel<P, T>, usize),
    arg: usize,
}

impl<P: Port, T: Copy + 'static> ChannelBinding<P, T> {
    pub const fn new(channel: &'static Channel<P, T>, callback: fn(&'static Channel<P, T>, usize), arg: usize) -> Self {
        Self { channel, callback, arg }
    }
}

impl<P: Port, T: Copy + 'static> RunLoopSource for ChannelBinding<P, T> {
    fn has_data(&self) -> bool {
        self.channel.has_pending_sender()
    }
    fn invoke(&self) {
        (self.callback)(self.channel, self.arg);
    }
}

/// A run-loop. Caller-owned, `'static` storage, built with [`RunLoop::new`].
pub struct RunLoop<P: Port> {
    name: &'static str,
    owning_thread: &'static Thread<P>,
    pub(crate) timers: IntrusiveList<TimerListAdapter<P>>,
    queue_bindings: [Cell<Option<&'static dyn RunLoopSource>>; MAX_QUEUE_BINDINGS],
    channel_bindings: [Cell<Option<&'static dyn RunLoopSource>>; MAX_CHANNEL_BINDINGS],
    perform_queue: [Cell<Option<(fn(usize), usize)>>; PERFORM_QUEUE_CAPACITY],
    perform_head: Cell<usize>,
    perform_count: Cell<usize>,
    running: Cell<bool>,
    stop_requested: Cell<bool>,
    pub(crate) notify_sem: Semaphore<P>,
    pub(crate) kernel_link: Link<RunLoop<P>>,
    #[cfg(feature = "created_registry")]
    registered: Cell<bool>,
}

impl<P: Port> RunLoop<P> {
    pub const fn new(name: &'static str, owning_thread: &'static Thread<P>) -> Self {
        const NONE: Cell<Option<&'static dyn RunLoopSource>> = Cell::new(None);
        const NONE_PERFORM: Cell<Option<(fn(usize), usize)>> = Cell::new(None);
        Self {
            name,
            owning_thread,
            timers: IntrusiveList::new(),
            queue_bindings: [NONE; MAX_QUEUE_BINDINGS],
            channel_bindings: [NONE; MAX_CHANNEL_BINDINGS],
            perform_queue: [NONE_PERFORM; PERFORM_QUEUE_CAPACITY],
            perform_head: Cell::new(0),
            perform_count: Cell::new(0),
            running: Cell::new(false),
            stop_requested: Cell::new(false),
            notify_sem: Semaphore::new(name, 0),
            kernel_link: Link::new(),
            #[cfg(feature = "created_registry")]
            registered: Cell::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    fn push_perform(&self, f: fn(usize), arg: usize) -> bool {
        if self.perform_count.get() == PERFORM_QUEUE_CAPACITY {
            return false;
        }
        let tail = (self.perform_head.get() + self.perform_count.get()) % PERFORM_QUEUE_CAPACITY;
        self.perform_queue[tail].set(Some((f, arg)));
        self.perform_count.set(self.perform_count.get() + 1);
        true
    }

    fn pop_perform(&self) -> Option<(fn(usize), usize)> {
        if self.perform_count.get() == 0 {
            return None;
        }
        let head = self.perform_head.get();
        let entry = self.perform_queue[head].take();
        self.perform_head.set((head + 1) % PERFORM_QUEUE_CAPACITY);
        self.perform_count.set(self.perform_count.get() - 1);
        entry
    }

    fn push_binding(slots: &[Cell<Option<&'static dyn RunLoopSource>>], binding: &'static dyn RunLoopSource) -> Result<()> {
        for slot in slots {
            if slot.get().is_none() {
                slot.set(Some(binding));
                return Ok(());
            }
        }
        Err(Status::OutOfMemory)
    }
}

impl<P: Port> Named for RunLoop<P> {
    fn name(&self) -> &str {
        self.name
    }
}

pub(crate) struct RunLoopListAdapter<P: Port>(core::marker::PhantomData<P>);
impl<P: Port> Adapter for RunLoopListAdapter<P> {
    type Node = RunLoop<P>;
    fn link(node: &RunLoop<P>) -> &Link<RunLoop<P>> {
        &node.kernel_link
    }
}

unsafe impl<P: Port> Sync for RunLoop<P> {}

impl<P: Port> Kernel<P> {
    /// Run `run_loop`'s event pump until `stop` is called or `timeout`
    /// elapses with nothing to service (§4.7 "run").
    pub fn run_loop_run(&'static self, run_loop: &'static RunLoop<P>, timeout: Timeout) -> RunLoopStatus {
        let me = match self.current_thread() {
            Some(t) if core::ptr::eq(t, run_loop.owning_thread) => t,
            _ => return RunLoopStatus::Error,
        };

        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.run_loops, &run_loop.registered, run_loop);
        self.register_run_loop(run_loop);
        run_loop.running.set(true);
        run_loop.stop_requested.set(false);
        me.run_loop.set(Some(run_loop));

        let overall_deadline = match timeout {
            Timeout::Millis(ms) => {
                Some(self.tick.get().wrapping_add(argus_core::ms_to_ticks(ms, self.ms_per_tick.get())))
            }
            _ => None,
        };

        let status = loop {
            if run_loop.stop_requested.get() {
                break RunLoopStatus::Stopped;
            }

            while let Some((f, arg)) = run_loop.pop_perform() {
                f(arg);
            }

            let mut serviced = false;
            for binding in run_loop.queue_bindings.iter().chain(run_loop.channel_bindings.iter()) {
                if let Some(source) = binding.get() {
                    if source.has_data() {
                        source.invoke();
                        serviced = true;
                    }
                }
            }
            if serviced {
                continue;
            }
            if run_loop.stop_requested.get() {
                break RunLoopStatus::Stopped;
            }

            let wait_timeout = self.compute_wait_timeout(run_loop, overall_deadline, timeout);
            match self.semaphore_get(&run_loop.notify_sem, wait_timeout) {
                Ok(()) => continue,
                Err(Status::Timeout) => {
                    let now = self.tick.get();
                    if let Some(deadline) = overall_deadline {
                        if deadline.has_elapsed(now) {
                            break RunLoopStatus::TimedOut;
                        }
                    }
                    // A wait shorter than the overall deadline expired
                    // because a timer deadline was nearer; loop back to
                    // step 1 so the tick handler's timer callback (already
                    // invoked by now) and any resulting state get seen.
                    continue;
                }
                Err(_) => break RunLoopStatus::Stopped,
            }
        };

        run_loop.running.set(false);
        me.run_loop.set(None);
        status
    }

    fn compute_wait_timeout(&self, run_loop: &RunLoop<P>, overall_deadline: Option<Ticks>, overall_timeout: Timeout) -> Timeout {
        let now = self.tick.get();
        let mut deadline = overall_deadline;
        if let Some(next_timer) = run_loop.timers.front() {
            let timer_deadline = next_timer.wakeup.get();
            deadline = Some(match deadline {
                Some(d) if d.has_elapsed(timer_deadline) => d,
                Some(_) => timer_deadline,
                None => timer_deadline,
            });
        }
        match deadline {
            Some(d) => {
                let remaining_ticks = d.0.wrapping_sub(now.0);
                if d.has_elapsed(now) {
                    Timeout::NoWait
                } else {
                    Timeout::Millis(argus_core::ticks_to_ms(remaining_ticks, self.ms_per_tick.get()).max(1))
                }
            }
            None => overall_timeout,
        }
    }

    /// Request `run_loop` stop; idempotent, wakes it if blocked (§4.7
    /// "stop").
    pub fn run_loop_stop(&'static self, run_loop: &'static RunLoop<P>) {
        let guard = self.lock();
        run_loop.stop_requested.set(true);
        self.semaphore_put_locked(&run_loop.notify_sem);
        self.dispatch_if_needed(guard);
    }

    /// Post `(f, arg)` to `run_loop`'s perform queue; overflow is reported,
    /// never silently dropped (§4.7 "perform", §9). Safe from any thread or
    /// interrupt context.
    pub fn run_loop_perform(&'static self, run_loop: &'static RunLoop<P>, f: fn(usize), arg: usize) -> Result<()> {
        let guard = self.lock();
        if !run_loop.push_perform(f, arg) {
            drop(guard);
            return Err(Status::OutOfMemory);
        }
        self.semaphore_put_locked(&run_loop.notify_sem);
        self.dispatch_if_needed(guard);
        Ok(())
    }

    /// Bind `timer` to `run_loop` (§4.7 "add-timer").
    pub fn run_loop_add_timer(&'static self, run_loop: &'static RunLoop<P>, timer: &'static Timer<P>) {
        timer.bind_run_loop(run_loop);
    }

    /// Bind a queue to `run_loop` via `binding` (§4.7 "add-queue").
    pub fn run_loop_add_queue<T: Copy + 'static, const CAP: usize>(
        &'static self,
        run_loop: &'static RunLoop<P>,
        binding: &'static QueueBinding<P, T, CAP>,
    ) -> Result<()> {
        RunLoop::<P>::push_binding(&run_loop.queue_bindings, binding)?;
        binding.queue.bind_run_loop(run_loop);
        Ok(())
    }

    /// Bind a channel to `run_loop` via `binding` (§4.7 "add-channel").
    pub fn run_loop_add_channel<T: Copy + 'static>(
        &'static self,
        run_loop: &'static RunLoop<P>,
        binding: &'static ChannelBinding<P, T>,
    ) -> Result<()> {
        RunLoop::<P>::push_binding(&run_loop.channel_bindings, binding)?;
        binding.channel.bind_run_loop(run_loop);
        Ok(())
    }

    /// The run-loop currently executing on the calling thread, if any
    /// (§4.7 "get-current").
    pub fn run_loop_current(&self) -> Option<&'static RunLoop<P>> {
        self.current_thread().and_then(|t| t.current_run_loop())
    }

    /// Delete `run_loop`: detach every bound timer/queue/channel, unlink it
    /// from kernel tracking, and wake its owner if currently parked in `run`
    /// (§4.7 "delete").
    pub fn run_loop_delete(&'static self, run_loop: &'static RunLoop<P>) {
        let guard = self.lock();
        while let Some(timer) = run_loop.timers.front() {
            self.timer_stop_locked(timer);
        }
        for slot in run_loop.queue_bindings.iter().chain(run_loop.channel_bindings.iter()) {
            slot.set(None);
        }
        if run_loop.kernel_link.is_linked() {
            self.run_loops.remove(run_loop);
        }
        run_loop.stop_requested.set(true);
        self.semaphore_put_locked(&run_loop.notify_sem);
        self.dispatch_if_needed(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePort;
    use crate::timer::TimerMode;

    fn on_fire(_timer: &'static Timer<FakePort>, _arg: usize) {}

    // `run_loop_delete` unlinks the run-loop from the kernel's own tracking
    // list and drops its bound timer, so a subsequently-registered run-loop
    // cannot be confused with a deleted one (§4.7 "delete").
    #[test]
    fn run_loop_delete_unlinks_from_kernel_tracking_and_drops_timers() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let owner: &'static Thread<FakePort> = Box::leak(Box::new(Thread::new("owner")));
        let run_loop: &'static RunLoop<FakePort> = Box::leak(Box::new(RunLoop::new("rl", owner)));
        let timer: &'static Timer<FakePort> = Box::leak(Box::new(Timer::new("t", on_fire, 0, TimerMode::OneShot, 10)));

        kernel.run_loop_add_timer(run_loop, timer);
        kernel.timer_start(timer).unwrap();
        kernel.register_run_loop(run_loop);
        assert!(run_loop.kernel_link.is_linked());
        assert!(timer.is_active());

        kernel.run_loop_delete(run_loop);

        assert!(!run_loop.kernel_link.is_linked());
        assert!(run_loop.timers.is_empty());
        assert!(!timer.is_active());
    }
}
