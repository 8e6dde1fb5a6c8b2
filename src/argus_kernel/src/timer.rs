//! One-shot and periodic timers (§4.6), always associated with exactly one
//! run-loop.

use core::cell::Cell;

use argus_core::{Named, Port, Result, Status, Ticks};

use crate::list::{Adapter, Link};
use crate::runloop::RunLoop;
use crate::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    Periodic,
}

/// A timer bound to a run-loop. Caller-owned, `'static` storage, built with
/// [`Timer::new`].
pub struct Timer<P: Port> {
    name: &'static str,
    callback: Cell<Option<fn(&'static Timer<P>, usize)>>,
    arg: Cell<usize>,
    mode: Cell<TimerMode>,
    delay_ticks: Cell<u32>,
    pub(crate) wakeup: Cell<Ticks>,
    active: Cell<bool>,
    run_loop: Cell<Option<&'static RunLoop<P>>>,
    pub(crate) link: Link<Timer<P>>,
    #[cfg(feature = "created_registry")]
    registered: Cell<bool>,
}

impl<P: Port> Timer<P> {
    pub const fn new(
        name: &'static str,
        callback: fn(&'static Timer<P>, usize),
        arg: usize,
        mode: TimerMode,
        delay_ticks: u32,
    ) -> Self {
        Self {
            name,
            callback: Cell::new(Some(callback)),
            arg: Cell::new(arg),
            mode: Cell::new(mode),
            delay_ticks: Cell::new(delay_ticks),
            wakeup: Cell::new(Ticks::ZERO),
            active: Cell::new(false),
            run_loop: Cell::new(None),
            link: Link::new(),
            #[cfg(feature = "created_registry")]
            registered: Cell::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn get_delay_ticks(&self) -> u32 {
        self.delay_ticks.get()
    }

    pub(crate) fn bind_run_loop(&self, run_loop: &'static RunLoop<P>) {
        self.run_loop.set(Some(run_loop));
    }
}

impl<P: Port> Named for Timer<P> {
    fn name(&self) -> &str {
        self.name
    }
}

unsafe impl<P: Port> Sync for Timer<P> {}

pub(crate) struct TimerListAdapter<P: Port>(core::marker::PhantomData<P>);
impl<P: Port> Adapter for TimerListAdapter<P> {
    type Node = Timer<P>;
    fn link(node: &Timer<P>) -> &Link<Timer<P>> {
        &node.link
    }
}

impl<P: Port> Kernel<P> {
    /// Start (or re-anchor) `timer` (§4.6 "start"). Must already be
    /// associated with a run-loop. Deferred if called from interrupt
    /// context.
    pub fn timer_start(&'static self, timer: &'static Timer<P>) -> Result<()> {
        #[cfg(feature = "created_registry")]
        crate::debug::ensure_registered(&self.registry.timers, &timer.registered, timer);
        if timer.delay_ticks.get() == 0 {
            return Err(Status::InvalidParameter);
        }
        if timer.run_loop.get().is_none() {
            return Err(Status::TimerNoRunLoop);
        }
        if self.in_interrupt() {
            if !self.post_deferred(crate::deferred::DeferredAction::TimerStart(timer)) {
                log::warn!("deferred queue full, dropped timer_start for {}", timer.name());
            }
            return Ok(());
        }
        let guard = self.lock();
        log::trace!("timer_start {} (delay={} ticks)", timer.name(), timer.delay_ticks.get());
        self.timer_start_locked(timer);
        self.dispatch_if_needed(guard);
        Ok(())
    }

    pub(crate) fn timer_start_locked(&'static self, timer: &'static Timer<P>) {
        let run_loop = match timer.run_loop.get() {
            Some(r) => r,
            None => return,
        };
        if timer.active.get() {
            run_loop.timers.remove(timer);
        }
        timer.active.set(true);
        let wakeup = self.tick.get().wrapping_add(timer.delay_ticks.get());
        timer.wakeup.set(wakeup);
        run_loop.timers.insert_sorted(timer, |t| t.wakeup.get(), false);
        self.wake_run_loop(run_loop);
    }

    /// Stop `timer`; a no-op returning `TimerNotRunning` if it was not
    /// active (§8 "Round-trip and idempotence laws").
    pub fn timer_stop(&'static self, timer: &'static Timer<P>) -> Result<()> {
        if self.in_interrupt() {
            if !self.post_deferred(crate::deferred::DeferredAction::TimerStop(timer)) {
                log::warn!("deferred queue full, dropped timer_stop for {}", timer.name());
            }
            return Ok(());
        }
        let guard = self.lock();
        if !timer.active.get() {
            drop(guard);
            return Err(Status::TimerNotRunning);
        }
        self.timer_stop_locked(timer);
        drop(guard);
        Ok(())
    }

    pub(crate) fn timer_stop_locked(&'static self, timer: &'static Timer<P>) {
        if !timer.active.get() {
            return;
        }
        if let Some(run_loop) = timer.run_loop.get() {
            run_loop.timers.remove(timer);
        }
        timer.active.set(false);
    }

    /// Update `timer`'s delay; re-anchors its wakeup if active (§4.6
    /// "set-delay").
    pub fn timer_set_delay(&'static self, timer: &'static Timer<P>, delay_ticks: u32) -> Result<()> {
        if delay_ticks == 0 {
            return Err(Status::InvalidParameter);
        }
        let guard = self.lock();
        timer.delay_ticks.set(delay_ticks);
        if timer.active.get() {
            if let Some(run_loop) = timer.run_loop.get() {
                run_loop.timers.remove(timer);
                let wakeup = self.tick.get().wrapping_add(delay_ticks);
                timer.wakeup.set(wakeup);
                run_loop.timers.insert_sorted(timer, |t| t.wakeup.get(), false);
                self.wake_run_loop(run_loop);
            }
        }
        drop(guard);
        Ok(())
    }

    pub fn timer_delete(&'static self, timer: &'static Timer<P>) {
        let guard = self.lock();
        self.timer_stop_locked(timer);
        drop(guard);
    }

    /// Walk every registered run-loop's expired timers and invoke their
    /// callbacks with the kernel lock released (§4.1 tick handler step 3,
    /// §4.6 "Expiry"). Manages its own lock/unlock cycle per timer rather
    /// than being handed the tick handler's guard, since that guard must
    /// actually be dropped (not just re-borrowed) for the callback to run
    /// unlocked.
    pub(crate) fn drain_timers(&'static self) {
        loop {
            let guard = self.lock();
            let now = self.tick.get();
            let expired = self
                .run_loops
                .iter()
                .find_map(|rl| rl.timers.front().filter(|t| t.wakeup.get().has_elapsed(now)).map(|t| (rl, t)));

            let (run_loop, timer) = match expired {
                Some(found) => found,
                None => {
                    drop(guard);
                    break;
                }
            };
            run_loop.timers.remove(timer);
            timer.active.set(false);
            drop(guard);

            log::trace!("timer {} expired, invoking callback", timer.name());
            if let Some(cb) = timer.callback.get() {
                cb(timer, timer.arg.get());
            }

            let guard = self.lock();
            if timer.mode.get() == TimerMode::Periodic && !timer.active.get() {
                let wakeup = self.tick.get().wrapping_add(timer.delay_ticks.get());
                timer.wakeup.set(wakeup);
                timer.active.set(true);
                run_loop.timers.insert_sorted(timer, |t| t.wakeup.get(), false);
            }
            drop(guard);
        }
    }

    /// Nudge a run-loop blocked in its own wait out early, e.g. because a
    /// timer with an earlier deadline than the one it was waiting for just
    /// started. Must only be called while the kernel lock is already held.
    pub(crate) fn wake_run_loop(&'static self, run_loop: &'static RunLoop<P>) {
        self.semaphore_put_locked(&run_loop.notify_sem);
    }

    /// Register `run_loop` in the kernel-wide list the tick handler scans
    /// for expired timers, if not already registered.
    pub(crate) fn register_run_loop(&'static self, run_loop: &'static RunLoop<P>) {
        if !run_loop.kernel_link.is_linked() {
            self.run_loops.push_back(run_loop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePort;
    use crate::thread::Thread;

    fn on_fire(_timer: &'static Timer<FakePort>, _arg: usize) {}

    fn leak_bound_timer(
        kernel: &'static Kernel<FakePort>,
        mode: TimerMode,
        delay_ticks: u32,
    ) -> &'static Timer<FakePort> {
        let owner: &'static Thread<FakePort> = Box::leak(Box::new(Thread::new("owner")));
        let run_loop: &'static RunLoop<FakePort> = Box::leak(Box::new(RunLoop::new("rl", owner)));
        let timer: &'static Timer<FakePort> = Box::leak(Box::new(Timer::new("t", on_fire, 0, mode, delay_ticks)));
        kernel.run_loop_add_timer(run_loop, timer);
        timer
    }

    // "timer.is_active <=> timer is on exactly one run-loop's timer list"
    // (§8 "Invariants"), observed indirectly through `is_active` since the
    // run-loop's timer list is private.
    #[test]
    fn start_then_stop_round_trips_is_active() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let timer = leak_bound_timer(kernel, TimerMode::OneShot, 10);

        assert!(!timer.is_active());
        kernel.timer_start(timer).unwrap();
        assert!(timer.is_active());
        kernel.timer_stop(timer).unwrap();
        assert!(!timer.is_active());
    }

    // `timer_stop` on an already-stopped timer returns `TimerNotRunning`
    // rather than silently succeeding (§8 "Round-trip and idempotence laws").
    #[test]
    fn stop_on_an_inactive_timer_is_rejected() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let timer = leak_bound_timer(kernel, TimerMode::OneShot, 10);
        assert_eq!(kernel.timer_stop(timer), Err(Status::TimerNotRunning));
    }

    // `timer_start` on an already-running timer re-anchors its wakeup rather
    // than erroring (§8 "Round-trip and idempotence laws").
    #[test]
    fn start_on_a_running_timer_re_anchors_wakeup() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let timer = leak_bound_timer(kernel, TimerMode::Periodic, 10);

        kernel.timer_start(timer).unwrap();
        let first_wakeup = timer.wakeup.get();
        kernel.tick.set(kernel.tick.get().wrapping_add(5));
        kernel.timer_start(timer).unwrap();
        assert!(timer.is_active());
        assert_ne!(timer.wakeup.get(), first_wakeup);
    }

    // A zero delay is rejected at `timer_start` rather than ever being
    // scheduled (§8 "Boundary behavior": `delay=0` creation is invalid; a
    // `const fn` constructor cannot itself return a `Result`, so this crate
    // enforces the rule at `start` instead, the first point a `Result` can
    // flow back to the caller).
    #[test]
    fn zero_delay_is_rejected_at_start() {
        let kernel: &'static Kernel<FakePort> = Box::leak(Box::new(Kernel::new(FakePort)));
        let timer = leak_bound_timer(kernel, TimerMode::OneShot, 0);
        assert_eq!(kernel.timer_start(timer), Err(Status::InvalidParameter));
        assert!(!timer.is_active());
    }
}
