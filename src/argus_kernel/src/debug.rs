//! Optional debug ambient stack: the rolling system-load percentage and the
//! global created-object registry, both config switches named but not
//! shaped by spec.md §6 ("enable system load computation", "enable
//! global-created registries") and specified here the way `ar_kernel.h`
//! shapes them.

#![allow(unused_imports)] // `Thread` etc. are only referenced under specific feature combinations.

use core::cell::Cell;
use core::marker::PhantomData;

use argus_core::{Named, Port};

use crate::channel::Channel;
use crate::mutex::Mutex;
use crate::queue::Queue;
use crate::runloop::RunLoop;
use crate::semaphore::Semaphore;
use crate::thread::Thread;
use crate::timer::Timer;
use crate::Kernel;

/// Ticks sampled per rolling load-percentage window (`system_load` feature).
pub const SYSTEM_LOAD_WINDOW_TICKS: u32 = 100;

#[cfg(feature = "system_load")]
pub(crate) struct LoadCounter {
    idle_ticks: Cell<u32>,
    window_ticks: Cell<u32>,
    percent: Cell<u8>,
}

#[cfg(feature = "system_load")]
impl LoadCounter {
    pub const fn new() -> Self {
        Self {
            idle_ticks: Cell::new(0),
            window_ticks: Cell::new(0),
            percent: Cell::new(0),
        }
    }

    /// Called once per tick from [`Kernel::tick_isr`] with the thread that
    /// was running through the tick just completed.
    pub fn observe_tick<P: Port>(&self, current: Option<&'static Thread<P>>, idle: Option<&'static Thread<P>>) {
        let was_idle = match (current, idle) {
            (Some(c), Some(i)) => core::ptr::eq(c, i),
            _ => true,
        };
        if was_idle {
            self.idle_ticks.set(self.idle_ticks.get() + 1);
        }
        let window = self.window_ticks.get() + 1;
        if window >= SYSTEM_LOAD_WINDOW_TICKS {
            let idle = self.idle_ticks.get();
            self.percent.set((100 - (idle.saturating_mul(100) / window)) as u8);
            self.idle_ticks.set(0);
            self.window_ticks.set(0);
        } else {
            self.window_ticks.set(window);
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent.get()
    }
}

impl<P: Port> Kernel<P> {
    /// The CPU-busy percentage over the last [`SYSTEM_LOAD_WINDOW_TICKS`]
    /// ticks, updated once per window by the tick handler (`system_load`
    /// feature).
    #[cfg(feature = "system_load")]
    pub fn system_load_percent(&self) -> u8 {
        self.load.percent()
    }
}

const REGISTRY_CAPACITY: usize = 32;

/// A fixed-capacity, type-erased list of every object of one kind ever
/// passed to a `register_*` call. Capped rather than fallible: this is a
/// debug aid, not a resource a real operation should fail over.
#[cfg(feature = "created_registry")]
pub(crate) struct RegistryList {
    slots: [Cell<Option<&'static dyn Named>>; REGISTRY_CAPACITY],
}

#[cfg(feature = "created_registry")]
impl RegistryList {
    pub const fn new() -> Self {
        const NONE: Cell<Option<&'static dyn Named>> = Cell::new(None);
        Self {
            slots: [NONE; REGISTRY_CAPACITY],
        }
    }

    pub(crate) fn register(&self, obj: &'static dyn Named) {
        for slot in &self.slots {
            if slot.get().is_none() {
                slot.set(Some(obj));
                return;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static dyn Named> + '_ {
        self.slots.iter().filter_map(|c| c.get())
    }
}

/// Registers an object the first time it is used, tracked by the `registered`
/// flag embedded on the object itself (there is no explicit "create" kernel
/// call for semaphores/mutexes/queues/channels/timers/run-loops, unlike
/// threads' [`crate::sched::spawn_thread`]).
#[cfg(feature = "created_registry")]
pub(crate) fn ensure_registered(list: &RegistryList, registered: &Cell<bool>, obj: &'static dyn Named) {
    if !registered.get() {
        registered.set(true);
        list.register(obj);
    }
}

#[cfg(feature = "created_registry")]
pub(crate) struct Registries<P: Port> {
    pub(crate) threads: RegistryList,
    pub(crate) semaphores: RegistryList,
    pub(crate) mutexes: RegistryList,
    pub(crate) queues: RegistryList,
    pub(crate) channels: RegistryList,
    pub(crate) timers: RegistryList,
    pub(crate) run_loops: RegistryList,
    _marker: PhantomData<P>,
}

#[cfg(feature = "created_registry")]
impl<P: Port> Registries<P> {
    pub const fn new() -> Self {
        Self {
            threads: RegistryList::new(),
            semaphores: RegistryList::new(),
            mutexes: RegistryList::new(),
            queues: RegistryList::new(),
            channels: RegistryList::new(),
            timers: RegistryList::new(),
            run_loops: RegistryList::new(),
            _marker: PhantomData,
        }
    }
}

/// Every thread ever spawned through [`Kernel::spawn_thread`]
/// (`created_registry` feature).
#[cfg(feature = "created_registry")]
pub fn threads<P: Port>(kernel: &'static Kernel<P>) -> impl Iterator<Item = &'static dyn Named> {
    kernel.registry.threads.iter()
}

/// Every semaphore ever used with [`Kernel::semaphore_get`]/
/// [`Kernel::semaphore_put`] (`created_registry` feature).
#[cfg(feature = "created_registry")]
pub fn semaphores<P: Port>(kernel: &'static Kernel<P>) -> impl Iterator<Item = &'static dyn Named> {
    kernel.registry.semaphores.iter()
}

/// Every mutex ever used with [`Kernel::mutex_lock`] (`created_registry`
/// feature).
#[cfg(feature = "created_registry")]
pub fn mutexes<P: Port>(kernel: &'static Kernel<P>) -> impl Iterator<Item = &'static dyn Named> {
    kernel.registry.mutexes.iter()
}

/// Every queue ever used with [`Kernel::queue_send`]/[`Kernel::queue_receive`]
/// (`created_registry` feature).
#[cfg(feature = "created_registry")]
pub fn queues<P: Port>(kernel: &'static Kernel<P>) -> impl Iterator<Item = &'static dyn Named> {
    kernel.registry.queues.iter()
}

/// Every channel ever used with [`Kernel::channel_send`]/
/// [`Kernel::channel_receive`] (`created_registry` feature).
#[cfg(feature = "created_registry")]
pub fn channels<P: Port>(kernel: &'static Kernel<P>) -> impl Iterator<Item = &'static dyn Named> {
    kernel.registry.channels.iter()
}

/// Every timer ever started with [`Kernel::timer_start`] (`created_registry`
/// feature).
#[cfg(feature = "created_registry")]
pub fn timers<P: Port>(kernel: &'static Kernel<P>) -> impl Iterator<Item = &'static dyn Named> {
    kernel.registry.timers.iter()
}

/// Every run-loop ever run with [`Kernel::run_loop_run`] (`created_registry`
/// feature).
#[cfg(feature = "created_registry")]
pub fn run_loops<P: Port>(kernel: &'static Kernel<P>) -> impl Iterator<Item = &'static dyn Named> {
    kernel.registry.run_loops.iter()
}
