//! The run-gate: a single-slot signal an OS thread parks on between
//! dispatches, standing in for the saved-context/exception-return machinery
//! a real `Port` implementation gets from the CPU.

use std::sync::{Condvar, Mutex};

pub(crate) struct Gate {
    pulsed: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            pulsed: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Wake whoever is parked on this gate. Idempotent: pulsing an
    /// already-pulsed, not-yet-consumed gate is a no-op.
    pub(crate) fn signal(&self) {
        let mut pulsed = self.pulsed.lock().expect("gate mutex poisoned");
        *pulsed = true;
        self.cond.notify_one();
    }

    /// Block the calling OS thread until [`Gate::signal`] is called, then
    /// consume the pulse so the next wait blocks again.
    pub(crate) fn wait(&self) {
        let mut pulsed = self.pulsed.lock().expect("gate mutex poisoned");
        while !*pulsed {
            pulsed = self.cond.wait(pulsed).expect("gate mutex poisoned");
        }
        *pulsed = false;
    }
}
