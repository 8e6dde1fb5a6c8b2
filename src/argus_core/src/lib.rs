//! Portable API surface of the Argus RTOS kernel.
//!
//! This crate defines everything an application or a `Port` implementation
//! needs to agree on with `argus_kernel` without depending on the kernel's
//! internal data structures: status codes, time units, thread priorities,
//! the [`Named`] accessor shared by every primitive, and the [`Port`] trait
//! that abstracts the CPU/board.
#![cfg_attr(not(test), no_std)]

mod error;
mod named;
mod priority;
pub mod port;
mod time;

pub use error::{Result, Status};
pub use named::Named;
pub use priority::Priority;
pub use port::{IrqState, Port};
pub use time::{ms_to_ticks, ticks_to_ms, Ticks, Timeout, DEFAULT_MS_PER_TICK};
