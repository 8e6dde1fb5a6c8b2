//! Thread priorities.

use crate::error::Status;

/// A thread priority. `0` is reserved for the kernel's idle thread; user
/// threads occupy `1..=255`, with `255` the highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Priority(u8);

impl Priority {
    /// The idle thread's priority. No other thread may use it.
    pub const IDLE: Priority = Priority(0);
    /// The lowest priority a user thread may request.
    pub const MIN_USER: Priority = Priority(1);
    /// The highest priority a user thread may request.
    pub const MAX_USER: Priority = Priority(255);

    /// Validate and construct a user-thread priority.
    ///
    /// Rejects `0`, which is reserved for the idle thread.
    #[inline]
    pub const fn new_user(value: u8) -> Result<Self, Status> {
        if value == 0 {
            Err(Status::InvalidPriority)
        } else {
            Ok(Priority(value))
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<Priority> for u8 {
    #[inline]
    fn from(p: Priority) -> u8 {
        p.0
    }
}
