//! The kernel's single error currency.
//!
//! Every public kernel operation returns a [`Status`] rather than a boxed or
//! enum-per-primitive error type: kernel code must not allocate, and a flat
//! `Copy` enum is cheap to thread through interrupt context. Contention
//! outcomes ([`Status::Timeout`], [`Status::QueueFull`], [`Status::QueueEmpty`])
//! are ordinary return values; lifecycle and parameter errors signal
//! programmer misuse.

use core::fmt;

/// The result of a kernel operation.
pub type Result<T = ()> = core::result::Result<T, Status>;

/// Status code returned by every kernel API function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Status {
    /// The operation completed successfully.
    Success,
    /// The calling thread's wait timed out before the condition was met.
    Timeout,
    /// The object the caller was blocked on was deleted.
    ObjectDeleted,
    /// A queue send found the queue at capacity and no receiver waiting.
    QueueFull,
    /// A queue receive found the queue empty and no sender waiting.
    QueueEmpty,
    /// A thread priority outside `1..=255` (or 0 for a non-idle thread) was
    /// requested.
    InvalidPriority,
    /// The supplied stack is smaller than the minimum a thread requires.
    StackTooSmall,
    /// A blocking call with a non-zero timeout was attempted from interrupt
    /// context.
    NotFromInterrupt,
    /// A mutex operation was attempted by a thread that is not the owner.
    NotOwner,
    /// `unlock` was called on a mutex that the caller does not hold.
    AlreadyUnlocked,
    /// A null handle or otherwise structurally invalid argument was passed.
    InvalidParameter,
    /// `timer_stop`/`set_delay` was called on a timer that is not running.
    TimerNotRunning,
    /// `timer_start` was called on a timer with no associated run-loop.
    TimerNoRunLoop,
    /// Caller-supplied storage was insufficient (reserved for future use by
    /// dynamically sized primitives).
    OutOfMemory,
    /// The call is not valid in the current state of the object (e.g.
    /// `perform` on a stopped run-loop queue that has overflowed).
    InvalidState,
}

impl Status {
    /// `true` for [`Status::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Turn `Success` into `Ok(())`, anything else into `Err(self)`.
    #[inline]
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Timeout => "timed out",
            Status::ObjectDeleted => "object deleted while waiting",
            Status::QueueFull => "queue full",
            Status::QueueEmpty => "queue empty",
            Status::InvalidPriority => "invalid priority",
            Status::StackTooSmall => "stack too small",
            Status::NotFromInterrupt => "not permitted from interrupt context",
            Status::NotOwner => "caller does not own the mutex",
            Status::AlreadyUnlocked => "mutex already unlocked",
            Status::InvalidParameter => "invalid parameter",
            Status::TimerNotRunning => "timer not running",
            Status::TimerNoRunLoop => "timer has no associated run-loop",
            Status::OutOfMemory => "out of memory",
            Status::InvalidState => "invalid state",
        };
        f.write_str(s)
    }
}
