//! Time units.
//!
//! All user-visible times are in milliseconds; the kernel converts to ticks
//! via `ms / ms_per_tick`. The tick counter is a wrapping 32-bit unsigned
//! integer; comparisons between a deadline and `now` must go through
//! [`Ticks::has_elapsed`] rather than `<`/`>` so that wraparound is handled
//! correctly.

use core::fmt;

/// A timeout, in milliseconds, passed to a blocking call.
///
/// The two sentinel values match the original kernel's `kArNoTimeout` (0) and
/// `kArInfiniteTimeout` (`0xFFFFFFFF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately if the resource is not available.
    NoWait,
    /// Wait up to the given number of milliseconds.
    Millis(u32),
    /// Wait forever.
    Infinite,
}

impl Timeout {
    /// The raw sentinel used for an infinite timeout, kept for API
    /// compatibility with callers that pass a raw `u32`.
    pub const INFINITE_MS: u32 = 0xFFFF_FFFF;

    /// Build a `Timeout` from the raw millisecond encoding used at the flat
    /// C-style API boundary (0 = no-wait, `INFINITE_MS` = infinite).
    #[inline]
    pub const fn from_millis_raw(ms: u32) -> Self {
        match ms {
            0 => Timeout::NoWait,
            Self::INFINITE_MS => Timeout::Infinite,
            ms => Timeout::Millis(ms),
        }
    }

    /// `true` for [`Timeout::NoWait`].
    #[inline]
    pub const fn is_no_wait(self) -> bool {
        matches!(self, Timeout::NoWait)
    }

    /// `true` for [`Timeout::Infinite`].
    #[inline]
    pub const fn is_infinite(self) -> bool {
        matches!(self, Timeout::Infinite)
    }
}

impl From<u32> for Timeout {
    #[inline]
    fn from(ms: u32) -> Self {
        Self::from_millis_raw(ms)
    }
}

/// A point in time or a duration, measured in ticks of the periodic timer.
///
/// Wraps at `u32::MAX`; deadlines must be compared with [`Ticks::has_elapsed`]
/// rather than a plain `<=`, exactly as spec'd ("tick count ... wraps with
/// well-defined unsigned arithmetic used only via `(deadline - now)`
/// comparisons").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Ticks(pub u32);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    #[inline]
    pub const fn wrapping_add(self, rhs: u32) -> Self {
        Ticks(self.0.wrapping_add(rhs))
    }

    /// `true` if `self` (interpreted as a deadline) is at or before `now`,
    /// tolerating one wraparound of the tick counter.
    #[inline]
    pub const fn has_elapsed(self, now: Ticks) -> bool {
        (now.0.wrapping_sub(self.0) as i32) >= 0
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

/// Compile-time tick quantum, in milliseconds. Overridable by the port via
/// the `ARGUS_MS_PER_TICK` environment variable at build time would require a
/// build script; instead this is a plain `const` a port crate can shadow by
/// feeding its own value into [`ms_to_ticks`]/[`ticks_to_ms`] if it runs at a
/// different quantum than the default.
pub const DEFAULT_MS_PER_TICK: u32 = 10;

/// Convert a millisecond duration to a whole number of ticks, rounding up so
/// that a caller requesting `ms` milliseconds never wakes early.
#[inline]
pub const fn ms_to_ticks(ms: u32, ms_per_tick: u32) -> u32 {
    (ms + ms_per_tick - 1) / ms_per_tick
}

/// Convert a tick count back to milliseconds.
#[inline]
pub const fn ticks_to_ms(ticks: u32, ms_per_tick: u32) -> u32 {
    ticks.saturating_mul(ms_per_tick)
}
