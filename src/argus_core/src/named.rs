//! Shared accessor for every kernel object's stable name.

/// Implemented by every kernel primitive (thread, semaphore, mutex, queue,
/// channel, timer, run-loop). Mirrors `Ar::NamedObject` in the original
/// kernel, which every object type inherited from instead of repeating a
/// `name()` method by hand.
pub trait Named {
    /// The name the object was created with.
    fn name(&self) -> &str;
}
