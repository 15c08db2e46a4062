//! Processor primitives consumed by the scheduler

#[cfg(target_os = "none")]
pub mod x86_64;

/// The operations the scheduler needs from the processor it runs on.
///
/// Every method acts on the calling processor only, except
/// [`Cpu::broadcast_reschedule`] which reaches all of them.
pub trait Cpu: Sync {
    /// Identifier of the calling processor.
    fn id(&self) -> usize;

    /// Spin-loop hint used while busy-waiting.
    fn relax(&self);

    /// Wait for the next interrupt.
    fn halt(&self);

    /// Send the reschedule interrupt to every processor, the caller included.
    fn broadcast_reschedule(&self);

    /// Enter the scheduler on the calling processor as if a tick had fired.
    fn reschedule_self(&self);

    /// Run `f` with interrupts masked on the calling processor.
    fn without_interrupts<R, F: FnOnce() -> R>(&self, f: F) -> R;
}
