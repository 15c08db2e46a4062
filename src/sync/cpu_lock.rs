use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Kernel-wide lock that stops every other processor from scheduling.
///
/// Holding it does not by itself exclude anyone: the holder broadcasts a
/// reschedule interrupt after [`CpuLock::acquire`], and every processor that
/// is not the owner spins inside its tick until [`CpuLock::release`]. Only
/// plain loads and stores are used, so two processors acquiring at once both
/// believe they own it and the last store of `owner` wins.
pub struct CpuLock {
    held: AtomicBool,
    owner: AtomicUsize,
}

impl CpuLock {
    pub const fn new() -> Self {
        CpuLock {
            held: AtomicBool::new(false),
            owner: AtomicUsize::new(0),
        }
    }

    /// Record `cpu` as the owner, then mark the lock held.
    pub fn acquire(&self, cpu: usize) {
        self.owner.store(cpu, Ordering::SeqCst);
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Processor that last acquired the lock. Meaningless while released.
    pub fn owner(&self) -> usize {
        self.owner.load(Ordering::SeqCst)
    }

    /// Whether the lock is held by some processor other than `cpu`.
    pub fn excludes(&self, cpu: usize) -> bool {
        self.is_held() && self.owner() != cpu
    }

    /// Busy-wait until the lock is released.
    pub fn wait_released(&self, mut relax: impl FnMut()) {
        while self.is_held() {
            relax();
        }
    }
}

impl Default for CpuLock {
    fn default() -> Self {
        Self::new()
    }
}
