use spin::Once;

use super::frame::SavedContext;
use super::scheduler::{Scheduler, Trampolines};
use super::thread::ThreadId;
use crate::arch::x86_64::{entry, KernelCpu};
use crate::arch::Cpu;
use crate::config::CONFIG;
use crate::error::{Error, Result};

static SCHEDULER: Once<Scheduler<KernelCpu>> = Once::new();

fn scheduler() -> Result<&'static Scheduler<KernelCpu>> {
    SCHEDULER.get().ok_or(Error::NotInitialized)
}

/// Body of every idle thread.
pub extern "C" fn idle_thread() {
    loop {
        x86_64::instructions::hlt();
    }
}

/// Where a thread lands when its entry function returns.
pub extern "C" fn thread_exit() -> ! {
    match SCHEDULER.get() {
        Some(scheduler) => scheduler.terminate_current(),
        None => panic!("thread exit before the scheduler was initialized"),
    }
}

/// Scheduler entry for the timer, reschedule and yield vectors.
pub fn on_tick(frame: &mut SavedContext) {
    if let Some(scheduler) = SCHEDULER.get() {
        scheduler.tick(frame);
    }
}

/// Set up scheduling on the bootstrap processor. Interrupts must be off.
///
/// The caller continues as this processor's idle thread.
pub fn init_bootstrap_processor(cpu_slots: usize) -> Result<ThreadId> {
    let scheduler = SCHEDULER.call_once(|| {
        Scheduler::new(
            KernelCpu,
            CONFIG.scheduler,
            Trampolines {
                idle: idle_thread,
                exit: entry::thread_exit_entry,
            },
        )
    });
    scheduler.bootstrap_primary(cpu_slots)
}

/// Join scheduling from an application processor. Interrupts must be off.
pub fn init_application_processor() -> Result<ThreadId> {
    scheduler()?.bootstrap_secondary()
}

/// Start a thread on the bootstrap processor.
pub fn spawn(entry: extern "C" fn()) -> Result<ThreadId> {
    scheduler()?.spawn(entry, None)
}

/// Start a thread pinned to `cpu`.
pub fn spawn_on(entry: extern "C" fn(), cpu: usize) -> Result<ThreadId> {
    scheduler()?.spawn(entry, Some(cpu))
}

/// Suspend the calling thread for `ticks` timekeeping ticks.
pub fn sleep(ticks: u64) {
    let Ok(scheduler) = scheduler() else {
        return;
    };
    let Some(thread) = scheduler.sleep(ticks).and_then(|id| scheduler.thread(id)) else {
        return;
    };
    while thread.sleep_ticks() > 0 {
        scheduler.cpu().halt();
    }
}

/// Stop every other processor from scheduling until [`unlock`].
pub fn lock() {
    if let Ok(scheduler) = scheduler() {
        scheduler.lock();
    }
}

pub fn unlock() {
    if let Ok(scheduler) = scheduler() {
        scheduler.unlock();
    }
}

pub fn can_lock() -> bool {
    scheduler().map_or(false, |scheduler| scheduler.can_lock())
}

pub fn thread_count() -> usize {
    scheduler().map_or(0, |scheduler| scheduler.thread_count())
}
