//! Round-robin SMP scheduler
//!
//! All processors share one registry of threads. Each processor keeps its own
//! cursor into it, pointing at the thread it is running, and on every tick
//! walks forward from there to the next thread pinned to it that is neither
//! sleeping nor terminated.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Once;

use super::frame::SavedContext;
use super::registry::Registry;
use super::thread::{Thread, ThreadId};
use crate::arch::Cpu;
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::sync::CpuLock;

/// Cursor value of a processor that has not adopted a thread yet.
const NO_THREAD: usize = usize::MAX;

/// Code addresses the scheduler primes into new threads.
#[derive(Clone, Copy)]
pub struct Trampolines {
    /// Entry of every idle thread.
    pub idle: extern "C" fn(),
    /// Return address of every thread; must end in [`Scheduler::terminate_current`].
    pub exit: unsafe extern "C" fn() -> !,
}

pub struct Scheduler<C: Cpu> {
    cpu: C,
    config: SchedulerConfig,
    trampolines: Trampolines,
    registry: Registry,
    cursors: Once<Box<[AtomicUsize]>>,
    initialized: AtomicBool,
    timekeeper: AtomicUsize,
    lock: CpuLock,
}

impl<C: Cpu> Scheduler<C> {
    pub fn new(cpu: C, config: SchedulerConfig, trampolines: Trampolines) -> Self {
        Scheduler {
            cpu,
            registry: Registry::new(),
            config,
            trampolines,
            cursors: Once::new(),
            initialized: AtomicBool::new(false),
            timekeeper: AtomicUsize::new(0),
            lock: CpuLock::new(),
        }
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ---- Thread lifecycle ----

    /// Build a thread that will run `entry`, without registering it.
    pub fn create(&self, entry: extern "C" fn()) -> Result<Thread> {
        Thread::new(entry, self.trampolines.exit as usize as u64, &self.config)
    }

    /// Register `thread`, pinned to `cpu` or to the bootstrap processor.
    pub fn start(&self, mut thread: Thread, cpu: Option<usize>) -> Result<ThreadId> {
        let affinity = cpu.unwrap_or_else(|| self.timekeeper());
        if let Some(cursors) = self.cursors.get() {
            if affinity >= cursors.len() {
                return Err(Error::InvalidProcessor(affinity));
            }
        }
        thread.pin_to(affinity);

        let id = self.register(thread)?;
        log::debug!("thread {} started on processor {}", id, affinity);
        Ok(id)
    }

    /// Append `thread` to the registry.
    ///
    /// Allocation happens with interrupts as the caller left them; only the
    /// publish step runs masked, so it never waits on the heap lock.
    fn register(&self, thread: Thread) -> Result<ThreadId> {
        let mut thread = Box::new(thread);
        loop {
            self.registry.reserve()?;
            match self.cpu.without_interrupts(|| self.registry.push(thread)) {
                Ok((id, _)) => return Ok(id),
                // Another appender took the last reserved slot.
                Err(back) => thread = back,
            }
        }
    }

    pub fn spawn(&self, entry: extern "C" fn(), cpu: Option<usize>) -> Result<ThreadId> {
        let thread = self.create(entry)?;
        self.start(thread, cpu)
    }

    /// Put the thread running on the calling processor to sleep for `ticks`
    /// timekeeping ticks.
    ///
    /// Only sets the counter: the caller keeps running until its next tick.
    pub fn sleep(&self, ticks: u64) -> Option<ThreadId> {
        let id = self.current(self.cpu.id())?;
        self.registry.get(id)?.set_sleep_ticks(ticks);
        Some(id)
    }

    /// Mark the calling processor's thread terminated and switch away for good.
    pub fn terminate_current(&self) -> ! {
        if let Some(id) = self.current(self.cpu.id()) {
            if let Some(thread) = self.registry.get(id) {
                thread.mark_terminated();
                log::info!("thread {} has exited", id);
            }
        }

        self.cpu.reschedule_self();
        panic!("thread termination failed");
    }

    // ---- Tick ----

    /// Switch the calling processor to its next thread.
    ///
    /// `frame` is the interrupted context; on return it holds the context to
    /// resume. Runs in interrupt context and must not allocate or log.
    pub fn tick(&self, frame: &mut SavedContext) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }
        let cpu = self.cpu.id();

        if self.lock.is_held() {
            if self.lock.excludes(cpu) {
                self.lock.wait_released(|| self.cpu.relax());
            }
            return;
        }

        if cpu == self.timekeeper() {
            for (_, thread) in self.registry.iter() {
                thread.decrement_sleep();
            }
        }

        let Some(slot) = self.cursor(cpu) else {
            return;
        };
        let current = slot.load(Ordering::Acquire);
        if current == NO_THREAD {
            return;
        }

        if let Some(thread) = self.registry.get(ThreadId(current)) {
            if !thread.is_terminated() {
                // Safety: the cursor names the thread interrupted on this processor.
                unsafe { thread.save(frame) };
            }
        }

        // Ends on `current` itself after a full circle.
        let len = self.registry.len();
        for step in 1..=len {
            let index = (current + step) % len;
            let Some(thread) = self.registry.get(ThreadId(index)) else {
                continue;
            };
            if thread.is_eligible_on(cpu) {
                slot.store(index, Ordering::Release);
                // Safety: `thread` is pinned to this processor and not running.
                unsafe { thread.restore(frame) };
                return;
            }
        }
    }

    // ---- Cross-processor lock ----

    /// Stop every other processor from scheduling until [`Scheduler::unlock`].
    pub fn lock(&self) {
        self.lock.acquire(self.cpu.id());
        self.cpu.broadcast_reschedule();
    }

    pub fn unlock(&self) {
        self.lock.release();
    }

    pub fn can_lock(&self) -> bool {
        self.is_initialized()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    pub fn lock_owner(&self) -> Option<usize> {
        self.lock.is_held().then(|| self.lock.owner())
    }

    // ---- Bootstrap ----

    /// Initialize scheduling on the bootstrap processor.
    ///
    /// `cpu_slots` is one more than the highest processor id that will ever
    /// call [`Scheduler::bootstrap_secondary`]. The caller becomes the
    /// timekeeping processor and continues as its own idle thread. A failure
    /// leaves the scheduler uninitialized and the call can be retried.
    pub fn bootstrap_primary(&self, cpu_slots: usize) -> Result<ThreadId> {
        if self.cursors.get().is_some() {
            return Err(Error::AlreadyInitialized);
        }
        let cpu = self.cpu.id();
        let slots = cpu_slots.max(cpu + 1);

        // Allocate everything before publishing anything.
        let cursors: Box<[AtomicUsize]> = (0..slots).map(|_| AtomicUsize::new(NO_THREAD)).collect();
        let idle = self.register_idle(cpu)?;

        let mut pending = Some(cursors);
        self.cursors.call_once(|| pending.take().unwrap_or_default());
        if pending.is_some() {
            self.retire(idle);
            return Err(Error::AlreadyInitialized);
        }

        self.timekeeper.store(cpu, Ordering::Release);
        if let Some(slot) = self.cursor(cpu) {
            slot.store(idle.0, Ordering::Release);
        }
        self.initialized.store(true, Ordering::Release);

        for (id, thread) in self.unschedulable() {
            log::warn!(
                "thread {} is pinned to processor {} which has no scheduler slot, it will never run",
                id,
                thread.affinity()
            );
        }
        log::info!("scheduler online: {} processor slots, timekeeper {}", slots, cpu);
        Ok(idle)
    }

    /// Join scheduling from an application processor.
    pub fn bootstrap_secondary(&self) -> Result<ThreadId> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let cpu = self.cpu.id();
        let slot = self.cursor(cpu).ok_or(Error::InvalidProcessor(cpu))?;
        if slot.load(Ordering::Acquire) != NO_THREAD {
            return Err(Error::AlreadyInitialized);
        }

        let idle = self.register_idle(cpu)?;
        // The code running now becomes the idle thread and is saved into it
        // on the next tick.
        if slot
            .compare_exchange(NO_THREAD, idle.0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.retire(idle);
            return Err(Error::AlreadyInitialized);
        }

        log::info!("processor {} joined scheduling", cpu);
        Ok(idle)
    }

    fn register_idle(&self, cpu: usize) -> Result<ThreadId> {
        let mut idle = self.create(self.trampolines.idle)?;
        idle.pin_to(cpu);
        self.register(idle)
    }

    /// Terminate an idle record that lost a bootstrap race.
    fn retire(&self, id: ThreadId) {
        if let Some(thread) = self.registry.get(id) {
            thread.mark_terminated();
        }
    }

    fn cursor(&self, cpu: usize) -> Option<&AtomicUsize> {
        self.cursors.get()?.get(cpu)
    }

    // ---- Introspection ----

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn thread_count(&self) -> usize {
        self.registry.len()
    }

    pub fn thread(&self, id: ThreadId) -> Option<&'static Thread> {
        self.registry.get(id)
    }

    /// Thread currently running on `cpu`.
    pub fn current(&self, cpu: usize) -> Option<ThreadId> {
        let index = self.cursor(cpu)?.load(Ordering::Acquire);
        (index != NO_THREAD).then_some(ThreadId(index))
    }

    /// Processor that counts down sleeping threads.
    pub fn timekeeper(&self) -> usize {
        self.timekeeper.load(Ordering::Acquire)
    }

    /// Number of per-processor slots, zero before bootstrap.
    pub fn cpu_slots(&self) -> usize {
        self.cursors.get().map_or(0, |cursors| cursors.len())
    }

    /// Threads pinned to a processor that has no slot. Only threads started
    /// before bootstrap can end up here.
    pub fn unschedulable(&self) -> impl Iterator<Item = (ThreadId, &'static Thread)> + '_ {
        let slots = self.cpu_slots();
        self.registry
            .iter()
            .filter(move |(_, thread)| slots > 0 && thread.affinity() >= slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testing::{
        enter, interrupted_frame, masked_allocations, scheduler, scheduler_with, worker, MockCpu,
    };
    use alloc::vec::Vec;
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;

    fn context_of(s: &Scheduler<MockCpu>, id: ThreadId) -> SavedContext {
        unsafe { s.thread(id).unwrap().saved_context() }
    }

    /// Tick `count` times on the calling processor and collect where it lands.
    fn run_ticks(s: &Scheduler<MockCpu>, frame: &mut SavedContext, count: usize) -> Vec<ThreadId> {
        (0..count)
            .map(|_| {
                s.tick(frame);
                s.current(s.cpu().id()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_create_primes_exit_trampoline() {
        let s = scheduler();
        let thread = s.create(worker).unwrap();
        let ctx = unsafe { thread.saved_context() };
        assert_eq!(ctx.rip, worker as usize as u64);
        let ret = unsafe { *(ctx.rsp as *const u64) };
        assert_eq!(ret, crate::task::testing::exit as usize as u64);
        assert_eq!(s.thread_count(), 0);
    }

    #[test]
    fn test_tick_before_bootstrap_changes_nothing() {
        enter(0);
        let s = scheduler();
        let id = s.spawn(worker, None).unwrap();
        s.thread(id).unwrap().set_sleep_ticks(3);
        let before = context_of(&s, id);

        let mut frame = interrupted_frame(1);
        for _ in 0..5 {
            s.tick(&mut frame);
        }

        assert_eq!(frame, interrupted_frame(1));
        assert_eq!(s.thread(id).unwrap().sleep_ticks(), 3);
        assert_eq!(context_of(&s, id), before);
        assert_eq!(s.current(0), None);
        assert_eq!(s.thread_count(), 1);
    }

    #[test]
    fn test_start_before_bootstrap_defaults_to_processor_zero() {
        enter(3);
        let s = scheduler();
        let id = s.spawn(worker, None).unwrap();
        assert_eq!(s.thread(id).unwrap().affinity(), 0);
    }

    #[test]
    fn test_start_defaults_to_bootstrap_processor() {
        enter(1);
        let s = scheduler();
        s.bootstrap_primary(2).unwrap();
        enter(0);
        let id = s.spawn(worker, None).unwrap();
        assert_eq!(s.thread(id).unwrap().affinity(), 1);
        assert_eq!(s.timekeeper(), 1);
    }

    #[test]
    fn test_start_rejects_unknown_processor() {
        enter(0);
        let s = scheduler();
        s.bootstrap_primary(2).unwrap();
        assert_eq!(s.spawn(worker, Some(2)), Err(Error::InvalidProcessor(2)));
        assert_eq!(s.thread_count(), 1);
    }

    #[test]
    fn test_registry_keeps_growing() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let ids: Vec<ThreadId> = (0..300).map(|_| s.spawn(worker, None).unwrap()).collect();
        assert_eq!(s.thread_count(), 301);
        assert_eq!(ids.last(), Some(&ThreadId(300)));

        let mut frame = interrupted_frame(0);
        assert_eq!(run_ticks(&s, &mut frame, 300), ids);
        assert_eq!(run_ticks(&s, &mut frame, 1), [idle]);
    }

    #[test]
    fn test_start_never_allocates_with_interrupts_masked() {
        enter(0);
        let s = scheduler();
        let before = masked_allocations();

        s.spawn(worker, None).unwrap();
        s.bootstrap_primary(2).unwrap();
        enter(1);
        s.bootstrap_secondary().unwrap();
        // Crosses several bucket boundaries.
        for _ in 0..100 {
            s.spawn(worker, Some(1)).unwrap();
        }
        assert_eq!(masked_allocations(), before);

        // The counter does see allocations made under the mask.
        let boxed = s.cpu().without_interrupts(|| std::hint::black_box(Box::new(7u64)));
        assert_eq!(*boxed, 7);
        assert_eq!(masked_allocations(), before + 1);
    }

    #[test]
    fn test_bootstrap_two_processors() {
        enter(0);
        let s = scheduler();
        assert!(!s.can_lock());
        let idle0 = s.bootstrap_primary(2).unwrap();
        enter(1);
        let idle1 = s.bootstrap_secondary().unwrap();

        assert!(s.is_initialized());
        assert!(s.can_lock());
        assert_eq!(s.cpu_slots(), 2);
        assert_eq!(s.thread(idle0).unwrap().affinity(), 0);
        assert_eq!(s.thread(idle1).unwrap().affinity(), 1);
        assert_eq!(s.current(0), Some(idle0));
        assert_eq!(s.current(1), Some(idle1));

        // The boot flow is saved into the idle record and handed straight back.
        enter(0);
        let mut frame = interrupted_frame(7);
        s.tick(&mut frame);
        assert_eq!(frame, interrupted_frame(7));
        assert_eq!(s.current(0), Some(idle0));
        assert_eq!(context_of(&s, idle0), interrupted_frame(7));
    }

    #[test]
    fn test_bootstrap_slots_cover_caller() {
        enter(3);
        let s = scheduler();
        s.bootstrap_primary(1).unwrap();
        assert_eq!(s.cpu_slots(), 4);
    }

    #[test]
    fn test_bootstrap_errors() {
        enter(1);
        let s = scheduler();
        assert_eq!(s.bootstrap_secondary(), Err(Error::NotInitialized));

        enter(0);
        s.bootstrap_primary(2).unwrap();
        assert_eq!(s.bootstrap_primary(2), Err(Error::AlreadyInitialized));

        enter(5);
        assert_eq!(s.bootstrap_secondary(), Err(Error::InvalidProcessor(5)));

        enter(1);
        s.bootstrap_secondary().unwrap();
        assert_eq!(s.bootstrap_secondary(), Err(Error::AlreadyInitialized));
    }

    #[test]
    fn test_failed_bootstrap_can_be_retried() {
        enter(0);
        let s = scheduler_with(SchedulerConfig { stack_size: 0, ..SchedulerConfig::new() });

        assert_eq!(s.bootstrap_primary(1), Err(Error::OutOfMemory));
        assert!(!s.is_initialized());
        assert_eq!(s.cpu_slots(), 0);
        assert_eq!(s.thread_count(), 0);

        // Still fails for the same reason, not because of the first attempt.
        assert_eq!(s.bootstrap_primary(1), Err(Error::OutOfMemory));
    }

    #[test]
    fn test_threads_pinned_past_the_slots_are_reported() {
        enter(0);
        let s = scheduler();
        let stranded = s.spawn(worker, Some(4)).unwrap();
        let fine = s.spawn(worker, Some(1)).unwrap();
        assert_eq!(s.unschedulable().count(), 0);

        s.bootstrap_primary(2).unwrap();
        let reported: Vec<ThreadId> = s.unschedulable().map(|(id, _)| id).collect();
        assert_eq!(reported, [stranded]);
        assert_eq!(s.thread(fine).unwrap().affinity(), 1);
    }

    #[test]
    fn test_single_thread_is_reselected() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();

        let mut frame = interrupted_frame(3);
        assert_eq!(run_ticks(&s, &mut frame, 10), [idle; 10]);
        assert_eq!(frame, interrupted_frame(3));
    }

    #[test]
    fn test_round_robin_in_creation_order() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let a = s.spawn(worker, Some(0)).unwrap();
        let b = s.spawn(worker, Some(0)).unwrap();
        let c = s.spawn(worker, Some(0)).unwrap();

        let mut frame = interrupted_frame(0);
        assert_eq!(run_ticks(&s, &mut frame, 8), [a, b, c, idle, a, b, c, idle]);
    }

    #[test]
    fn test_tick_saves_interrupted_and_restores_next() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let a = s.spawn(worker, None).unwrap();
        let primed = context_of(&s, a);

        let mut frame = interrupted_frame(1);
        s.tick(&mut frame);
        assert_eq!(context_of(&s, idle), interrupted_frame(1));
        assert_eq!(frame, primed);

        // `a` runs and changes its registers before the next tick.
        frame.rax = 0xabcd;
        frame.rip += 4;
        let running = frame;
        s.tick(&mut frame);
        assert_eq!(context_of(&s, a), running);
        assert_eq!(frame, interrupted_frame(1));

        s.tick(&mut frame);
        assert_eq!(frame, running);
    }

    #[test]
    fn test_other_processors_threads_are_skipped() {
        enter(0);
        let s = scheduler();
        let idle0 = s.bootstrap_primary(2).unwrap();
        enter(1);
        let idle1 = s.bootstrap_secondary().unwrap();
        let a = s.spawn(worker, Some(0)).unwrap();
        let b = s.spawn(worker, Some(1)).unwrap();

        enter(0);
        let mut frame0 = interrupted_frame(0);
        assert_eq!(run_ticks(&s, &mut frame0, 4), [a, idle0, a, idle0]);

        enter(1);
        let mut frame1 = interrupted_frame(1);
        assert_eq!(run_ticks(&s, &mut frame1, 4), [b, idle1, b, idle1]);
    }

    #[test]
    fn test_thread_started_later_is_picked_up() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let mut frame = interrupted_frame(0);
        assert_eq!(run_ticks(&s, &mut frame, 2), [idle, idle]);

        let a = s.spawn(worker, None).unwrap();
        assert_eq!(run_ticks(&s, &mut frame, 2), [a, idle]);
    }

    #[test]
    fn test_sleep_lasts_exactly_k_timekeeping_ticks() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let a = s.spawn(worker, None).unwrap();

        let mut frame = interrupted_frame(0);
        s.tick(&mut frame);
        assert_eq!(s.current(0), Some(a));
        assert_eq!(s.sleep(5), Some(a));

        // The counter reaches zero on the fifth tick, which selects `a` again.
        assert_eq!(run_ticks(&s, &mut frame, 4), [idle; 4]);
        assert_eq!(s.thread(a).unwrap().sleep_ticks(), 1);
        assert_eq!(run_ticks(&s, &mut frame, 1), [a]);
        assert_eq!(s.thread(a).unwrap().sleep_ticks(), 0);
    }

    #[test]
    fn test_only_timekeeper_counts_down() {
        enter(0);
        let s = scheduler();
        s.bootstrap_primary(2).unwrap();
        enter(1);
        s.bootstrap_secondary().unwrap();
        let a = s.spawn(worker, Some(1)).unwrap();
        s.thread(a).unwrap().set_sleep_ticks(2);

        let mut frame = interrupted_frame(0);
        for _ in 0..5 {
            s.tick(&mut frame);
        }
        assert_eq!(s.thread(a).unwrap().sleep_ticks(), 2);

        enter(0);
        s.tick(&mut frame);
        assert_eq!(s.thread(a).unwrap().sleep_ticks(), 1);
    }

    #[test]
    fn test_sleep_without_current_thread() {
        enter(0);
        let s = scheduler();
        assert_eq!(s.sleep(5), None);
    }

    #[test]
    fn test_terminated_thread_is_never_selected() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let a = s.spawn(worker, None).unwrap();
        let b = s.spawn(worker, None).unwrap();

        let thread_a = s.thread(a).unwrap();
        thread_a.set_sleep_ticks(2);
        thread_a.mark_terminated();

        let mut frame = interrupted_frame(0);
        assert_eq!(run_ticks(&s, &mut frame, 6), [b, idle, b, idle, b, idle]);
        assert_eq!(thread_a.sleep_ticks(), 0);
    }

    #[test]
    fn test_terminate_switches_away_without_saving() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let a = s.spawn(worker, None).unwrap();

        let mut frame = interrupted_frame(0);
        s.tick(&mut frame);
        assert_eq!(s.current(0), Some(a));
        let primed = context_of(&s, a);

        // The mock cannot deliver the yield interrupt, so termination reports
        // failure once the reschedule request returns.
        let result = panic::catch_unwind(AssertUnwindSafe(|| s.terminate_current()));
        assert!(result.is_err());
        assert_eq!(s.cpu().self_reschedules(), 1);
        assert!(s.thread(a).unwrap().is_terminated());

        // The tick the yield would have raised.
        let mut dying = interrupted_frame(9);
        s.tick(&mut dying);
        assert_eq!(s.current(0), Some(idle));
        assert_eq!(dying, interrupted_frame(0));
        assert_eq!(context_of(&s, a), primed);

        assert_eq!(run_ticks(&s, &mut frame, 3), [idle; 3]);
    }

    #[test]
    fn test_no_eligible_thread_leaves_frame_untouched() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        s.thread(idle).unwrap().mark_terminated();

        let mut frame = interrupted_frame(4);
        s.tick(&mut frame);
        assert_eq!(frame, interrupted_frame(4));
        assert_eq!(s.current(0), Some(idle));
    }

    #[test]
    fn test_lock_broadcasts_and_records_owner() {
        enter(0);
        let s = scheduler();
        s.bootstrap_primary(2).unwrap();

        enter(1);
        s.lock();
        assert!(s.is_locked());
        assert_eq!(s.lock_owner(), Some(1));
        assert_eq!(s.cpu().broadcasts(), 1);

        s.unlock();
        assert!(!s.is_locked());
        assert_eq!(s.lock_owner(), None);
    }

    #[test]
    fn test_owner_is_not_preempted_and_sleep_freezes() {
        enter(0);
        let s = scheduler();
        let idle = s.bootstrap_primary(1).unwrap();
        let a = s.spawn(worker, None).unwrap();
        let b = s.spawn(worker, None).unwrap();
        s.thread(b).unwrap().set_sleep_ticks(3);

        let mut frame = interrupted_frame(0);
        s.tick(&mut frame);
        assert_eq!(s.current(0), Some(a));
        let running = frame;

        s.lock();
        for _ in 0..5 {
            s.tick(&mut frame);
        }
        assert_eq!(frame, running);
        assert_eq!(s.current(0), Some(a));
        assert_eq!(s.thread(b).unwrap().sleep_ticks(), 3);
        assert_eq!(s.cpu().relaxes(), 0);

        s.unlock();
        assert_eq!(run_ticks(&s, &mut frame, 1), [idle]);
        assert_eq!(s.thread(b).unwrap().sleep_ticks(), 2);
    }

    #[test]
    fn test_non_owner_spins_until_unlock() {
        enter(0);
        let s = scheduler();
        s.bootstrap_primary(2).unwrap();
        enter(1);
        let idle1 = s.bootstrap_secondary().unwrap();
        let b = s.spawn(worker, Some(1)).unwrap();
        let idle1_before = context_of(&s, idle1);
        let b_before = context_of(&s, b);

        enter(0);
        s.lock();

        thread::scope(|scope| {
            let processor1 = scope.spawn(|| {
                enter(1);
                let mut frame = interrupted_frame(1);
                s.tick(&mut frame);
                frame
            });

            while s.cpu().relaxes() == 0 {
                thread::yield_now();
            }
            // Processor 1 is parked inside its tick.
            assert!(!processor1.is_finished());
            assert_eq!(s.current(1), Some(idle1));
            assert_eq!(context_of(&s, idle1), idle1_before);
            assert_eq!(context_of(&s, b), b_before);

            s.unlock();
            let frame = processor1.join().unwrap();
            assert_eq!(frame, interrupted_frame(1));
        });

        assert_eq!(s.current(1), Some(idle1));
        assert_eq!(context_of(&s, idle1), idle1_before);

        // The next tick after unlock schedules normally.
        enter(1);
        let mut frame = interrupted_frame(1);
        s.tick(&mut frame);
        assert_eq!(s.current(1), Some(b));
        assert_eq!(frame, b_before);
    }

    #[test]
    fn test_spinning_timekeeper_does_not_count_down() {
        enter(0);
        let s = scheduler();
        s.bootstrap_primary(2).unwrap();
        enter(1);
        s.bootstrap_secondary().unwrap();
        let a = s.spawn(worker, Some(0)).unwrap();
        s.thread(a).unwrap().set_sleep_ticks(3);

        // Processor 1 owns the lock; processor 0 keeps time.
        s.lock();
        assert_eq!(s.lock_owner(), Some(1));

        thread::scope(|scope| {
            let processor0 = scope.spawn(|| {
                enter(0);
                let mut frame = interrupted_frame(0);
                s.tick(&mut frame);
                frame
            });

            while s.cpu().relaxes() == 0 {
                thread::yield_now();
            }
            assert!(!processor0.is_finished());
            assert_eq!(s.thread(a).unwrap().sleep_ticks(), 3);

            s.unlock();
            assert_eq!(processor0.join().unwrap(), interrupted_frame(0));
        });
        assert_eq!(s.thread(a).unwrap().sleep_ticks(), 3);

        enter(0);
        let mut frame = interrupted_frame(0);
        s.tick(&mut frame);
        assert_eq!(s.thread(a).unwrap().sleep_ticks(), 2);
    }
}
