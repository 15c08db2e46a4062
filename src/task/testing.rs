//! Mock processor for host tests
//!
//! Each OS thread of the test harness plays one processor; [`enter`] picks
//! which one.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::frame::SavedContext;
use super::scheduler::{Scheduler, Trampolines};
use crate::arch::Cpu;
use crate::config::SchedulerConfig;

std::thread_local! {
    static CURRENT_CPU: Cell<usize> = const { Cell::new(0) };
    static MASKED: Cell<bool> = const { Cell::new(false) };
    static MASKED_ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

/// System allocator that counts allocations made inside
/// [`Cpu::without_interrupts`] on the calling thread.
struct MaskAwareAllocator;

unsafe impl GlobalAlloc for MaskAwareAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = MASKED.try_with(|masked| {
            if masked.get() {
                let _ = MASKED_ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
            }
        });
        std::alloc::System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        std::alloc::System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: MaskAwareAllocator = MaskAwareAllocator;

/// Allocations this thread made with interrupts masked.
pub fn masked_allocations() -> usize {
    MASKED_ALLOCATIONS.with(Cell::get)
}

/// Make the calling test thread act as processor `cpu`.
pub fn enter(cpu: usize) {
    CURRENT_CPU.with(|current| current.set(cpu));
}

#[derive(Default)]
pub struct MockCpu {
    broadcasts: AtomicUsize,
    self_reschedules: AtomicUsize,
    relaxes: AtomicUsize,
}

impl MockCpu {
    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn self_reschedules(&self) -> usize {
        self.self_reschedules.load(Ordering::SeqCst)
    }

    pub fn relaxes(&self) -> usize {
        self.relaxes.load(Ordering::SeqCst)
    }
}

impl Cpu for MockCpu {
    fn id(&self) -> usize {
        CURRENT_CPU.with(Cell::get)
    }

    fn relax(&self) {
        self.relaxes.fetch_add(1, Ordering::SeqCst);
        std::thread::yield_now();
    }

    fn halt(&self) {
        std::thread::yield_now();
    }

    fn broadcast_reschedule(&self) {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
    }

    fn reschedule_self(&self) {
        self.self_reschedules.fetch_add(1, Ordering::SeqCst);
    }

    fn without_interrupts<R, F: FnOnce() -> R>(&self, f: F) -> R {
        let outer = MASKED.with(|masked| masked.replace(true));
        let result = f();
        MASKED.with(|masked| masked.set(outer));
        result
    }
}

pub extern "C" fn idle() {}

pub extern "C" fn worker() {}

pub unsafe extern "C" fn exit() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

pub fn scheduler() -> Scheduler<MockCpu> {
    scheduler_with(SchedulerConfig::new())
}

pub fn scheduler_with(config: SchedulerConfig) -> Scheduler<MockCpu> {
    Scheduler::new(MockCpu::default(), config, Trampolines { idle, exit })
}

/// A frame that no primed thread context can be equal to.
pub fn interrupted_frame(marker: u64) -> SavedContext {
    SavedContext {
        rax: marker,
        rip: 0x1000 + marker,
        cs: 0x08,
        ss: 0x10,
        rflags: 0x202,
        rsp: 0x8000,
        ..SavedContext::empty()
    }
}
