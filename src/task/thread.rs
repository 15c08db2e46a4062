//! Thread records and their stacks

use alloc::alloc::{alloc, dealloc, Layout};
use core::cell::UnsafeCell;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::frame::SavedContext;
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};

const STACK_ALIGN: usize = 16;

/// Index of a thread in the scheduler registry.
///
/// Ids follow registration order and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Heap memory backing a thread's execution stack.
pub struct Stack {
    bottom: NonNull<u8>,
    size: usize,
}

// Safety: the stack is plain heap memory owned by its thread record.
unsafe impl Send for Stack {}
unsafe impl Sync for Stack {}

impl Stack {
    pub fn new(size: usize) -> Result<Self> {
        let size = (size + STACK_ALIGN - 1) & !(STACK_ALIGN - 1);
        let layout = Layout::from_size_align(size, STACK_ALIGN).map_err(|_| Error::OutOfMemory)?;
        if layout.size() == 0 {
            return Err(Error::OutOfMemory);
        }

        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr)
            .map(|bottom| Stack { bottom, size })
            .ok_or(Error::OutOfMemory)
    }

    /// Low address of the stack.
    pub fn bottom(&self) -> u64 {
        self.bottom.as_ptr() as u64
    }

    /// High address of the stack; it grows down from here.
    pub fn top(&self) -> u64 {
        self.bottom() + self.size as u64
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.bottom() && addr < self.top()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // Registered threads are leaked, so this only runs for threads that
        // were created but never started.
        if let Ok(layout) = Layout::from_size_align(self.size, STACK_ALIGN) {
            unsafe { dealloc(self.bottom.as_ptr(), layout) };
        }
    }
}

/// A kernel thread: its saved registers, its stack and its scheduling state.
pub struct Thread {
    context: UnsafeCell<SavedContext>,
    stack: Stack,
    terminated: AtomicBool,
    sleep_ticks: AtomicU64,
    affinity: usize,
}

// Safety: `context` is only touched through the unsafe accessors below, whose
// callers guarantee that the processor the thread is pinned to is the only one
// doing so. Every other field is atomic or immutable once shared.
unsafe impl Sync for Thread {}

impl Thread {
    /// Allocate a stack and prime a frame that starts executing `entry`.
    ///
    /// `exit` is pushed as the return address so a returning entry function
    /// lands in the termination path.
    pub fn new(entry: extern "C" fn(), exit: u64, config: &SchedulerConfig) -> Result<Self> {
        let stack = Stack::new(config.stack_size)?;

        let rsp = stack.top() - 8;
        // Safety: `rsp` is 8-byte aligned and inside the stack we just allocated.
        unsafe { (rsp as *mut u64).write(exit) };

        let mut context = SavedContext::empty();
        context.cs = config.kernel_code_selector as u64;
        context.ss = config.kernel_stack_selector as u64;
        context.rsp = rsp;
        context.rflags = config.initial_rflags;
        context.rip = entry as usize as u64;

        Ok(Thread {
            context: UnsafeCell::new(context),
            stack,
            terminated: AtomicBool::new(false),
            sleep_ticks: AtomicU64::new(0),
            affinity: 0,
        })
    }

    pub fn affinity(&self) -> usize {
        self.affinity
    }

    pub(crate) fn pin_to(&mut self, cpu: usize) {
        self.affinity = cpu;
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn sleep_ticks(&self) -> u64 {
        self.sleep_ticks.load(Ordering::Acquire)
    }

    pub(crate) fn set_sleep_ticks(&self, ticks: u64) {
        self.sleep_ticks.store(ticks, Ordering::Release);
    }

    /// Count one tick off the sleep counter if it is positive.
    pub(crate) fn decrement_sleep(&self) {
        let _ = self
            .sleep_ticks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ticks| ticks.checked_sub(1));
    }

    /// Whether the thread may run on `cpu` right now.
    pub fn is_eligible_on(&self, cpu: usize) -> bool {
        self.affinity == cpu && !self.is_terminated() && self.sleep_ticks() == 0
    }

    /// Copy of the saved register frame.
    ///
    /// # Safety
    /// No tick may be saving into or restoring from this thread concurrently,
    /// i.e. the thread must not be running on its processor.
    pub unsafe fn saved_context(&self) -> SavedContext {
        *self.context.get()
    }

    /// Store the interrupted frame as this thread's context.
    ///
    /// # Safety
    /// Must only be called by the processor the thread is pinned to, from the
    /// tick path.
    pub(crate) unsafe fn save(&self, frame: &SavedContext) {
        *self.context.get() = *frame;
    }

    /// Overwrite the interrupted frame with this thread's context.
    ///
    /// # Safety
    /// Same contract as [`Thread::save`].
    pub(crate) unsafe fn restore(&self, frame: &mut SavedContext) {
        *frame = *self.context.get();
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("affinity", &self.affinity)
            .field("terminated", &self.is_terminated())
            .field("sleep_ticks", &self.sleep_ticks())
            .field("stack_top", &format_args!("{:#x}", self.stack.top()))
            .finish()
    }
}
