//! Compile-time kernel configuration

use log::LevelFilter;

/// Parameters of the thread scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Size of every thread stack in bytes.
    pub stack_size: usize,
    /// Code segment selector loaded into new threads.
    pub kernel_code_selector: u16,
    /// Stack segment selector loaded into new threads.
    pub kernel_stack_selector: u16,
    /// RFLAGS of a new thread (IF set, reserved bit 1 set).
    pub initial_rflags: u64,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        SchedulerConfig {
            stack_size: 4096 * 4, // 16 KB
            kernel_code_selector: 0x08,
            kernel_stack_selector: 0x10,
            initial_rflags: 0x202,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KernelConfig {
    pub heap_size: usize,
    /// PIT interrupt frequency, one scheduler tick per interrupt.
    pub timer_hz: u32,
    pub log_level: LevelFilter,
    pub scheduler: SchedulerConfig,
}

impl KernelConfig {
    pub const fn new() -> Self {
        KernelConfig {
            heap_size: 4 * 1024 * 1024, // 4MB
            timer_hz: 1000,
            log_level: LevelFilter::Info,
            scheduler: SchedulerConfig::new(),
        }
    }
}

pub static CONFIG: KernelConfig = KernelConfig::new();
