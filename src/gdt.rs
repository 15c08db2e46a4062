//! Global Descriptor Table (GDT) and TSS
//!
//! Every processor gets its own GDT and TSS: loading a TSS marks its
//! descriptor busy, so one descriptor cannot be loaded on two processors.
//! Selector values are fixed by the entry order and match the selectors
//! primed into new threads.

use alloc::boxed::Box;
use alloc::vec;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

use crate::config::CONFIG;

/// IST index for double fault handler - uses separate stack
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

/// Stack size for IST stacks (20KB each)
const STACK_SIZE: usize = 4096 * 5;

/// Segment selectors for kernel code, data and TSS
#[derive(Debug, Clone, Copy)]
pub struct Selectors {
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub tss_selector: SegmentSelector,
}

/// Build and load a GDT and TSS for the calling processor.
///
/// Needs the heap. The tables are leaked and live as long as the kernel.
pub fn init() -> Selectors {
    use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
    use x86_64::instructions::tables::load_tss;

    // Dedicated stack for double fault handler
    let double_fault_stack: &'static mut [u8] = Box::leak(vec![0u8; STACK_SIZE].into_boxed_slice());

    let mut tss = TaskStateSegment::new();
    let stack_start = VirtAddr::from_ptr(double_fault_stack.as_ptr());
    tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = stack_start + STACK_SIZE as u64;
    let tss: &'static TaskStateSegment = Box::leak(Box::new(tss));

    let mut gdt = GlobalDescriptorTable::new();
    let kernel_code = gdt.add_entry(Descriptor::kernel_code_segment());
    let kernel_data = gdt.add_entry(Descriptor::kernel_data_segment());
    let tss_selector = gdt.add_entry(Descriptor::tss_segment(tss));
    let gdt: &'static GlobalDescriptorTable = Box::leak(Box::new(gdt));

    debug_assert_eq!(kernel_code.0, CONFIG.scheduler.kernel_code_selector);
    debug_assert_eq!(kernel_data.0, CONFIG.scheduler.kernel_stack_selector);

    gdt.load();
    unsafe {
        CS::set_reg(kernel_code);
        SS::set_reg(kernel_data);
        DS::set_reg(kernel_data);
        ES::set_reg(kernel_data);
        load_tss(tss_selector);
    }

    Selectors {
        kernel_code,
        kernel_data,
        tss_selector,
    }
}
