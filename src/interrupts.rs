//! Interrupt Descriptor Table and interrupt controllers
//!
//! CPU exceptions go through `x86-interrupt` handlers and are fatal. The timer,
//! reschedule and yield vectors go through the assembly stubs in
//! [`crate::arch::x86_64::entry`] so the scheduler can rewrite the frame.

use spin::Lazy;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::VirtAddr;

use crate::arch::x86_64::{apic, entry, halt_forever, serial_write_str, RawSerial};
use crate::task::frame::SavedContext;

pub const PIC1_OFFSET: u8 = 0x20;
pub const PIC2_OFFSET: u8 = 0x28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    /// PIT on IRQ 0, delivered to the bootstrap processor only.
    Timer = PIC1_OFFSET,
    /// IPI forwarding a tick to the other processors, and the lock broadcast.
    Reschedule = 0xF0,
    /// Software interrupt raised by a terminating thread.
    Yield = 0xF1,
    Spurious = 0xFF,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }
}

// ============================================================================
// PANIC PATH - serial only, no locks, no allocations
// ============================================================================

fn kernel_panic(exception: &str, stack_frame: &InterruptStackFrame, error_code: Option<u64>) -> ! {
    use core::fmt::Write;

    x86_64::instructions::interrupts::disable();

    serial_write_str("\n!!! KERNEL PANIC !!!\n");
    let mut out = RawSerial;
    let _ = writeln!(out, "Exception: {} on processor {}", exception, apic::current_id());
    if let Some(code) = error_code {
        let _ = writeln!(out, "Error Code: {:#x}", code);
    }
    let _ = writeln!(out, "RIP: {:#018x}", stack_frame.instruction_pointer.as_u64());
    let _ = writeln!(out, "RSP: {:#018x}", stack_frame.stack_pointer.as_u64());
    let _ = writeln!(out, "RFLAGS: {:#018x}", stack_frame.cpu_flags);
    let _ = writeln!(out, "CS: {:#x} SS: {:#x}", stack_frame.code_segment, stack_frame.stack_segment);
    serial_write_str("System halted.\n");

    halt_forever()
}

// ============================================================================
// PIC
// ============================================================================

fn initialize_pics() {
    unsafe {
        let mut wait_port: Port<u8> = Port::new(0x80);
        let mut pic1_cmd: Port<u8> = Port::new(0x20);
        let mut pic1_data: Port<u8> = Port::new(0x21);
        let mut pic2_cmd: Port<u8> = Port::new(0xA0);
        let mut pic2_data: Port<u8> = Port::new(0xA1);

        // ICW1: start initialization
        pic1_cmd.write(0x11);
        wait_port.write(0);
        pic2_cmd.write(0x11);
        wait_port.write(0);

        // ICW2: vector offsets
        pic1_data.write(PIC1_OFFSET);
        wait_port.write(0);
        pic2_data.write(PIC2_OFFSET);
        wait_port.write(0);

        // ICW3: cascading
        pic1_data.write(4); // slave on IRQ2
        wait_port.write(0);
        pic2_data.write(2); // cascade identity
        wait_port.write(0);

        // ICW4: 8086 mode
        pic1_data.write(0x01);
        wait_port.write(0);
        pic2_data.write(0x01);
        wait_port.write(0);

        // Only the timer (IRQ0) is unmasked
        pic1_data.write(0b1111_1110);
        pic2_data.write(0b1111_1111);
    }
}

pub fn notify_end_of_interrupt(irq: u8) {
    unsafe {
        if irq >= 8 {
            let mut pic2: Port<u8> = Port::new(0xA0);
            pic2.write(0x20);
        }
        let mut pic1: Port<u8> = Port::new(0x20);
        pic1.write(0x20);
    }
}

// ============================================================================
// IDT
// ============================================================================

static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(|| {
    let mut idt = InterruptDescriptorTable::new();

    idt.divide_error.set_handler_fn(divide_error_handler);
    idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
    unsafe {
        idt.double_fault
            .set_handler_fn(double_fault_handler)
            .set_stack_index(crate::gdt::DOUBLE_FAULT_IST_INDEX);
    }
    idt.general_protection_fault.set_handler_fn(gpf_handler);
    idt.page_fault.set_handler_fn(page_fault_handler);

    unsafe {
        idt[InterruptIndex::Timer.as_usize()]
            .set_handler_addr(VirtAddr::new(entry::timer_entry as usize as u64));
        idt[InterruptIndex::Reschedule.as_usize()]
            .set_handler_addr(VirtAddr::new(entry::reschedule_entry as usize as u64));
        idt[InterruptIndex::Yield.as_usize()]
            .set_handler_addr(VirtAddr::new(entry::yield_entry as usize as u64));
    }
    idt[InterruptIndex::Spurious.as_usize()].set_handler_fn(spurious_handler);

    idt
});

/// Remap the PICs. Bootstrap processor only, before interrupts are enabled.
pub fn init_pics() {
    initialize_pics();
}

/// Load the shared IDT on the calling processor.
pub fn load_idt() {
    IDT.load();
}

// ============================================================================
// Exceptions
// ============================================================================

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    kernel_panic("DIVIDE BY ZERO (#DE)", &stack_frame, None);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    kernel_panic("INVALID OPCODE (#UD)", &stack_frame, None);
}

extern "x86-interrupt" fn double_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) -> ! {
    kernel_panic("DOUBLE FAULT (#DF)", &stack_frame, Some(error_code));
}

extern "x86-interrupt" fn gpf_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    kernel_panic("GENERAL PROTECTION FAULT (#GP)", &stack_frame, Some(error_code));
}

extern "x86-interrupt" fn page_fault_handler(stack_frame: InterruptStackFrame, error_code: PageFaultErrorCode) {
    use core::fmt::Write;

    let cr2 = x86_64::registers::control::Cr2::read_raw();
    let _ = writeln!(RawSerial, "Faulting Address (CR2): {:#018x}", cr2);
    kernel_panic("PAGE FAULT (#PF)", &stack_frame, Some(error_code.bits()));
}

extern "x86-interrupt" fn spurious_handler(_stack_frame: InterruptStackFrame) {
    // No EOI for spurious interrupts
}

// ============================================================================
// Scheduler vectors, called from the entry stubs with interrupts masked
// ============================================================================

pub extern "C" fn timer_dispatch(frame: &mut SavedContext) {
    crate::drivers::timer::tick();
    crate::task::on_tick(frame);
    notify_end_of_interrupt(0);
    // The PIT only reaches this processor; pass the tick on.
    apic::broadcast_ipi(InterruptIndex::Reschedule.as_u8(), apic::Destination::AllExcludingSelf);
}

pub extern "C" fn reschedule_dispatch(frame: &mut SavedContext) {
    crate::task::on_tick(frame);
    apic::eoi();
}

pub extern "C" fn yield_dispatch(frame: &mut SavedContext) {
    crate::task::on_tick(frame);
}
