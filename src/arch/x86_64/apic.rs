//! Local APIC in x2APIC mode
//!
//! Every register is an MSR, so no MMIO mapping is needed. The bootloader
//! switches each processor to x2APIC mode when asked to; [`enable_local`]
//! then software-enables the APIC and we use it for processor ids,
//! inter-processor interrupts and end-of-interrupt signalling.

use core::sync::atomic::{AtomicBool, Ordering};
use x86_64::registers::model_specific::Msr;

const IA32_APIC_BASE: u32 = 0x1B;
const X2APIC_ID: u32 = 0x802;
const X2APIC_EOI: u32 = 0x80B;
const X2APIC_SVR: u32 = 0x80F;
const X2APIC_ICR: u32 = 0x830;

// IA32_APIC_BASE flags
const APIC_BASE_ENABLE: u64 = 1 << 11;
const APIC_BASE_X2APIC: u64 = 1 << 10;

// SVR flags
const SVR_ENABLE: u64 = 1 << 8;
const SPURIOUS_VECTOR: u64 = 0xFF;

// ICR fields
const ICR_LEVEL_ASSERT: u64 = 1 << 14;
const ICR_SHORTHAND_SHIFT: u64 = 18;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// ICR destination shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Destination {
    AllIncludingSelf = 0b10,
    AllExcludingSelf = 0b11,
}

/// Record that the bootloader put the processors in x2APIC mode.
pub fn set_available(available: bool) {
    ENABLED.store(available, Ordering::SeqCst);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Software-enable the Local APIC of the calling processor.
///
/// Does nothing when x2APIC mode is not available.
pub fn enable_local() {
    if !is_enabled() {
        return;
    }
    unsafe {
        let mut base = Msr::new(IA32_APIC_BASE);
        let value = base.read();
        if value & (APIC_BASE_ENABLE | APIC_BASE_X2APIC) != APIC_BASE_ENABLE | APIC_BASE_X2APIC {
            base.write(value | APIC_BASE_ENABLE | APIC_BASE_X2APIC);
        }

        let mut svr = Msr::new(X2APIC_SVR);
        let value = svr.read();
        svr.write(value | SVR_ENABLE | SPURIOUS_VECTOR);
    }
}

/// x2APIC id of the calling processor, or 0 on a uniprocessor boot.
pub fn current_id() -> usize {
    if !is_enabled() {
        return 0;
    }
    unsafe { Msr::new(X2APIC_ID).read() as u32 as usize }
}

/// Signal end of interrupt to the Local APIC.
pub fn eoi() {
    if is_enabled() {
        unsafe { Msr::new(X2APIC_EOI).write(0) };
    }
}

/// Send a fixed interrupt to a group of processors.
pub fn broadcast_ipi(vector: u8, destination: Destination) {
    if !is_enabled() {
        return;
    }
    let command = vector as u64 | ICR_LEVEL_ASSERT | ((destination as u64) << ICR_SHORTHAND_SHIFT);
    unsafe { Msr::new(X2APIC_ICR).write(command) };
}
