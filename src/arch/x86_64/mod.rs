use core::arch::asm;

use crate::arch::Cpu;
use crate::interrupts::InterruptIndex;

pub mod apic;
pub mod entry;

/// The processor the kernel is currently executing on.
pub struct KernelCpu;

impl Cpu for KernelCpu {
    fn id(&self) -> usize {
        apic::current_id()
    }

    fn relax(&self) {
        core::hint::spin_loop();
    }

    fn halt(&self) {
        x86_64::instructions::hlt();
    }

    fn broadcast_reschedule(&self) {
        if apic::is_enabled() {
            apic::broadcast_ipi(InterruptIndex::Reschedule.as_u8(), apic::Destination::AllIncludingSelf);
        } else {
            // Uniprocessor: the only processor to preempt is ourselves.
            self.reschedule_self();
        }
    }

    fn reschedule_self(&self) {
        unsafe { asm!("int {vector}", vector = const InterruptIndex::Yield as u8) };
    }

    fn without_interrupts<R, F: FnOnce() -> R>(&self, f: F) -> R {
        x86_64::instructions::interrupts::without_interrupts(f)
    }
}

pub fn halt_forever() -> ! {
    loop {
        x86_64::instructions::interrupts::disable();
        x86_64::instructions::hlt();
    }
}

pub fn outb(port: u16, value: u8) {
    unsafe { asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags)) };
}

pub fn inb(port: u16) -> u8 {
    let value: u8;
    unsafe { asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags)) };
    value
}

// Polled COM1 output without locks, for panics and exceptions.
pub fn serial_write_byte(byte: u8) {
    // Wait for transmit buffer to be empty (bit 5 of line status)
    for _ in 0..10000 {
        if (inb(0x3F8 + 5) & 0x20) != 0 {
            break;
        }
    }
    outb(0x3F8, byte);
}

pub fn serial_write_str(s: &str) {
    for &b in s.as_bytes() {
        if b == b'\n' {
            serial_write_byte(b'\r');
        }
        serial_write_byte(b);
    }
}

/// `core::fmt::Write` adapter over [`serial_write_str`].
pub struct RawSerial;

impl core::fmt::Write for RawSerial {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        serial_write_str(s);
        Ok(())
    }
}
