//! Programmable Interval Timer (PIT) driver
//! Drives the scheduler tick and timekeeping (like Linux jiffies)

use core::sync::atomic::{AtomicU64, Ordering};
use x86_64::instructions::port::Port;

use crate::config::CONFIG;

const PIT_FREQUENCY: u32 = 1193182; // Base PIT frequency

static JIFFIES: AtomicU64 = AtomicU64::new(0);

/// Program channel 0 to fire IRQ 0 at `CONFIG.timer_hz`.
pub fn init() {
    let divisor = (PIT_FREQUENCY / CONFIG.timer_hz).clamp(1, u16::MAX as u32) as u16;

    unsafe {
        // Command: Channel 0, lobyte/hibyte, square wave mode
        let mut cmd_port: Port<u8> = Port::new(0x43);
        cmd_port.write(0x36);

        // Set divisor
        let mut data_port: Port<u8> = Port::new(0x40);
        data_port.write((divisor & 0xFF) as u8);
        data_port.write((divisor >> 8) as u8);
    }
}

/// Called from timer interrupt handler
pub fn tick() {
    JIFFIES.fetch_add(1, Ordering::Relaxed);
}

/// Get current tick count (like Linux jiffies)
pub fn jiffies() -> u64 {
    JIFFIES.load(Ordering::Relaxed)
}

/// Get uptime in milliseconds
pub fn uptime_ms() -> u64 {
    jiffies() * 1000 / CONFIG.timer_hz as u64
}
