//! Serial Port (COM1) driver
//!
//! Every write runs with interrupts masked: a tick landing while this
//! processor holds the port lock would otherwise switch away from the holder
//! and leave the lock taken.

use core::fmt::{self, Write};
use spin::{Lazy, Mutex};
use uart_16550::SerialPort;

const SERIAL_PORT: u16 = 0x3F8; // COM1

/// Global serial port instance, programmed on first use
static SERIAL: Lazy<Mutex<SerialPort>> = Lazy::new(|| {
    let mut port = unsafe { SerialPort::new(SERIAL_PORT) };
    port.init();
    Mutex::new(port)
});

/// Initialize the serial port
pub fn init() {
    Lazy::force(&SERIAL);
}

/// Write string to serial port
pub fn write(s: &str) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        let _ = SERIAL.lock().write_str(s);
    });
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        let _ = SERIAL.lock().write_fmt(args);
    });
}

/// Write formatted string to serial port
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::drivers::serial::_print(format_args!($($arg)*))
    };
}

/// Write formatted string with newline to serial port
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}
