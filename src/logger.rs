//! `log` backend writing to the serial port

use log::{Level, LevelFilter, Metadata, Record};

use crate::arch::x86_64::apic;

/// Logger that writes `[LEVEL] cpuN: message` lines to COM1
struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level_str = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        crate::serial_println!("[{}] cpu{}: {}", level_str, apic::current_id(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Install the serial logger. Call once, after the serial port is up.
pub fn init(level: LevelFilter) {
    match log::set_logger(&LOGGER) {
        Ok(()) => log::set_max_level(level),
        Err(_) => crate::drivers::serial::write("[LOGGER] logger already installed\n"),
    }
}
