// Shared error type for fallible kernel operations

use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A thread stack or registry bucket could not be allocated.
    OutOfMemory,
    /// The processor id has no per-processor scheduler slot.
    InvalidProcessor(usize),
    /// The bootstrap processor already initialized the scheduler.
    AlreadyInitialized,
    /// The bootstrap processor has not initialized the scheduler yet.
    NotInitialized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => f.write_str("out of memory while allocating a thread"),
            Error::InvalidProcessor(cpu) => write!(f, "no scheduler slot for processor {}", cpu),
            Error::AlreadyInitialized => f.write_str("scheduler already initialized"),
            Error::NotInitialized => f.write_str("scheduler not initialized by the bootstrap processor"),
        }
    }
}
