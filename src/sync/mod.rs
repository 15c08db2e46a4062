//! Cross-processor synchronization

pub mod cpu_lock;

pub use cpu_lock::CpuLock;
