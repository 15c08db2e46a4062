//! Kernel threads and their scheduler
//!
//! The scheduler core is plain library code driven through the [`Cpu`]
//! trait. The kernel instance, its idle and exit trampolines and the
//! interrupt-facing entry points live in [`kernel`].
//!
//! [`Cpu`]: crate::arch::Cpu

pub mod frame;
pub mod registry;
pub mod scheduler;
pub mod thread;

#[cfg(target_os = "none")]
mod kernel;

#[cfg(test)]
pub(crate) mod testing;

pub use frame::SavedContext;
pub use scheduler::{Scheduler, Trampolines};
pub use thread::{Thread, ThreadId};

#[cfg(target_os = "none")]
pub use kernel::*;
