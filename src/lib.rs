//! Round-robin SMP kernel scheduler
//!
//! The scheduler core (`task`, `sync`, `config`, `error`) is portable and is
//! tested on the host. Everything that touches hardware is only built for the
//! bare-metal kernel image.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod error;
pub mod sync;
pub mod task;

#[cfg(target_os = "none")]
pub mod boot;
#[cfg(target_os = "none")]
pub mod drivers;
#[cfg(target_os = "none")]
pub mod gdt;
#[cfg(target_os = "none")]
pub mod interrupts;
#[cfg(target_os = "none")]
pub mod logger;
#[cfg(target_os = "none")]
pub mod mm;
