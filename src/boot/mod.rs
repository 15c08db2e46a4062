//! Boot protocol support: base revision and SMP bring-up through Limine

pub mod limine;
