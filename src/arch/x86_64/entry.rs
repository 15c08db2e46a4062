//! Interrupt entry stubs that hand the scheduler a mutable register frame
//!
//! Each stub pushes the general-purpose registers on top of the frame the CPU
//! pushed, so the stack pointer then addresses a [`SavedContext`]. The Rust
//! handler may overwrite that frame; the stub pops whatever it finds there and
//! returns with `iretq`, which is how a tick switches threads.
//!
//! [`SavedContext`]: crate::task::frame::SavedContext

use core::arch::global_asm;

macro_rules! dispatch_stub {
    ($name:ident => $handler:path) => {
        global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            "push rax",
            "push rbx",
            "push rcx",
            "push rdx",
            "push rsi",
            "push rdi",
            "push rbp",
            "push r8",
            "push r9",
            "push r10",
            "push r11",
            "push r12",
            "push r13",
            "push r14",
            "push r15",
            "mov rdi, rsp",
            "cld",
            "call {handler}",
            "pop r15",
            "pop r14",
            "pop r13",
            "pop r12",
            "pop r11",
            "pop r10",
            "pop r9",
            "pop r8",
            "pop rbp",
            "pop rdi",
            "pop rsi",
            "pop rdx",
            "pop rcx",
            "pop rbx",
            "pop rax",
            "iretq",
            handler = sym $handler,
        );
    };
}

dispatch_stub!(timer_entry => crate::interrupts::timer_dispatch);
dispatch_stub!(reschedule_entry => crate::interrupts::reschedule_dispatch);
dispatch_stub!(yield_entry => crate::interrupts::yield_dispatch);

// A thread's entry function returns here through the address primed at the
// top of its stack. `ret` leaves the stack 16-byte aligned instead of
// call-aligned, so realign before entering Rust.
global_asm!(
    ".global thread_exit_entry",
    "thread_exit_entry:",
    "and rsp, -16",
    "call {exit}",
    "ud2",
    exit = sym crate::task::thread_exit,
);

extern "C" {
    pub fn timer_entry();
    pub fn reschedule_entry();
    pub fn yield_entry();
    pub fn thread_exit_entry() -> !;
}
