//! Saved register frame

/// Register state of an interrupted thread.
///
/// The dispatch stubs push `rax` through `r15` on top of the frame the CPU
/// pushes on interrupt entry, then hand the stack pointer to the scheduler.
/// Field order therefore runs from the lowest address (last register pushed)
/// to the highest (the hardware `ss`), and the layout must not change without
/// changing the stubs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    // Pushed by the CPU
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl SavedContext {
    /// Size of the frame in bytes.
    pub const SIZE: usize = core::mem::size_of::<SavedContext>();

    /// An all-zero frame.
    pub const fn empty() -> Self {
        SavedContext {
            r15: 0, r14: 0, r13: 0, r12: 0,
            r11: 0, r10: 0, r9: 0, r8: 0,
            rbp: 0, rdi: 0, rsi: 0, rdx: 0,
            rcx: 0, rbx: 0, rax: 0,
            rip: 0, cs: 0, rflags: 0,
            rsp: 0, ss: 0,
        }
    }
}
