//! Limine boot protocol definitions and requests
//!
//! The bootloader scans the kernel binary for these request structures and
//! responds by filling in the response pointers. Responses are read with
//! volatile loads: nothing on the Rust side ever writes them.

use core::ptr::{self, addr_of};
use core::sync::atomic::{AtomicU64, Ordering};

/// Magic numbers used by Limine to identify requests
const LIMINE_COMMON_MAGIC: [u64; 2] = [0xc7b1dd30df4c8b88, 0x0a82e883a194f07b];

/// Request markers - bootloader scans between these
#[used]
#[link_section = ".limine_requests_start"]
static LIMINE_REQUESTS_START: [u64; 4] = [
    0xf6b8f4b39de7d1ae,
    0xfab91a6940fcb9cf,
    0x785c6ed015d3e316,
    0x181e920a7852b9d9,
];

#[used]
#[link_section = ".limine_requests_end"]
static LIMINE_REQUESTS_END: [u64; 2] = [0xadc0e0531bb10d03, 0x9572709f31764c62];

/// Base revision tag - bootloader sets third value to 0 if supported
/// Format: [magic1, magic2, revision]
#[used]
#[link_section = ".limine_requests"]
static mut BASE_REVISION: [u64; 3] = [
    0xf9562b2d5c95a6c8,
    0x6a7b384944536bdc,
    2, // Request revision 2 - will be set to 0 by bootloader if supported
];

/// Check if the base revision was accepted by the bootloader
pub fn base_revision_supported() -> bool {
    unsafe { ptr::read_volatile(addr_of!(BASE_REVISION[2])) == 0 }
}

// ============================================================================
// SMP Request
// ============================================================================

/// Ask the bootloader to switch every processor to x2APIC mode.
pub const SMP_X2APIC: u64 = 1 << 0;

/// Entry point of an application processor.
pub type ApEntry = extern "C" fn(info: *const SmpInfo) -> !;

#[repr(C)]
pub struct SmpInfo {
    pub processor_id: u32,
    pub lapic_id: u32,
    pub reserved: u64,
    /// Writing an address here releases the processor, which jumps to it
    /// with this structure as its only argument.
    pub goto_address: AtomicU64,
    pub extra_argument: u64,
}

#[repr(C)]
pub struct SmpResponse {
    pub revision: u64,
    /// Bit 0 set if x2APIC mode was enabled.
    pub flags: u32,
    pub bsp_lapic_id: u32,
    pub cpu_count: u64,
    pub cpus: *mut *mut SmpInfo,
}

#[repr(C)]
pub struct SmpRequest {
    pub id: [u64; 4],
    pub revision: u64,
    pub response: *mut SmpResponse,
    pub flags: u64,
}

unsafe impl Sync for SmpRequest {}

#[used]
#[link_section = ".limine_requests"]
static mut SMP_REQUEST: SmpRequest = SmpRequest {
    id: [
        LIMINE_COMMON_MAGIC[0],
        LIMINE_COMMON_MAGIC[1],
        0x95a67b819a1b857e,
        0xa0b61b723b6a73e0,
    ],
    revision: 0,
    response: ptr::null_mut(),
    flags: SMP_X2APIC,
};

fn smp_response() -> Option<&'static SmpResponse> {
    unsafe {
        let response = ptr::read_volatile(addr_of!(SMP_REQUEST.response));
        response.as_ref()
    }
}

fn smp_cpus() -> impl Iterator<Item = &'static SmpInfo> {
    let (cpus, count) = match smp_response() {
        Some(resp) if !resp.cpus.is_null() => (resp.cpus, resp.cpu_count as usize),
        _ => (ptr::null_mut(), 0),
    };
    (0..count).filter_map(move |i| unsafe { (*cpus.add(i)).as_ref() })
}

/// Whether the bootloader put the processors in x2APIC mode.
pub fn x2apic_enabled() -> bool {
    smp_response().map_or(false, |resp| resp.flags & 1 != 0)
}

/// Number of processors reported by the bootloader, at least one.
pub fn cpu_count() -> usize {
    smp_response().map_or(1, |resp| (resp.cpu_count as usize).max(1))
}

/// Per-processor slots needed to index by Local APIC id.
pub fn cpu_slots() -> usize {
    smp_cpus().map(|cpu| cpu.lapic_id as usize + 1).max().unwrap_or(1)
}

/// Local APIC id of the first application processor, if there is one.
pub fn first_application_processor() -> Option<usize> {
    let bsp = smp_response()?.bsp_lapic_id;
    smp_cpus()
        .map(|cpu| cpu.lapic_id)
        .filter(|&id| id != bsp)
        .min()
        .map(|id| id as usize)
}

/// Release every application processor into `entry`.
///
/// Returns how many processors were started.
pub fn start_application_processors(entry: ApEntry) -> usize {
    let Some(resp) = smp_response() else {
        return 0;
    };

    let mut started = 0;
    for cpu in smp_cpus() {
        if cpu.lapic_id == resp.bsp_lapic_id {
            continue;
        }
        cpu.goto_address.store(entry as usize as u64, Ordering::SeqCst);
        started += 1;
    }
    started
}
