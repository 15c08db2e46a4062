//! Kernel heap (similar to Linux kmalloc/kfree)
//!
//! A linked-list allocator over a static region in the kernel image. Thread
//! stacks and records, per-processor tables and the scheduler registry all
//! come from here.
//!
//! The heap lock is only ever held with interrupts masked, so a tick can
//! never switch away from a thread in the middle of an allocation.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, addr_of_mut, NonNull};

use linked_list_allocator::Heap;
use spin::Mutex;
use x86_64::instructions::interrupts;

use crate::config::KernelConfig;

const HEAP_SIZE: usize = KernelConfig::new().heap_size;

#[repr(C, align(4096))]
struct HeapSpace {
    data: [u8; HEAP_SIZE],
}

static mut HEAP_SPACE: HeapSpace = HeapSpace { data: [0; HEAP_SIZE] };

/// [`Heap`] behind a spin lock taken with interrupts masked.
pub struct KernelHeap(Mutex<Heap>);

impl KernelHeap {
    pub const fn empty() -> Self {
        KernelHeap(Mutex::new(Heap::empty()))
    }

    fn with<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        interrupts::without_interrupts(|| f(&mut self.0.lock()))
    }
}

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.with(|heap| {
            heap.allocate_first_fit(layout)
                .map_or(ptr::null_mut(), NonNull::as_ptr)
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            self.with(|heap| heap.deallocate(ptr, layout));
        }
    }
}

#[global_allocator]
static ALLOCATOR: KernelHeap = KernelHeap::empty();

/// Hand the heap region to the allocator. Bootstrap processor only, once.
pub fn init() {
    ALLOCATOR.with(|heap| unsafe {
        let heap_bottom = addr_of_mut!(HEAP_SPACE.data) as *mut u8;
        heap.init(heap_bottom, HEAP_SIZE);
    });
}

/// Bytes currently free.
pub fn free() -> usize {
    ALLOCATOR.with(|heap| heap.free())
}
