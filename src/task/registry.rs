//! Append-only thread registry
//!
//! Insertion order is round-robin order. Records are leaked on insertion and
//! never removed, so a `&'static Thread` handed out once stays valid for the
//! kernel lifetime.
//!
//! Slots live in buckets of doubling size, allocated on demand and never
//! moved, so the registry grows without bound while readers stay lock-free:
//! they acquire-load the length, then the bucket, then the slot. Appenders
//! serialize on a spin mutex and never allocate while holding it.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use spin::Mutex;

use super::thread::{Thread, ThreadId};
use crate::error::{Error, Result};

/// Slots in bucket 0; bucket `b` holds `FIRST_BUCKET << b`.
const FIRST_BUCKET: usize = 32;
const BUCKETS: usize = (usize::BITS - FIRST_BUCKET.trailing_zeros()) as usize;

const NO_BUCKET: AtomicPtr<AtomicPtr<Thread>> = AtomicPtr::new(ptr::null_mut());

/// Bucket, offset inside it and bucket size of slot `index`.
fn locate(index: usize) -> (usize, usize, usize) {
    let biased = index + FIRST_BUCKET;
    let high = usize::BITS - 1 - biased.leading_zeros();
    let bucket = (high - FIRST_BUCKET.trailing_zeros()) as usize;
    (bucket, biased - (1 << high), 1 << high)
}

pub struct Registry {
    buckets: [AtomicPtr<AtomicPtr<Thread>>; BUCKETS],
    len: AtomicUsize,
    append: Mutex<()>,
}

impl Registry {
    pub const fn new() -> Self {
        Registry {
            buckets: [NO_BUCKET; BUCKETS],
            len: AtomicUsize::new(0),
            append: Mutex::new(()),
        }
    }

    /// Number of published records.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots allocated so far.
    pub fn capacity(&self) -> usize {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.load(Ordering::Acquire).is_null())
            .map(|(index, _)| FIRST_BUCKET << index)
            .sum()
    }

    /// Make sure the bucket holding the next slot exists.
    ///
    /// This is the only place the registry allocates; call it with interrupts
    /// enabled.
    pub fn reserve(&self) -> Result<()> {
        let (bucket, _, size) = locate(self.len());
        let cell = &self.buckets[bucket];
        if !cell.load(Ordering::Acquire).is_null() {
            return Ok(());
        }

        let mut slots: Vec<AtomicPtr<Thread>> = Vec::new();
        slots.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        slots.resize_with(size, || AtomicPtr::new(ptr::null_mut()));
        let fresh = Box::into_raw(slots.into_boxed_slice()) as *mut AtomicPtr<Thread>;

        if cell
            .compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Safety: another appender installed this bucket first, so `fresh`
            // was never published.
            drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(fresh, size)) });
        }
        Ok(())
    }

    /// Publish `thread` in the next slot and return its id.
    ///
    /// Hands the record back if that slot's bucket is missing; the caller
    /// then [`reserve`](Registry::reserve)s and retries. Never allocates, so
    /// it can run with interrupts masked.
    pub fn push(&self, thread: Box<Thread>) -> core::result::Result<(ThreadId, &'static Thread), Box<Thread>> {
        let _guard = self.append.lock();

        let index = self.len.load(Ordering::Relaxed);
        let (bucket, offset, _) = locate(index);
        let slots = self.buckets[bucket].load(Ordering::Acquire);
        if slots.is_null() {
            return Err(thread);
        }

        let record: &'static Thread = Box::leak(thread);
        // Safety: `offset` is inside the bucket and the append lock is held.
        unsafe { (*slots.add(offset)).store(record as *const Thread as *mut Thread, Ordering::Release) };
        self.len.store(index + 1, Ordering::Release);

        Ok((ThreadId(index), record))
    }

    pub fn get(&self, id: ThreadId) -> Option<&'static Thread> {
        if id.0 >= self.len() {
            return None;
        }
        let (bucket, offset, _) = locate(id.0);
        let slots = self.buckets[bucket].load(Ordering::Acquire);
        if slots.is_null() {
            return None;
        }
        // Safety: every slot below `len` holds a leaked, never-freed record.
        unsafe { (*slots.add(offset)).load(Ordering::Acquire).as_ref() }
    }

    /// Published records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, &'static Thread)> + '_ {
        let len = self.len();
        (0..len).filter_map(move |index| self.get(ThreadId(index)).map(|t| (ThreadId(index), t)))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // Only the slot arrays go; the records they point to stay leaked.
        for (index, bucket) in self.buckets.iter_mut().enumerate() {
            let slots = *bucket.get_mut();
            if !slots.is_null() {
                let size = FIRST_BUCKET << index;
                drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(slots, size)) });
            }
        }
    }
}
