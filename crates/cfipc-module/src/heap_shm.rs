//! `HeapSharedMemory` — process-local `SharedMemory` implementation.
//!
//! Segments are heap buffers in a table keyed by `ShareKey`. A client
//! and a server sharing one `Arc<HeapSharedMemory>` see the same bytes,
//! which is all the call protocol needs when both ends live in one
//! process. Failure semantics follow System V: duplicate keys are
//! rejected, and destroying an attached segment frees it at the last
//! detach.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use cfipc_core::error::{ShmError, ShmResult};
use cfipc_core::shm::{Region, SegmentHandle, ShareKey, SharedMemory};

struct Segment {
    key: ShareKey,
    data: NonNull<[u8]>,
    /// Requested size; the allocation is at least one byte so every
    /// segment has a distinct base address.
    len: usize,
    attached: usize,
    /// Destroyed while attached; freed at the last detach.
    removed: bool,
}

// Safety: `data` is an owned heap allocation, only reached through the
// table lock or through regions handed out by `attach`.
unsafe impl Send for Segment {}

impl Segment {
    fn base(&self) -> *mut u8 {
        self.data.as_ptr() as *mut u8
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // Safety: `data` came from Box::leak in `create` and is freed once.
        drop(unsafe { Box::from_raw(self.data.as_ptr()) });
    }
}

#[derive(Default)]
struct Table {
    next_handle: i32,
    by_key: HashMap<ShareKey, SegmentHandle>,
    segments: HashMap<SegmentHandle, Segment>,
}

#[derive(Default)]
pub struct HeapSharedMemory {
    table: Mutex<Table>,
}

impl HeapSharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Segments not yet freed, including destroyed-but-attached ones.
    pub fn live_segments(&self) -> usize {
        self.table().segments.len()
    }

    /// Outstanding attachments over all segments.
    pub fn attached_count(&self) -> usize {
        self.table().segments.values().map(|s| s.attached).sum()
    }

    /// Whether a segment is currently reachable under `key`.
    pub fn contains(&self, key: &ShareKey) -> bool {
        self.table().by_key.contains_key(key)
    }
}

impl SharedMemory for HeapSharedMemory {
    fn create(&self, key: &ShareKey, size: usize) -> ShmResult<SegmentHandle> {
        let mut table = self.table();
        if table.by_key.contains_key(key) {
            return Err(ShmError::AlreadyExists(key.clone()));
        }
        table.next_handle += 1;
        let handle = SegmentHandle(table.next_handle);
        let data = NonNull::from(Box::leak(vec![0u8; size.max(1)].into_boxed_slice()));
        table.by_key.insert(key.clone(), handle);
        table.segments.insert(
            handle,
            Segment {
                key: key.clone(),
                data,
                len: size,
                attached: 0,
                removed: false,
            },
        );
        Ok(handle)
    }

    fn open(&self, key: &ShareKey, size: usize) -> ShmResult<SegmentHandle> {
        let table = self.table();
        let handle = *table
            .by_key
            .get(key)
            .ok_or_else(|| ShmError::NotFound(key.clone()))?;
        let actual = table.segments.get(&handle).map_or(0, Segment::len);
        if actual < size {
            return Err(ShmError::SizeMismatch {
                key: key.clone(),
                expected: size,
                actual,
            });
        }
        Ok(handle)
    }

    fn attach(&self, handle: SegmentHandle) -> ShmResult<Region> {
        let mut table = self.table();
        let seg = table
            .segments
            .get_mut(&handle)
            .filter(|s| !s.removed)
            .ok_or(ShmError::UnknownHandle(handle.0))?;
        seg.attached += 1;
        // Safety: the buffer lives until the last detach after removal.
        unsafe { Region::from_raw(seg.base(), seg.len()) }.ok_or(ShmError::UnknownHandle(handle.0))
    }

    fn detach(&self, region: Region) -> ShmResult<()> {
        let mut table = self.table();
        let handle = table
            .segments
            .iter()
            .find(|(_, s)| s.attached > 0 && s.base() == region.as_ptr())
            .map(|(h, _)| *h)
            .ok_or(ShmError::UnknownHandle(-1))?;
        let free = match table.segments.get_mut(&handle) {
            Some(seg) => {
                seg.attached -= 1;
                seg.removed && seg.attached == 0
            }
            None => false,
        };
        if free {
            table.segments.remove(&handle);
        }
        Ok(())
    }

    fn destroy(&self, handle: SegmentHandle) -> ShmResult<()> {
        let mut table = self.table();
        let (key, attached) = match table.segments.get_mut(&handle) {
            Some(seg) if !seg.removed => {
                seg.removed = true;
                (seg.key.clone(), seg.attached)
            }
            _ => return Err(ShmError::UnknownHandle(handle.0)),
        };
        table.by_key.remove(&key);
        if attached == 0 {
            table.segments.remove(&handle);
        }
        Ok(())
    }
}
