//! Shared memory abstraction (the data plane).
//!
//! A `SharedMemory` provider manages segments identified by a
//! `ShareKey`: a path-like string plus a small integer id. The client
//! creates a segment per call, the server opens and attaches it for the
//! duration of one dispatch.
//!
//! # Implementors
//!
//! - `SysvSharedMemory` (default on Linux): System V segments keyed by
//!   `ftok(path, id)`. Works across processes.
//!
//! - `HeapSharedMemory`: process-local segments in a keyed table. For a
//!   client and server living in the same process, and for tests.
//!
//! Callers should not pair the raw calls by hand; `payload::PayloadChannel`
//! and `payload::Mapping` release on every exit path.

use std::fmt;
use std::ptr::NonNull;

use serde::Serialize;

use crate::error::ShmResult;

/// Key of one payload channel.
///
/// Unique among the outstanding calls of one client; the id comes from
/// the client's call counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ShareKey {
    #[serde(rename = "SharePath")]
    pub path: String,
    #[serde(rename = "ShareId")]
    pub id: i32,
}

impl ShareKey {
    pub fn new(path: impl Into<String>, id: i32) -> Self {
        Self {
            path: path.into(),
            id,
        }
    }
}

impl fmt::Display for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.id)
    }
}

/// Provider-specific segment identifier (a shmid for System V).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentHandle(pub i32);

impl fmt::Display for SegmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An attached segment: base address and mapped length.
///
/// Must be handed back to the provider's `detach`.
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: a Region is a plain address range; access is synchronized by
// the call protocol (one client and one dispatching handler, never
// concurrently).
unsafe impl Send for Region {}

impl Region {
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// region is detached.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Keyed shared segments.
///
/// **Contract:**
/// - All calls are synchronous and never block beyond the OS call.
/// - `create` fails with `AlreadyExists` if the key is live.
/// - `open` fails with `NotFound` for unknown keys and `SizeMismatch`
///   when the segment is smaller than `size`.
/// - `destroy` while still attached removes the key immediately; the
///   memory is released at the last `detach`.
pub trait SharedMemory: Send + Sync {
    /// Create a fresh segment of at least `size` bytes.
    fn create(&self, key: &ShareKey, size: usize) -> ShmResult<SegmentHandle>;

    /// Look up an existing segment holding at least `size` bytes.
    fn open(&self, key: &ShareKey, size: usize) -> ShmResult<SegmentHandle>;

    /// Map the segment into this process.
    fn attach(&self, handle: SegmentHandle) -> ShmResult<Region>;

    /// Unmap a region returned by `attach`.
    fn detach(&self, region: Region) -> ShmResult<()>;

    /// Remove the segment.
    fn destroy(&self, handle: SegmentHandle) -> ShmResult<()>;
}
