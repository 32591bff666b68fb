//! Scoped payload channel guards.
//!
//! `PayloadChannel` owns a created segment and destroys it on drop.
//! `Mapping` owns an attachment and detaches it on drop. Every exit path
//! of a call, including timeouts, bus errors and panics in a handler,
//! therefore releases what it acquired.
//!
//! ```text
//! client                                  server
//! ──────                                  ──────
//! PayloadChannel::create(key, n)
//!   └ map() → Mapping  (copy args in)
//!        send envelope ───────────────►  Mapping::open(key, n)
//!                                          handler(&mut mapping)
//!                                        drop(Mapping)  → detach
//!        ◄─────────────────────── reply
//!   copy back (restore)
//! drop(Mapping)        → detach
//! drop(PayloadChannel) → destroy
//! ```

use std::ops::{Deref, DerefMut};

use crate::error::{ShmError, ShmResult};
use crate::kwarn;
use crate::shm::{Region, SegmentHandle, ShareKey, SharedMemory};

/// A created segment, destroyed on drop.
pub struct PayloadChannel<'a> {
    shm: &'a dyn SharedMemory,
    key: ShareKey,
    handle: SegmentHandle,
    size: usize,
}

impl<'a> PayloadChannel<'a> {
    /// Create a segment for `size` payload bytes.
    ///
    /// Zero-sized payloads still get a one-byte segment so every call has
    /// a real key on the server side.
    pub fn create(shm: &'a dyn SharedMemory, key: ShareKey, size: usize) -> ShmResult<Self> {
        let handle = shm.create(&key, size.max(1))?;
        Ok(Self {
            shm,
            key,
            handle,
            size,
        })
    }

    pub fn key(&self) -> &ShareKey {
        &self.key
    }

    pub fn handle(&self) -> SegmentHandle {
        self.handle
    }

    /// Payload size in bytes (the `ShareSize` of the envelope).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Attach the segment into this process.
    pub fn map(&self) -> ShmResult<Mapping<'a>> {
        Mapping::attach(self.shm, &self.key, self.handle, self.size)
    }
}

impl Drop for PayloadChannel<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.shm.destroy(self.handle) {
            kwarn!("destroy of segment {} failed: {}", self.key, e);
        }
    }
}

/// An attached segment, detached on drop. Derefs to the payload bytes.
pub struct Mapping<'a> {
    shm: &'a dyn SharedMemory,
    region: Option<Region>,
    len: usize,
}

impl<'a> Mapping<'a> {
    /// Open an existing segment by key and attach it (server side).
    pub fn open(shm: &'a dyn SharedMemory, key: &ShareKey, size: usize) -> ShmResult<Self> {
        let handle = shm.open(key, size)?;
        Self::attach(shm, key, handle, size)
    }

    fn attach(
        shm: &'a dyn SharedMemory,
        key: &ShareKey,
        handle: SegmentHandle,
        len: usize,
    ) -> ShmResult<Self> {
        let region = shm.attach(handle)?;
        if region.len() < len {
            let actual = region.len();
            shm.detach(region)?;
            return Err(ShmError::SizeMismatch {
                key: key.clone(),
                expected: len,
                actual,
            });
        }
        Ok(Self {
            shm,
            region: Some(region),
            len,
        })
    }
}

impl Deref for Mapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.region {
            // Safety: the region is attached and at least `len` bytes long.
            Some(region) => unsafe { std::slice::from_raw_parts(region.as_ptr(), self.len) },
            None => &[],
        }
    }
}

impl DerefMut for Mapping<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &self.region {
            // Safety: as above; `&mut self` makes this the only live view.
            Some(region) => unsafe { std::slice::from_raw_parts_mut(region.as_ptr(), self.len) },
            None => &mut [],
        }
    }
}

impl Drop for Mapping<'_> {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            if let Err(e) = self.shm.detach(region) {
                kwarn!("detach failed: {}", e);
            }
        }
    }
}
