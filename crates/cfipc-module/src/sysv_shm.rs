//! `SysvSharedMemory` — default `SharedMemory` implementation.
//!
//! System V segments keyed by `ftok(path, id)`:
//!
//! | op      | call                                        |
//! |---------|---------------------------------------------|
//! | create  | `shmget(key, size, IPC_CREAT|IPC_EXCL|mode)` |
//! | open    | `shmget(key, 0, mode)` + `IPC_STAT` size check |
//! | attach  | `shmat(shmid, NULL, 0)`                     |
//! | detach  | `shmdt(addr)`                               |
//! | destroy | `shmctl(shmid, IPC_RMID)`                   |
//!
//! `path` must name an existing file; `ftok` folds its inode and the low
//! eight bits of `id` into the key, so ids 1 and 257 collide on the same
//! path. Clients with more than 255 calls in flight need distinct paths.
//!
//! Every client numbers its calls from 1, so two client processes sharing
//! a `share_path` pick the same keys. The second `create` fails with
//! `AlreadyExists` and that call returns `STATUS_RESOURCE_FAILURE`; give
//! each client process its own path.

use std::ffi::CString;

use cfipc_core::error::{ShmError, ShmResult};
use cfipc_core::shm::{Region, SegmentHandle, ShareKey, SharedMemory};
use cfipc_core::ktrace;
use nix::errno::Errno;

/// Permission bits for created and opened segments.
const DEFAULT_MODE: libc::c_int = 0o666;

pub struct SysvSharedMemory {
    mode: libc::c_int,
}

impl Default for SysvSharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SysvSharedMemory {
    pub fn new() -> Self {
        Self { mode: DEFAULT_MODE }
    }

    /// Use `mode` (low nine permission bits) instead of 0666.
    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode: (mode & 0o777) as libc::c_int,
        }
    }

    fn ipc_key(key: &ShareKey) -> ShmResult<libc::key_t> {
        let path = CString::new(key.path.as_str()).map_err(|_| ShmError::InvalidKey(key.clone()))?;
        let k = unsafe { libc::ftok(path.as_ptr(), key.id) };
        if k == -1 {
            return Err(os_error("ftok"));
        }
        Ok(k)
    }

    fn segment_size(shmid: libc::c_int) -> ShmResult<usize> {
        let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::shmctl(shmid, libc::IPC_STAT, &mut ds) };
        if ret == -1 {
            return Err(os_error("shmctl(IPC_STAT)"));
        }
        Ok(ds.shm_segsz as usize)
    }
}

fn os_error(op: &'static str) -> ShmError {
    ShmError::Os {
        op,
        errno: Errno::last() as i32,
    }
}

impl SharedMemory for SysvSharedMemory {
    fn create(&self, key: &ShareKey, size: usize) -> ShmResult<SegmentHandle> {
        let k = Self::ipc_key(key)?;
        let shmid = unsafe {
            libc::shmget(k, size, libc::IPC_CREAT | libc::IPC_EXCL | self.mode)
        };
        if shmid == -1 {
            return match Errno::last() {
                Errno::EEXIST => Err(ShmError::AlreadyExists(key.clone())),
                errno => Err(ShmError::Os {
                    op: "shmget",
                    errno: errno as i32,
                }),
            };
        }
        ktrace!("created segment {} shmid={} size={}", key, shmid, size);
        Ok(SegmentHandle(shmid))
    }

    fn open(&self, key: &ShareKey, size: usize) -> ShmResult<SegmentHandle> {
        let k = Self::ipc_key(key)?;
        let shmid = unsafe { libc::shmget(k, 0, self.mode) };
        if shmid == -1 {
            return match Errno::last() {
                Errno::ENOENT => Err(ShmError::NotFound(key.clone())),
                errno => Err(ShmError::Os {
                    op: "shmget",
                    errno: errno as i32,
                }),
            };
        }
        let actual = Self::segment_size(shmid)?;
        if actual < size {
            return Err(ShmError::SizeMismatch {
                key: key.clone(),
                expected: size,
                actual,
            });
        }
        Ok(SegmentHandle(shmid))
    }

    fn attach(&self, handle: SegmentHandle) -> ShmResult<Region> {
        let len = Self::segment_size(handle.0)?;
        let addr = unsafe { libc::shmat(handle.0, std::ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(os_error("shmat"));
        }
        // Safety: shmat mapped `len` bytes at `addr` read-write.
        unsafe { Region::from_raw(addr as *mut u8, len) }.ok_or(ShmError::UnknownHandle(handle.0))
    }

    fn detach(&self, region: Region) -> ShmResult<()> {
        let ret = unsafe { libc::shmdt(region.as_ptr() as *const libc::c_void) };
        if ret == -1 {
            return Err(os_error("shmdt"));
        }
        Ok(())
    }

    fn destroy(&self, handle: SegmentHandle) -> ShmResult<()> {
        let ret = unsafe { libc::shmctl(handle.0, libc::IPC_RMID, std::ptr::null_mut()) };
        if ret == -1 {
            return match Errno::last() {
                Errno::EINVAL | Errno::EIDRM => Err(ShmError::UnknownHandle(handle.0)),
                errno => Err(ShmError::Os {
                    op: "shmctl(IPC_RMID)",
                    errno: errno as i32,
                }),
            };
        }
        Ok(())
    }
}
