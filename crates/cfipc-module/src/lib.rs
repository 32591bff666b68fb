//! # cfipc-module — Default implementations
//!
//! One implementation per cfipc-core trait, plus a process-local
//! alternative for single-process setups and tests.
//!
//! | Trait           | Default Impl        | Alternative          |
//! |-----------------|---------------------|----------------------|
//! | SharedMemory    | SysvSharedMemory    | HeapSharedMemory     |
//! | BusConnection   | LocalConnection     | system bus binding   |
//!
//! `default_shared_memory()` picks System V on Linux and the heap table
//! elsewhere.

use std::sync::Arc;

use cfipc_core::shm::SharedMemory;

pub mod heap_shm;
pub mod local_bus;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod sysv_shm;
        pub use sysv_shm::SysvSharedMemory;

        /// Cross-process System V segments.
        pub fn default_shared_memory() -> Arc<dyn SharedMemory> {
            Arc::new(SysvSharedMemory::new())
        }
    } else {
        /// No System V support wired up on this platform; segments are
        /// process-local.
        pub fn default_shared_memory() -> Arc<dyn SharedMemory> {
            Arc::new(HeapSharedMemory::new())
        }
    }
}

pub use heap_shm::HeapSharedMemory;
pub use local_bus::{LocalBus, LocalBusConfig, LocalConnection};
