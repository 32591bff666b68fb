//! # cfipc-core — Trait definitions for cfipc
//!
//! cfipc lets a client process call a named function that lives in a
//! server process. The argument block travels through a shared-memory
//! segment (the data plane); a message bus carries only a small JSON
//! envelope describing the call (the control plane).
//!
//! This crate holds everything both sides agree on:
//!
//! - `shm` - the `SharedMemory` contract (create/open/attach/detach/destroy)
//! - `payload` - scoped guards that pair create/destroy and attach/detach
//! - `bus` - the `BusConnection` contract for the control plane
//! - `envelope` - `CallEnvelope` / `ReplyEnvelope` and their lenient codec
//! - `config` - `IpcConfig`, the per-process bus/share identity
//! - `status` - integer statuses returned across the call boundary
//! - `error` - error enums for every layer
//! - `kprint` - leveled stderr logging macros
//! - `env` - environment variable helpers
//!
//! Default implementations of the traits live in `cfipc-module`.

pub mod bus;
pub mod config;
pub mod env;
pub mod envelope;
pub mod error;
pub mod kprint;
pub mod payload;
pub mod shm;
pub mod status;

pub use bus::{BusConnection, FilterResult, MatchRule, MethodCall, SignalMessage};
pub use config::IpcConfig;
pub use envelope::{CallEnvelope, ReplyEnvelope};
pub use error::{BusError, BusResult, CallError, ConfigError, ShmError, ShmResult, StartError};
pub use payload::{Mapping, PayloadChannel};
pub use shm::{Region, SegmentHandle, ShareKey, SharedMemory};
pub use status::Status;
