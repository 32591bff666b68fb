//! # cfipc - Synchronous remote function calls
//!
//! A client calls a function by name in a server process and blocks
//! until it returns. The argument block is passed by reference through
//! a shared-memory segment; only a small JSON envelope travels over the
//! message bus.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cfipc::{Client, FunctionRegistry, IpcConfig, LocalBus, LocalBusConfig, Server};
//!
//! let bus = LocalBus::start(LocalBusConfig::default())?;
//! let shm = cfipc::default_shared_memory();
//!
//! // Server: a fixed table of named functions.
//! let registry = FunctionRegistry::builder()
//!     .function("brighten", |rgb| {
//!         for c in rgb.iter_mut() {
//!             *c = c.saturating_add(10);
//!         }
//!         0
//!     })
//!     .build();
//! let _server = Server::start(IpcConfig::from_env(), bus.connect(), shm.clone(), registry)?;
//!
//! // Client: blocks until the server replied, then copies the payload back.
//! let client = Client::new(IpcConfig::from_env(), bus.connect(), shm)?;
//! let mut rgb = [100u8, 150, 250];
//! assert_eq!(client.call("brighten", &mut rgb, true), 0);
//! assert_eq!(rgb, [110, 160, 255]);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   callfun {FunName,SharePath,   ┌──────────────────────┐
//! │  Client              │   ShareId,ShareSize}            │  Server              │
//! │  (cfipc-bridge)      │ ──────────────────────────────► │  (cfipc-executor)    │
//! │                      │ ◄────────────────────────────── │                      │
//! │  SignalRegistry      │   {Return}      callback signal │  FunctionRegistry    │
//! └──────────┬───────────┘                                 └──────────┬───────────┘
//!            │ create / copy in / copy back / destroy                 │ open / attach / detach
//!            ▼                                                        ▼
//! ┌─────────────────────────────────────────────────────────────────────────────────┐
//! │                  shared payload segment keyed by (path, id)                     │
//! └─────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Statuses
//!
//! | Value | Meaning |
//! |-------|---------|
//! | 0     | the server processed the call |
//! | -1    | transport failure: no server, error reply, malformed reply, timeout |
//! | -2    | the payload segment could not be created or attached |
//! | -3    | no such function (`ReplyPolicy::Propagate` only) |
//!
//! Under the default `ReplyPolicy::Acknowledge` a handler's own return
//! value is not sent back, and an unknown function name also yields 0.

// Re-export core types
pub use cfipc_core::{
    BusConnection,
    BusError,
    CallEnvelope,
    CallError,
    ConfigError,
    IpcConfig,
    MatchRule,
    PayloadChannel,
    ReplyEnvelope,
    ShareKey,
    SharedMemory,
    ShmError,
    SignalMessage,
    StartError,
    Status,
};
pub use cfipc_core::status::{
    describe as describe_status,
    STATUS_NO_SUCH_FUNCTION,
    STATUS_OK,
    STATUS_RESOURCE_FAILURE,
    STATUS_TRANSPORT_FAILURE,
};

// Re-export kprint macros for logging
pub use cfipc_core::{kdebug, kerror, kinfo, ktrace, kwarn};
pub use cfipc_core::kprint::{init as init_logging, set_flush_enabled, set_log_level, LogLevel};

// Re-export env utilities
pub use cfipc_core::env::{env_get, env_get_bool, env_get_millis, env_get_str};

// Re-export default implementations
pub use cfipc_module::{default_shared_memory, HeapSharedMemory, LocalBus, LocalBusConfig, LocalConnection};
#[cfg(target_os = "linux")]
pub use cfipc_module::SysvSharedMemory;

// Re-export server and client
pub use cfipc_executor::{
    Dispatcher,
    FunctionDescriptor,
    FunctionHandler,
    FunctionRegistry,
    ReplyPolicy,
    Server,
    ServerConfig,
    ServerStats,
};
pub use cfipc_bridge::{Client, SignalCallback, SignalRegistry};

#[cfg(test)]
mod e2e;
