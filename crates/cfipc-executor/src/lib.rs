//! # cfipc-executor — The server side
//!
//! A server owns a fixed table of named functions and exports one bus
//! method, `callfun`. Every call runs through this path on the bus
//! dispatch thread:
//!
//! ```text
//! callfun(text)
//!     1. Decode CallEnvelope leniently (missing fields → defaults)
//!     2. For each table entry named FunName, in registration order:
//!          open + attach the payload by (SharePath, ShareId, ShareSize)
//!          handler(&mut payload)
//!          detach
//!     3. Build ReplyEnvelope per ReplyPolicy
//!     4. Encode the reply text
//! ```
//!
//! The dispatcher is generic over `SharedMemory` and the server over
//! `BusConnection`; swapping either implementation leaves this crate
//! unchanged.

pub mod dispatcher;
pub mod registry;
pub mod server;

pub use dispatcher::{Dispatcher, ReplyPolicy, ServerConfig, ServerStats};
pub use registry::{FunctionDescriptor, FunctionHandler, FunctionRegistry, FunctionRegistryBuilder};
pub use server::Server;
