//! # cfipc-bridge — Blocking calls over an asynchronous bus
//!
//! The bus only offers "send, and be notified later". This crate turns
//! that into an ordinary blocking function call for client code:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  caller thread                                        │
//! │    client.call("set_color", &mut buf, true)           │
//! └──────────────────┬────────────────────────────────────┘
//!                    │ create payload, copy buf in,
//!                    │ call_async(callfun, notify)
//!                    ▼
//! ┌───────────────────────────────────────────────────────┐
//! │  PendingCall   Mutex<slot> + Condvar                  │
//! │    caller: wait_timeout  ◄──── bus: notify(reply)     │
//! └──────────────────┬────────────────────────────────────┘
//!                    │ decode Return, copy payload back,
//!                    ▼ destroy payload
//!               status: i32
//! ```
//!
//! Every call owns its `PendingCall`, so concurrent callers in one
//! process never share a wait context. No thread is spawned per call.
//!
//! `SignalRegistry` covers the other direction: `callback` signals from
//! the server dispatched to subscribed closures.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cfipc_bridge::Client;
//! use cfipc_core::IpcConfig;
//! use cfipc_module::{default_shared_memory, LocalBus, LocalBusConfig};
//!
//! let bus = LocalBus::start(LocalBusConfig::default())?;
//! let client = Client::new(IpcConfig::from_env(), bus.connect(), default_shared_memory())?;
//!
//! let mut rgb = [255u8, 128, 0];
//! let status = client.call("set_color", &mut rgb, true);
//! ```

pub mod client;
pub mod pending;
pub mod signal;

pub use client::Client;
pub use pending::PendingCall;
pub use signal::{SignalCallback, SignalRegistry};
