//! Synchronous call bridge.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use cfipc_core::bus::{BusConnection, MethodCall, CALLFUN_METHOD};
use cfipc_core::config::IpcConfig;
use cfipc_core::envelope::{self, CallEnvelope, ReplyEnvelope};
use cfipc_core::error::{CallError, ConfigError};
use cfipc_core::payload::PayloadChannel;
use cfipc_core::shm::{ShareKey, SharedMemory};
use cfipc_core::status::Status;
use cfipc_core::{kdebug, kwarn};

use crate::pending::PendingCall;

/// Calls functions on the server named by `IpcConfig::bus_name`.
///
/// `Client` is `Sync`: any number of threads may call through one
/// instance, each blocking only itself. Calling from a bus handler or
/// filter deadlocks a single-threaded bus until the timeout.
pub struct Client {
    config: IpcConfig,
    bus: Arc<dyn BusConnection>,
    shm: Arc<dyn SharedMemory>,
    next_id: AtomicI32,
}

impl Client {
    pub fn new(
        config: IpcConfig,
        bus: Arc<dyn BusConnection>,
        shm: Arc<dyn SharedMemory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            bus,
            shm,
            next_id: AtomicI32::new(1),
        })
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    /// Fresh payload key under the configured share path. Ids start at 1
    /// and wrap back to 1 after `i32::MAX`.
    pub fn next_share_key(&self) -> ShareKey {
        let id = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id == i32::MAX { 1 } else { id + 1 })
            })
            .unwrap_or_else(|id| id);
        ShareKey::new(self.config.share_path.clone(), id)
    }

    /// Call `function_name` with `payload` as its argument block.
    ///
    /// Returns the server's `Return` status, or a negative sentinel when
    /// the call could not complete: `STATUS_RESOURCE_FAILURE` if the
    /// payload channel could not be set up, `STATUS_TRANSPORT_FAILURE`
    /// for bus errors, timeouts and malformed replies. With `restore`
    /// the server's view of the payload is copied back into `payload`
    /// once a reply arrived.
    pub fn call(&self, function_name: &str, payload: &mut [u8], restore: bool) -> Status {
        match self.try_call(function_name, payload, restore) {
            Ok(status) => status,
            Err(e) => {
                kwarn!("call {} failed: {}", function_name, e);
                e.status()
            }
        }
    }

    /// `call` with the failure reason instead of a sentinel.
    pub fn try_call(
        &self,
        function_name: &str,
        payload: &mut [u8],
        restore: bool,
    ) -> Result<Status, CallError> {
        let key = self.next_share_key();
        let channel = PayloadChannel::create(&*self.shm, key.clone(), payload.len())?;
        let mut shared = channel.map()?;
        shared.copy_from_slice(payload);

        let body = CallEnvelope::new(function_name, key, payload.len()).encode()?;
        kdebug!("callfun {} -> {}", body, self.config.bus_name);

        let pending = PendingCall::shared();
        self.bus.call_async(
            MethodCall {
                destination: self.config.bus_name.clone(),
                path: self.config.object_path.clone(),
                interface: self.config.interface.clone(),
                method: CALLFUN_METHOD.to_string(),
                body,
            },
            self.config.call_timeout,
            pending.notifier(),
        )?;
        let reply = pending.wait(self.config.call_timeout)?;

        if !envelope::is_object(&reply) {
            return Err(CallError::MalformedReply(reply));
        }
        let status = ReplyEnvelope::decode(&reply).status;
        if restore {
            payload.copy_from_slice(&shared);
        }
        kdebug!("{} returned {}", function_name, status);
        Ok(status)
    }
}
