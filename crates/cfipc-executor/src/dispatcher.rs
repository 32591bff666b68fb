//! `callfun` dispatch: envelope in, handlers run on the shared payload,
//! reply out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cfipc_core::envelope::{CallEnvelope, ReplyEnvelope};
use cfipc_core::payload::Mapping;
use cfipc_core::shm::SharedMemory;
use cfipc_core::status::{self, Status, STATUS_NO_SUCH_FUNCTION, STATUS_OK, STATUS_RESOURCE_FAILURE};
use cfipc_core::{kdebug, kerror, ktrace};

use crate::registry::FunctionRegistry;

/// What `Return` carries back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyPolicy {
    /// Always `STATUS_OK` once the call was processed, whatever the
    /// handlers returned and whether any matched.
    #[default]
    Acknowledge,
    /// Status of the last handler run, or `STATUS_NO_SUCH_FUNCTION`
    /// when nothing matched.
    Propagate,
}

/// Server-side options.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub reply_policy: ReplyPolicy,
}

impl ServerConfig {
    pub fn reply_policy(mut self, policy: ReplyPolicy) -> Self {
        self.reply_policy = policy;
        self
    }
}

/// Snapshot of dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// `callfun` requests handled.
    pub calls: u64,
    /// Handler invocations (a call may run several).
    pub invocations: u64,
    /// Calls naming no registered function.
    pub misses: u64,
    /// Calls whose payload could not be attached.
    pub resource_failures: u64,
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    invocations: AtomicU64,
    misses: AtomicU64,
    resource_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ServerStats {
        ServerStats {
            calls: self.calls.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resource_failures: self.resource_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct Dispatcher {
    registry: FunctionRegistry,
    shm: Arc<dyn SharedMemory>,
    policy: ReplyPolicy,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(registry: FunctionRegistry, shm: Arc<dyn SharedMemory>, config: &ServerConfig) -> Self {
        Self {
            registry,
            shm,
            policy: config.reply_policy,
            counters: Counters::default(),
        }
    }

    /// Run every function named `call.fun_name` on the call's payload.
    ///
    /// Each handler gets its own attachment, released before the next
    /// handler runs (and during unwinding if a handler panics). An attach
    /// failure stops the call and replies `STATUS_RESOURCE_FAILURE`.
    pub fn dispatch(&self, call: &CallEnvelope) -> ReplyEnvelope {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);

        let mut matched = 0usize;
        let mut last = STATUS_OK;
        for entry in self.registry.matching(&call.fun_name) {
            matched += 1;
            let mut payload = match Mapping::open(&*self.shm, &call.share_key, call.share_size) {
                Ok(m) => m,
                Err(e) => {
                    self.counters.resource_failures.fetch_add(1, Ordering::Relaxed);
                    kerror!("{}: cannot attach payload {}: {}", call.fun_name, call.share_key, e);
                    return ReplyEnvelope::new(STATUS_RESOURCE_FAILURE);
                }
            };
            last = (entry.handler)(&mut payload[..]);
            self.counters.invocations.fetch_add(1, Ordering::Relaxed);
            ktrace!("{} #{} returned {} ({})", call.fun_name, matched, last, status::describe(last));
        }

        if matched == 0 {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            kdebug!("no function named {:?}", call.fun_name);
        }

        match self.policy {
            ReplyPolicy::Acknowledge => ReplyEnvelope::new(STATUS_OK),
            ReplyPolicy::Propagate if matched == 0 => ReplyEnvelope::new(STATUS_NO_SUCH_FUNCTION),
            ReplyPolicy::Propagate => ReplyEnvelope::new(last),
        }
    }

    /// Body of the `callfun` bus method.
    pub fn handle_message(&self, text: &str) -> String {
        let call = CallEnvelope::decode(text);
        let reply = self.dispatch(&call);
        reply.encode().unwrap_or_else(|e| {
            kerror!("reply encoding failed: {}", e);
            fallback_reply(reply.status)
        })
    }

    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> ReplyPolicy {
        self.policy
    }
}

fn fallback_reply(status: Status) -> String {
    format!("{{\"Return\":{}}}", status)
}
