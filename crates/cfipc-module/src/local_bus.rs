//! # LocalBus — in-process control plane
//!
//! A complete `BusConnection` implementation for client and server
//! connections living in one process. It runs on a dedicated OS thread:
//!
//! 1. Connections push `BusMessage`s onto a lock-free bounded queue
//!    and unpark the dispatcher.
//! 2. The dispatcher pops one message at a time.
//! 3. Method calls are routed by destination name → connection →
//!    `(path, interface, method)`, the handler runs, and the reply (or
//!    error) goes to the caller's notify closure.
//! 4. Signals go to the filters of every connection whose match rules
//!    cover the signal's interface.
//!
//! Like a system bus, this gives the server a single dispatch context:
//! a slow handler holds up every other message.
//!
//! Per-message timeouts are enforced at the dispatcher: a call dequeued
//! after its deadline, or whose handler finishes after it, is answered
//! with `NoReply` and the late reply is dropped.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use cfipc_core::bus::{
    BusConnection, MatchRule, MethodCall, MethodHandler, ReplyNotify, SignalFilter, SignalMessage,
};
use cfipc_core::error::{BusError, BusResult};
use cfipc_core::{kdebug, kinfo, kwarn};
use crossbeam_queue::ArrayQueue;

/// LocalBus configuration.
pub struct LocalBusConfig {
    /// Bounded queue capacity; `call_async`/`emit_signal` fail with
    /// `QueueFull` beyond it.
    pub queue_capacity: usize,
    /// How long the idle dispatcher parks between queue checks.
    pub idle_park: Duration,
}

impl Default for LocalBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            idle_park: Duration::from_millis(10),
        }
    }
}

enum BusMessage {
    Call {
        call: MethodCall,
        /// `None` when `timeout` is too large to land on the clock.
        deadline: Option<Instant>,
        timeout: Duration,
        notify: ReplyNotify,
    },
    Signal(SignalMessage),
}

type MethodKey = (String, String, String);

struct ConnState {
    unique_name: String,
    methods: HashMap<MethodKey, MethodHandler>,
    filters: Vec<SignalFilter>,
    matches: HashSet<MatchRule>,
}

#[derive(Default)]
struct Registry {
    /// Well-known name → owning connection.
    names: HashMap<String, u64>,
    conns: HashMap<u64, ConnState>,
}

impl Registry {
    fn resolve(&self, call: &MethodCall) -> BusResult<MethodHandler> {
        let conn = self
            .names
            .get(&call.destination)
            .and_then(|id| self.conns.get(id))
            .or_else(|| {
                self.conns
                    .values()
                    .find(|c| c.unique_name == call.destination)
            })
            .ok_or_else(|| BusError::ServiceUnknown(call.destination.clone()))?;
        let key = (call.path.clone(), call.interface.clone(), call.method.clone());
        conn.methods
            .get(&key)
            .cloned()
            .ok_or_else(|| BusError::UnknownMethod {
                path: call.path.clone(),
                interface: call.interface.clone(),
                method: call.method.clone(),
            })
    }

    fn filters_for(&self, signal: &SignalMessage) -> Vec<SignalFilter> {
        self.conns
            .values()
            .filter(|c| c.matches.iter().any(|rule| rule.matches(signal)))
            .flat_map(|c| c.filters.iter().cloned())
            .collect()
    }
}

/// State shared between connections and the dispatcher thread.
struct BusShared {
    queue: ArrayQueue<BusMessage>,
    registry: Mutex<Registry>,
    shutdown: AtomicBool,
    next_conn: AtomicU64,
    dispatcher: OnceLock<Thread>,
}

impl BusShared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, msg: BusMessage) -> BusResult<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(BusError::Disconnected);
        }
        self.queue.push(msg).map_err(|_| BusError::QueueFull)?;
        if let Some(t) = self.dispatcher.get() {
            t.unpark();
        }
        Ok(())
    }

    fn deliver(&self, msg: BusMessage) {
        match msg {
            BusMessage::Call {
                call,
                deadline,
                timeout,
                notify,
            } => self.deliver_call(call, deadline, timeout, notify),
            BusMessage::Signal(signal) => self.deliver_signal(&signal),
        }
    }

    fn deliver_call(
        &self,
        call: MethodCall,
        deadline: Option<Instant>,
        timeout: Duration,
        notify: ReplyNotify,
    ) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kdebug!("{} expired in queue", call.method);
            notify(Err(BusError::NoReply(timeout)));
            return;
        }
        let resolved = self.registry().resolve(&call);
        let handler = match resolved {
            Ok(h) => h,
            Err(e) => {
                kdebug!("call to {} not routable: {}", call.destination, e);
                notify(Err(e));
                return;
            }
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&call.body)))
            .unwrap_or_else(|_| {
                kwarn!("{}.{} handler panicked", call.interface, call.method);
                Err(BusError::Remote(format!("{} handler panicked", call.method)))
            });
        if deadline.is_some_and(|d| Instant::now() > d) {
            kdebug!("{} answered after its deadline, reply dropped", call.method);
            notify(Err(BusError::NoReply(timeout)));
            return;
        }
        notify(result);
    }

    fn deliver_signal(&self, signal: &SignalMessage) {
        let filters = self.registry().filters_for(signal);
        for filter in filters {
            if panic::catch_unwind(AssertUnwindSafe(|| filter(signal))).is_err() {
                kwarn!("signal filter panicked on {}.{}", signal.interface, signal.member);
            }
        }
    }
}

/// Handle to the bus and its dispatcher thread.
pub struct LocalBus {
    shared: Arc<BusShared>,
    thread: Option<JoinHandle<()>>,
}

impl LocalBus {
    /// Create the bus and start its dispatcher.
    pub fn start(config: LocalBusConfig) -> std::io::Result<Self> {
        let shared = Arc::new(BusShared {
            queue: ArrayQueue::new(config.queue_capacity.max(1)),
            registry: Mutex::new(Registry::default()),
            shutdown: AtomicBool::new(false),
            next_conn: AtomicU64::new(1),
            dispatcher: OnceLock::new(),
        });
        let shared_clone = Arc::clone(&shared);
        let idle_park = config.idle_park;
        let thread = thread::Builder::new()
            .name("cfipc-local-bus".into())
            .spawn(move || dispatch_loop(shared_clone, idle_park))?;
        let _ = shared.dispatcher.set(thread.thread().clone());
        kinfo!("local bus started, queue capacity {}", config.queue_capacity);
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Open a new connection with a fresh unique name.
    pub fn connect(&self) -> Arc<LocalConnection> {
        let id = self.shared.next_conn.fetch_add(1, Ordering::Relaxed);
        let unique_name = format!(":1.{}", id);
        self.shared.registry().conns.insert(
            id,
            ConnState {
                unique_name: unique_name.clone(),
                methods: HashMap::new(),
                filters: Vec::new(),
                matches: HashSet::new(),
            },
        );
        Arc::new(LocalConnection {
            id,
            unique_name,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Stop the dispatcher. Queued calls are answered with `Disconnected`.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for LocalBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(shared: Arc<BusShared>, idle_park: Duration) {
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        match shared.queue.pop() {
            Some(msg) => shared.deliver(msg),
            None => thread::park_timeout(idle_park),
        }
    }

    let mut dropped = 0usize;
    while let Some(msg) = shared.queue.pop() {
        if let BusMessage::Call { notify, .. } = msg {
            notify(Err(BusError::Disconnected));
        }
        dropped += 1;
    }
    kinfo!("local bus stopped, {} queued messages dropped", dropped);
}

/// One connection to a `LocalBus`.
pub struct LocalConnection {
    id: u64,
    unique_name: String,
    shared: Arc<BusShared>,
}

impl LocalConnection {
    fn with_state<T>(&self, f: impl FnOnce(&mut ConnState) -> T) -> BusResult<T> {
        let mut registry = self.shared.registry();
        registry
            .conns
            .get_mut(&self.id)
            .map(f)
            .ok_or(BusError::Disconnected)
    }
}

impl BusConnection for LocalConnection {
    fn unique_name(&self) -> String {
        self.unique_name.clone()
    }

    fn request_name(&self, name: &str) -> BusResult<()> {
        let mut registry = self.shared.registry();
        match registry.names.get(name) {
            Some(owner) if *owner != self.id => Err(BusError::NameTaken(name.to_string())),
            _ => {
                registry.names.insert(name.to_string(), self.id);
                kdebug!("{} owns {}", self.unique_name, name);
                Ok(())
            }
        }
    }

    fn export_method(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        handler: MethodHandler,
    ) -> BusResult<()> {
        let key = (path.to_string(), interface.to_string(), method.to_string());
        self.with_state(|state| {
            state.methods.insert(key, handler);
        })
    }

    fn call_async(
        &self,
        call: MethodCall,
        timeout: Duration,
        notify: ReplyNotify,
    ) -> BusResult<()> {
        self.shared.push(BusMessage::Call {
            call,
            deadline: Instant::now().checked_add(timeout),
            timeout,
            notify,
        })
    }

    fn emit_signal(&self, mut signal: SignalMessage) -> BusResult<()> {
        signal.sender = self.unique_name.clone();
        self.shared.push(BusMessage::Signal(signal))
    }

    fn add_filter(&self, filter: SignalFilter) -> BusResult<()> {
        self.with_state(|state| state.filters.push(filter))
    }

    fn add_match(&self, rule: &MatchRule) -> BusResult<()> {
        kdebug!("{} add match {}", self.unique_name, rule);
        self.with_state(|state| {
            state.matches.insert(rule.clone());
        })
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        let mut registry = self.shared.registry();
        registry.conns.remove(&self.id);
        registry.names.retain(|_, owner| *owner != self.id);
    }
}
