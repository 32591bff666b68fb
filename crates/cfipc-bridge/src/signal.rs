//! Signal subscriptions.
//!
//! Subscriptions are `(interface, signal, callback)` triples. The
//! registry installs one filter on the bus connection the first time
//! anything subscribes, and one match rule per interface the first time
//! that interface is subscribed to. Neither is removed again; an
//! interface with no subscriptions left costs a lookup per signal.
//!
//! Callbacks run on the bus dispatch thread, in subscription order,
//! with the registry lock held. A callback must not subscribe or
//! unsubscribe.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use cfipc_core::bus::{BusConnection, FilterResult, MatchRule, SignalMessage};
use cfipc_core::error::BusResult;
use cfipc_core::{kdebug, ktrace};

/// Receives the signal's string argument.
pub type SignalCallback = Arc<dyn Fn(&str) + Send + Sync>;

type SignalKey = (String, String);

#[derive(Default)]
struct Subscriptions {
    by_signal: HashMap<SignalKey, Vec<SignalCallback>>,
    /// Interfaces with a match rule on the bus.
    interfaces: HashSet<String>,
    filter_installed: bool,
}

impl Subscriptions {
    fn dispatch(&self, msg: &SignalMessage) -> bool {
        let key = (msg.interface.clone(), msg.member.clone());
        let Some(callbacks) = self.by_signal.get(&key) else {
            return false;
        };
        for cb in callbacks {
            cb(&msg.body);
        }
        ktrace!("{}.{} delivered to {} callbacks", msg.interface, msg.member, callbacks.len());
        !callbacks.is_empty()
    }
}

/// Callback identity: the allocation, not the vtable.
fn same_callback(a: &SignalCallback, b: &SignalCallback) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn lock(state: &Mutex<Subscriptions>) -> MutexGuard<'_, Subscriptions> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SignalRegistry {
    bus: Arc<dyn BusConnection>,
    state: Arc<Mutex<Subscriptions>>,
}

impl SignalRegistry {
    pub fn new(bus: Arc<dyn BusConnection>) -> Self {
        Self {
            bus,
            state: Arc::new(Mutex::new(Subscriptions::default())),
        }
    }

    /// Subscribe `callback` to `interface.signal`. Subscribing the same
    /// triple again is a no-op.
    pub fn subscribe(&self, interface: &str, signal: &str, callback: SignalCallback) -> BusResult<()> {
        let mut subs = lock(&self.state);

        if !subs.filter_installed {
            let state: Weak<Mutex<Subscriptions>> = Arc::downgrade(&self.state);
            self.bus.add_filter(Arc::new(move |msg: &SignalMessage| {
                let handled = match state.upgrade() {
                    Some(state) => lock(&state).dispatch(msg),
                    None => false,
                };
                if handled {
                    FilterResult::Handled
                } else {
                    FilterResult::NotYetHandled
                }
            }))?;
            subs.filter_installed = true;
        }

        if !subs.interfaces.contains(interface) {
            self.bus.add_match(&MatchRule::interface(interface))?;
            subs.interfaces.insert(interface.to_string());
        }

        let list = subs
            .by_signal
            .entry((interface.to_string(), signal.to_string()))
            .or_default();
        if list.iter().any(|cb| same_callback(cb, &callback)) {
            kdebug!("{}.{} already subscribed", interface, signal);
            return Ok(());
        }
        list.push(callback);
        kdebug!("subscribed to {}.{}", interface, signal);
        Ok(())
    }

    /// Remove the subscription for this exact triple. Returns whether one
    /// existed.
    pub fn unsubscribe(&self, interface: &str, signal: &str, callback: &SignalCallback) -> bool {
        let mut subs = lock(&self.state);
        let key = (interface.to_string(), signal.to_string());
        let Some(list) = subs.by_signal.get_mut(&key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|cb| same_callback(cb, callback)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            subs.by_signal.remove(&key);
        }
        kdebug!("unsubscribed from {}.{}", interface, signal);
        true
    }

    /// Deliver `msg` to its subscribers. Returns whether any ran.
    pub fn dispatch(&self, msg: &SignalMessage) -> bool {
        lock(&self.state).dispatch(msg)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        lock(&self.state).by_signal.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
