//! Message bus abstraction (the control plane).
//!
//! The bus carries only small string messages: the `callfun` method
//! call with its JSON envelope, its JSON reply, and `callback` signals.
//! Bulk data never travels over it.
//!
//! # Implementors
//!
//! - `LocalBus` (cfipc-module): in-process bus with one dispatch thread.
//!   Client and server connections in the same process, tests.
//!
//! A system message bus binding implements the same trait; connection
//! setup and message marshalling stay on its side of the seam.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BusResult;

/// Method exported by servers and called by clients.
pub const CALLFUN_METHOD: &str = "callfun";

/// Broadcast signal carrying an application-defined string.
pub const CALLBACK_SIGNAL: &str = "callback";

/// An outgoing method call with a single string argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub method: String,
    pub body: String,
}

/// A broadcast signal with a single string argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    /// Unique name of the emitting connection (filled in by the bus).
    pub sender: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub body: String,
}

impl SignalMessage {
    pub fn new(
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: String::new(),
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
            body: body.into(),
        }
    }

    #[inline]
    pub fn is_signal(&self, interface: &str, member: &str) -> bool {
        self.interface == interface && self.member == member
    }
}

/// Interface-level signal match rule: `type='signal',interface='<iface>'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchRule {
    pub interface: String,
}

impl MatchRule {
    pub fn interface(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    pub fn matches(&self, signal: &SignalMessage) -> bool {
        self.interface == signal.interface
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type='signal',interface='{}'", self.interface)
    }
}

/// Whether a filter consumed a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Handled,
    NotYetHandled,
}

/// Invoked exactly once with the reply body or the failure.
pub type ReplyNotify = Box<dyn FnOnce(BusResult<String>) + Send>;

/// Server-side method body: request string in, reply string out.
pub type MethodHandler = Arc<dyn Fn(&str) -> BusResult<String> + Send + Sync>;

/// Connection-wide signal filter.
pub type SignalFilter = Arc<dyn Fn(&SignalMessage) -> FilterResult + Send + Sync>;

/// One connection to the control-plane bus.
///
/// **Contract:**
/// - `call_async` never blocks on the reply. It returns `Err` only when
///   the call could not be sent; once it returns `Ok`, `notify` runs
///   exactly once, with the reply, an error reply, or `NoReply` after
///   `timeout`.
/// - Method handlers and filters run on the bus dispatch context, one
///   message at a time.
/// - Signals reach a connection's filters only if one of its match rules
///   covers the signal's interface.
pub trait BusConnection: Send + Sync {
    /// The bus-assigned unique name of this connection.
    fn unique_name(&self) -> String;

    /// Take ownership of a well-known name.
    fn request_name(&self, name: &str) -> BusResult<()>;

    /// Export `interface.method` on `path`.
    fn export_method(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        handler: MethodHandler,
    ) -> BusResult<()>;

    /// Send a method call; the reply is delivered through `notify`.
    fn call_async(&self, call: MethodCall, timeout: Duration, notify: ReplyNotify)
        -> BusResult<()>;

    /// Broadcast a signal.
    fn emit_signal(&self, signal: SignalMessage) -> BusResult<()>;

    /// Install a connection-wide signal filter.
    fn add_filter(&self, filter: SignalFilter) -> BusResult<()>;

    /// Ask the bus to route matching signals to this connection.
    fn add_match(&self, rule: &MatchRule) -> BusResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_rule_text() {
        let rule = MatchRule::interface("cfipc.server.CallFun");
        assert_eq!(
            rule.to_string(),
            "type='signal',interface='cfipc.server.CallFun'"
        );
    }

    #[test]
    fn match_rule_is_interface_wide() {
        let rule = MatchRule::interface("a.b");
        assert!(rule.matches(&SignalMessage::new("/x", "a.b", "callback", "{}")));
        assert!(rule.matches(&SignalMessage::new("/y", "a.b", "other", "")));
        assert!(!rule.matches(&SignalMessage::new("/x", "a.c", "callback", "")));
    }

    #[test]
    fn signal_identity() {
        let sig = SignalMessage::new("/x", "a.b", CALLBACK_SIGNAL, "payload");
        assert!(sig.is_signal("a.b", "callback"));
        assert!(!sig.is_signal("a.b", "other"));
        assert!(sig.sender.is_empty());
    }
}
