//! cfipc error types.

use std::time::Duration;

use thiserror::Error;

use crate::shm::ShareKey;
use crate::status::{Status, STATUS_RESOURCE_FAILURE, STATUS_TRANSPORT_FAILURE};

/// Shared payload channel failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShmError {
    /// A segment for this key is already live.
    #[error("segment {0} already exists")]
    AlreadyExists(ShareKey),
    /// No segment is registered under this key.
    #[error("segment {0} not found")]
    NotFound(ShareKey),
    /// The segment is smaller than the size the caller asked for.
    #[error("segment {key} holds {actual} bytes, {expected} requested")]
    SizeMismatch {
        key: ShareKey,
        expected: usize,
        actual: usize,
    },
    /// The key cannot be turned into an OS identifier (e.g. interior NUL).
    #[error("invalid segment key {0}")]
    InvalidKey(ShareKey),
    /// Handle or region not known to this provider.
    #[error("unknown segment handle {0}")]
    UnknownHandle(i32),
    /// OS call failed with errno.
    #[error("{op} failed: {}", std::io::Error::from_raw_os_error(*.errno))]
    Os { op: &'static str, errno: i32 },
}

pub type ShmResult<T> = std::result::Result<T, ShmError>;

/// Control-plane failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The bus is shut down or the connection was closed.
    #[error("bus disconnected")]
    Disconnected,
    /// Another connection already owns the requested name.
    #[error("name {0} is already owned")]
    NameTaken(String),
    /// No connection owns the destination name.
    #[error("no service owns {0}")]
    ServiceUnknown(String),
    /// The destination exports no such method.
    #[error("{interface}.{method} is not exported at {path}")]
    UnknownMethod {
        path: String,
        interface: String,
        method: String,
    },
    /// The reply did not arrive before the per-message timeout.
    #[error("no reply within {0:?}")]
    NoReply(Duration),
    /// The outgoing queue is full.
    #[error("bus queue full")]
    QueueFull,
    /// The remote side answered with an error.
    #[error("remote error: {0}")]
    Remote(String),
}

pub type BusResult<T> = std::result::Result<T, BusError>;

/// Why a synchronous call did not produce a server status.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("payload channel: {0}")]
    Resource(#[from] ShmError),
    #[error("bus: {0}")]
    Transport(#[from] BusError),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("malformed reply {0:?}")]
    MalformedReply(String),
    #[error("envelope encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CallError {
    /// Sentinel status reported to callers of the integer API.
    pub fn status(&self) -> Status {
        match self {
            CallError::Resource(_) => STATUS_RESOURCE_FAILURE,
            CallError::Transport(_)
            | CallError::Timeout(_)
            | CallError::MalformedReply(_)
            | CallError::Encode(_) => STATUS_TRANSPORT_FAILURE,
        }
    }
}

/// Rejected `IpcConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("call timeout must be non-zero")]
    ZeroTimeout,
}

/// `Server::start` failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("bus registration: {0}")]
    Bus(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = ShmError::AlreadyExists(ShareKey::new("/tmp", 3));
        assert_eq!(e.to_string(), "segment /tmp#3 already exists");

        let e = BusError::ServiceUnknown("a.b".into());
        assert_eq!(e.to_string(), "no service owns a.b");

        let e = ConfigError::Empty("bus_name");
        assert_eq!(e.to_string(), "bus_name must not be empty");
    }

    #[test]
    fn os_error_mentions_operation() {
        let e = ShmError::Os { op: "shmget", errno: 13 };
        assert!(e.to_string().starts_with("shmget failed: "));
    }

    #[test]
    fn call_error_status_mapping() {
        let shm: CallError = ShmError::NotFound(ShareKey::new("/tmp", 1)).into();
        assert_eq!(shm.status(), STATUS_RESOURCE_FAILURE);

        let bus: CallError = BusError::Disconnected.into();
        assert_eq!(bus.status(), STATUS_TRANSPORT_FAILURE);

        let timeout = CallError::Timeout(Duration::from_millis(5));
        assert_eq!(timeout.status(), STATUS_TRANSPORT_FAILURE);

        let malformed = CallError::MalformedReply("nope".into());
        assert_eq!(malformed.status(), STATUS_TRANSPORT_FAILURE);
    }

    #[test]
    fn start_error_wraps_sources() {
        let e: StartError = BusError::NameTaken("a.b".into()).into();
        assert_eq!(e.to_string(), "bus registration: name a.b is already owned");
        let e: StartError = ConfigError::ZeroTimeout.into();
        assert_eq!(e, StartError::Config(ConfigError::ZeroTimeout));
    }
}
