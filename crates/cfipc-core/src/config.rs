//! Process identity on the bus and the shared-segment base path.
//!
//! One `IpcConfig` is built at startup and handed to `Client` / `Server`,
//! which keep it for their lifetime.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder setters
//! 2. Environment variables (`from_env`)
//! 3. Library defaults (`defaults`)
//!
//! ```rust,ignore
//! use cfipc_core::IpcConfig;
//! use std::time::Duration;
//!
//! let config = IpcConfig::from_env()
//!     .bus_name("org.example.Media")
//!     .call_timeout(Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::env::{env_get_millis, env_get_str};
use crate::error::ConfigError;

pub mod defaults {
    pub const BUS_NAME: &str = "cfipc.server";
    pub const INTERFACE: &str = "cfipc.server.CallFun";
    pub const OBJECT_PATH: &str = "/cfipc/server";
    pub const SHARE_PATH: &str = "/tmp";
    /// Pending-call timeout of the `callfun` method.
    pub const CALL_TIMEOUT_MS: u64 = 120_000;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcConfig {
    /// Well-known bus name the server owns and the client calls.
    pub bus_name: String,
    /// Interface exporting `callfun` and emitting `callback`.
    pub interface: String,
    /// Object path the interface is exported on.
    pub object_path: String,
    /// Base path for shared segment keys.
    pub share_path: String,
    /// How long a call waits for its reply.
    pub call_timeout: Duration,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl IpcConfig {
    /// Library defaults, no environment lookup.
    pub fn new() -> Self {
        Self {
            bus_name: defaults::BUS_NAME.to_string(),
            interface: defaults::INTERFACE.to_string(),
            object_path: defaults::OBJECT_PATH.to_string(),
            share_path: defaults::SHARE_PATH.to_string(),
            call_timeout: Duration::from_millis(defaults::CALL_TIMEOUT_MS),
        }
    }

    /// Defaults with environment overrides (all optional):
    /// - `CFIPC_BUS_NAME`
    /// - `CFIPC_INTERFACE`
    /// - `CFIPC_OBJECT_PATH`
    /// - `CFIPC_SHARE_PATH`
    /// - `CFIPC_CALL_TIMEOUT_MS`
    pub fn from_env() -> Self {
        Self {
            bus_name: env_get_str("CFIPC_BUS_NAME", defaults::BUS_NAME),
            interface: env_get_str("CFIPC_INTERFACE", defaults::INTERFACE),
            object_path: env_get_str("CFIPC_OBJECT_PATH", defaults::OBJECT_PATH),
            share_path: env_get_str("CFIPC_SHARE_PATH", defaults::SHARE_PATH),
            call_timeout: env_get_millis("CFIPC_CALL_TIMEOUT_MS", defaults::CALL_TIMEOUT_MS),
        }
    }

    pub fn bus_name(mut self, name: impl Into<String>) -> Self {
        self.bus_name = name.into();
        self
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn object_path(mut self, path: impl Into<String>) -> Self {
        self.object_path = path.into();
        self
    }

    pub fn share_path(mut self, path: impl Into<String>) -> Self {
        self.share_path = path.into();
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("bus_name", &self.bus_name),
            ("interface", &self.interface),
            ("object_path", &self.object_path),
            ("share_path", &self.share_path),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_defaults() {
        let config = IpcConfig::new();
        assert_eq!(config.bus_name, defaults::BUS_NAME);
        assert_eq!(config.call_timeout, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = IpcConfig::new()
            .bus_name("a.b")
            .interface("a.b.I")
            .object_path("/a/b")
            .share_path("/var/tmp")
            .call_timeout(Duration::from_millis(10));
        assert_eq!(config.bus_name, "a.b");
        assert_eq!(config.interface, "a.b.I");
        assert_eq!(config.object_path, "/a/b");
        assert_eq!(config.share_path, "/var/tmp");
        assert_eq!(config.call_timeout, Duration::from_millis(10));
    }

    #[test]
    fn validate_rejects_empty_and_zero() {
        let config = IpcConfig::new().share_path("");
        assert_eq!(config.validate(), Err(ConfigError::Empty("share_path")));

        let config = IpcConfig::new().call_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn env_overrides() {
        std::env::set_var("CFIPC_OBJECT_PATH", "/from/env");
        std::env::set_var("CFIPC_CALL_TIMEOUT_MS", "1500");
        let config = IpcConfig::from_env();
        assert_eq!(config.object_path, "/from/env");
        assert_eq!(config.call_timeout, Duration::from_millis(1500));
        std::env::remove_var("CFIPC_OBJECT_PATH");
        std::env::remove_var("CFIPC_CALL_TIMEOUT_MS");
    }
}
