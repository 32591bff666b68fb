//! Bus registration for a `Dispatcher`.

use std::sync::Arc;

use cfipc_core::bus::{BusConnection, SignalMessage, CALLBACK_SIGNAL, CALLFUN_METHOD};
use cfipc_core::config::IpcConfig;
use cfipc_core::error::{BusResult, StartError};
use cfipc_core::shm::SharedMemory;
use cfipc_core::{kdebug, kinfo};

use crate::dispatcher::{Dispatcher, ServerConfig, ServerStats};
use crate::registry::FunctionRegistry;

/// A running server: owns its bus name and answers `callfun`.
///
/// The exported method lives as long as the bus connection; dropping the
/// `Server` handle does not unexport it.
pub struct Server {
    config: IpcConfig,
    bus: Arc<dyn BusConnection>,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Start with the default `ServerConfig`.
    pub fn start(
        config: IpcConfig,
        bus: Arc<dyn BusConnection>,
        shm: Arc<dyn SharedMemory>,
        registry: FunctionRegistry,
    ) -> Result<Self, StartError> {
        Self::start_with(config, ServerConfig::default(), bus, shm, registry)
    }

    /// Claim `config.bus_name` and export `callfun` on
    /// `(config.object_path, config.interface)`.
    pub fn start_with(
        config: IpcConfig,
        server_config: ServerConfig,
        bus: Arc<dyn BusConnection>,
        shm: Arc<dyn SharedMemory>,
        registry: FunctionRegistry,
    ) -> Result<Self, StartError> {
        config.validate()?;
        let functions = registry.len();
        let dispatcher = Arc::new(Dispatcher::new(registry, shm, &server_config));

        bus.request_name(&config.bus_name)?;
        let handler_dispatcher = Arc::clone(&dispatcher);
        bus.export_method(
            &config.object_path,
            &config.interface,
            CALLFUN_METHOD,
            Arc::new(move |body: &str| -> BusResult<String> {
                Ok(handler_dispatcher.handle_message(body))
            }),
        )?;

        kinfo!(
            "server {} exporting {}.{} at {} ({} functions, {:?})",
            config.bus_name,
            config.interface,
            CALLFUN_METHOD,
            config.object_path,
            functions,
            server_config.reply_policy
        );
        Ok(Self {
            config,
            bus,
            dispatcher,
        })
    }

    /// Broadcast the `callback` signal with `payload` as its argument.
    pub fn emit_callback(&self, payload: &str) -> BusResult<()> {
        kdebug!("emit {} ({} bytes)", CALLBACK_SIGNAL, payload.len());
        self.bus.emit_signal(SignalMessage::new(
            self.config.object_path.clone(),
            self.config.interface.clone(),
            CALLBACK_SIGNAL,
            payload,
        ))
    }

    pub fn stats(&self) -> ServerStats {
        self.dispatcher.stats()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfipc_core::bus::{FilterResult, MatchRule, MethodCall};
    use cfipc_core::error::{BusError, ConfigError};
    use cfipc_module::{HeapSharedMemory, LocalBus, LocalBusConfig};
    use std::sync::mpsc;
    use std::time::Duration;

    fn config() -> IpcConfig {
        IpcConfig::new().bus_name("t.server").interface("t.server.I").object_path("/t")
    }

    #[test]
    fn exports_callfun_under_configured_identity() {
        let bus = LocalBus::start(LocalBusConfig::default()).unwrap();
        let registry = FunctionRegistry::builder().function("f", |_| 0).build();
        let server = Server::start(
            config(),
            bus.connect(),
            Arc::new(HeapSharedMemory::new()),
            registry,
        )
        .unwrap();

        let client = bus.connect();
        let (tx, rx) = mpsc::channel();
        client
            .call_async(
                MethodCall {
                    destination: "t.server".into(),
                    path: "/t".into(),
                    interface: "t.server.I".into(),
                    method: CALLFUN_METHOD.into(),
                    body: r#"{"FunName":"unknown"}"#.into(),
                },
                Duration::from_secs(5),
                Box::new(move |r: BusResult<String>| {
                    let _ = tx.send(r);
                }),
            )
            .unwrap();
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply, Ok(r#"{"Return":0}"#.to_string()));
        assert_eq!(server.stats().calls, 1);
        assert_eq!(server.stats().misses, 1);
    }

    #[test]
    fn second_server_cannot_take_the_name() {
        let bus = LocalBus::start(LocalBusConfig::default()).unwrap();
        let shm: Arc<dyn SharedMemory> = Arc::new(HeapSharedMemory::new());
        let _first = Server::start(config(), bus.connect(), shm.clone(), FunctionRegistry::default()).unwrap();
        let err = Server::start(config(), bus.connect(), shm, FunctionRegistry::default())
            .err()
            .unwrap();
        assert_eq!(err, StartError::Bus(BusError::NameTaken("t.server".into())));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bus = LocalBus::start(LocalBusConfig::default()).unwrap();
        let err = Server::start(
            config().bus_name(""),
            bus.connect(),
            Arc::new(HeapSharedMemory::new()),
            FunctionRegistry::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err, StartError::Config(ConfigError::Empty("bus_name")));
    }

    #[test]
    fn callback_signal_reaches_listeners() {
        let bus = LocalBus::start(LocalBusConfig::default()).unwrap();
        let server = Server::start(
            config(),
            bus.connect(),
            Arc::new(HeapSharedMemory::new()),
            FunctionRegistry::default(),
        )
        .unwrap();

        let listener = bus.connect();
        let (tx, rx) = mpsc::channel();
        listener
            .add_filter(Arc::new(move |s: &SignalMessage| {
                let _ = tx.send((s.member.clone(), s.body.clone()));
                FilterResult::Handled
            }))
            .unwrap();
        listener.add_match(&MatchRule::interface("t.server.I")).unwrap();

        server.emit_callback(r#"{"event":"ready"}"#).unwrap();
        let (member, body) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(member, CALLBACK_SIGNAL);
        assert_eq!(body, r#"{"event":"ready"}"#);
    }
}
