//! Client and server on one `LocalBus`.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::*;

const TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> IpcConfig {
    IpcConfig::new()
        .bus_name("e2e.server")
        .interface("e2e.server.CallFun")
        .object_path("/e2e")
        .call_timeout(TIMEOUT)
}

struct Fixture {
    // Field order: connections go before the bus so the dispatcher joins last.
    client: Client,
    server: Server,
    shm: Arc<HeapSharedMemory>,
    bus: LocalBus,
}

fn fixture_with(
    registry: FunctionRegistry,
    server_config: ServerConfig,
    config: IpcConfig,
) -> Fixture {
    let bus = LocalBus::start(LocalBusConfig::default()).unwrap();
    let shm = Arc::new(HeapSharedMemory::new());
    let server = Server::start_with(
        config.clone(),
        server_config,
        bus.connect(),
        shm.clone(),
        registry,
    )
    .unwrap();
    let client = Client::new(config, bus.connect(), shm.clone()).unwrap();
    Fixture {
        client,
        server,
        shm,
        bus,
    }
}

fn fixture(registry: FunctionRegistry) -> Fixture {
    fixture_with(registry, ServerConfig::default(), config())
}

fn add_one(buf: &mut [u8]) -> Status {
    for b in buf.iter_mut() {
        *b = b.wrapping_add(1);
    }
    0
}

#[test]
fn round_trip_with_restore() {
    let f = fixture(FunctionRegistry::builder().function("add_one", add_one).build());

    let mut buf = [1u8, 2, 3, 4];
    assert_eq!(f.client.call("add_one", &mut buf, true), STATUS_OK);
    assert_eq!(buf, [2, 3, 4, 5]);
    assert_eq!(f.shm.live_segments(), 0);
    assert_eq!(f.shm.attached_count(), 0);

    assert_eq!(f.client.call("add_one", &mut buf, false), STATUS_OK);
    assert_eq!(buf, [2, 3, 4, 5]);
    assert_eq!(f.shm.live_segments(), 0);
    assert_eq!(f.server.stats().invocations, 2);
}

#[test]
fn zero_length_payload() {
    let f = fixture(FunctionRegistry::builder().function("ping", |buf| buf.len() as Status).build());
    let mut empty: [u8; 0] = [];
    assert_eq!(f.client.call("ping", &mut empty, true), STATUS_OK);
    assert_eq!(f.server.stats().invocations, 1);
    assert_eq!(f.shm.live_segments(), 0);
}

#[test]
fn unknown_function_is_acknowledged() {
    let f = fixture(FunctionRegistry::builder().function("add_one", add_one).build());

    let mut buf = *b"untouched";
    assert_eq!(f.client.call("nonexistent", &mut buf, true), STATUS_OK);
    assert_eq!(&buf, b"untouched");
    assert_eq!(f.server.stats().misses, 1);
    assert_eq!(f.shm.live_segments(), 0);
}

#[test]
fn every_matching_entry_runs_once_in_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (first, second) = (order.clone(), order.clone());
    let registry = FunctionRegistry::builder()
        .function("twice", move |buf| {
            first.lock().unwrap().push("first");
            buf[0] += 1;
            0
        })
        .function("twice", move |buf| {
            second.lock().unwrap().push("second");
            buf[0] *= 10;
            0
        })
        .build();
    let f = fixture(registry);

    let mut buf = [1u8];
    assert_eq!(f.client.call("twice", &mut buf, true), STATUS_OK);
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    // (1 + 1) * 10: the second handler saw the first one's write.
    assert_eq!(buf, [20]);
}

#[test]
fn handler_status_is_not_propagated_by_default() {
    let f = fixture(FunctionRegistry::builder().function("fails", |_| 42).build());
    assert_eq!(f.client.call("fails", &mut [0u8; 2], false), STATUS_OK);
}

#[test]
fn propagate_policy_returns_handler_status() {
    let registry = FunctionRegistry::builder().function("answer", |_| 42).build();
    let f = fixture_with(
        registry,
        ServerConfig::default().reply_policy(ReplyPolicy::Propagate),
        config(),
    );
    assert_eq!(f.client.call("answer", &mut [0u8; 2], false), 42);
    assert_eq!(
        f.client.call("question", &mut [0u8; 2], false),
        STATUS_NO_SUCH_FUNCTION
    );
}

#[test]
fn server_attach_failure_is_resource_failure() {
    let bus = LocalBus::start(LocalBusConfig::default()).unwrap();
    // Server and client see different segment tables.
    let _server = Server::start(
        config(),
        bus.connect(),
        Arc::new(HeapSharedMemory::new()),
        FunctionRegistry::builder().function("add_one", add_one).build(),
    )
    .unwrap();
    let client_shm = Arc::new(HeapSharedMemory::new());
    let client = Client::new(config(), bus.connect(), client_shm.clone()).unwrap();

    let mut buf = [7u8; 3];
    assert_eq!(client.call("add_one", &mut buf, true), STATUS_RESOURCE_FAILURE);
    assert_eq!(buf, [7; 3]);
    assert_eq!(client_shm.live_segments(), 0);
}

#[test]
fn timeout_returns_sentinel_and_destroys_segment() {
    let registry = FunctionRegistry::builder()
        .function("slow", |buf| {
            thread::sleep(Duration::from_millis(300));
            add_one(buf)
        })
        .build();
    let f = fixture_with(
        registry,
        ServerConfig::default(),
        config().call_timeout(Duration::from_millis(50)),
    );

    let mut buf = [0u8; 8];
    let err = f.client.try_call("slow", &mut buf, true).err().unwrap();
    assert!(matches!(err, CallError::Timeout(_)));
    assert_eq!(err.status(), STATUS_TRANSPORT_FAILURE);
    assert_eq!(buf, [0; 8]);
    // The key is released at once; the server's attachment ends with the handler.
    assert!(!f.shm.contains(&ShareKey::new("/tmp", 1)));

    thread::sleep(Duration::from_millis(500));
    assert_eq!(f.shm.live_segments(), 0);
    assert_eq!(f.shm.attached_count(), 0);
}

#[test]
fn unbounded_timeout_still_completes() {
    let f = fixture_with(
        FunctionRegistry::builder().function("add_one", add_one).build(),
        ServerConfig::default(),
        config().call_timeout(Duration::MAX),
    );
    let mut buf = [1u8];
    assert_eq!(f.client.call("add_one", &mut buf, true), STATUS_OK);
    assert_eq!(buf, [2]);
    assert_eq!(f.shm.live_segments(), 0);
}

#[test]
fn concurrent_calls_do_not_cross_talk() {
    let registry = FunctionRegistry::builder()
        .function("reverse", |buf| {
            buf.reverse();
            0
        })
        .build();
    let f = fixture(registry);
    let client = &f.client;

    thread::scope(|s| {
        for t in 0..8u8 {
            s.spawn(move || {
                for round in 0..10u8 {
                    let mut buf: Vec<u8> = (0..16).map(|i| t * 16 + i + round).collect();
                    let mut expected = buf.clone();
                    expected.reverse();
                    assert_eq!(client.call("reverse", &mut buf, true), STATUS_OK);
                    assert_eq!(buf, expected, "thread {} round {}", t, round);
                }
            });
        }
    });

    assert_eq!(f.server.stats().calls, 80);
    assert_eq!(f.shm.live_segments(), 0);
}

fn recorder() -> (SignalCallback, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: SignalCallback = Arc::new(move |body: &str| sink.lock().unwrap().push(body.to_string()));
    (cb, seen)
}

/// Wait until the bus has drained what was emitted so far.
fn settle(f: &Fixture) {
    // A call is queued behind earlier signals on the single dispatcher.
    f.client.call("settle", &mut [], false);
}

#[test]
fn duplicate_subscription_delivers_once() {
    let f = fixture(FunctionRegistry::default());
    let signals = SignalRegistry::new(f.bus.connect());
    let (cb, seen) = recorder();
    let iface = f.server.config().interface.clone();

    signals.subscribe(&iface, "callback", cb.clone()).unwrap();
    signals.subscribe(&iface, "callback", cb.clone()).unwrap();
    f.server.emit_callback("hello").unwrap();
    settle(&f);

    assert_eq!(*seen.lock().unwrap(), vec!["hello"]);
}

#[test]
fn unsubscribed_triple_gets_nothing() {
    let f = fixture(FunctionRegistry::default());
    let signals = SignalRegistry::new(f.bus.connect());
    let (gone, seen_gone) = recorder();
    let (kept, seen_kept) = recorder();
    let iface = f.server.config().interface.clone();

    signals.subscribe(&iface, "callback", gone.clone()).unwrap();
    signals.subscribe(&iface, "callback", kept.clone()).unwrap();
    assert!(signals.unsubscribe(&iface, "callback", &gone));

    f.server.emit_callback("after").unwrap();
    settle(&f);

    assert!(seen_gone.lock().unwrap().is_empty());
    assert_eq!(*seen_kept.lock().unwrap(), vec!["after"]);
}

#[cfg(target_os = "linux")]
#[test]
fn round_trip_over_system_v() {
    use std::path::PathBuf;

    struct KeyFile(PathBuf);
    impl Drop for KeyFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    let file = KeyFile(std::env::temp_dir().join(format!("cfipc-e2e-{}", std::process::id())));
    std::fs::write(&file.0, b"").unwrap();
    let config = config().share_path(file.0.to_str().unwrap());

    let bus = LocalBus::start(LocalBusConfig::default()).unwrap();
    let shm: Arc<dyn SharedMemory> = Arc::new(SysvSharedMemory::new());
    let _server = Server::start(
        config.clone(),
        bus.connect(),
        shm.clone(),
        FunctionRegistry::builder().function("add_one", add_one).build(),
    )
    .unwrap();
    let client = Client::new(config, bus.connect(), shm).unwrap();

    let mut buf = [9u8, 19, 29];
    match client.try_call("add_one", &mut buf, true) {
        Ok(status) => {
            assert_eq!(status, STATUS_OK);
            assert_eq!(buf, [10, 20, 30]);
        }
        Err(CallError::Resource(ShmError::Os { errno, .. })) => {
            eprintln!("System V shm unavailable (errno {}), skipping", errno);
        }
        Err(e) => panic!("call failed: {e}"),
    }
}
