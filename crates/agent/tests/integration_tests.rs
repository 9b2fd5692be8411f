//! Integration tests -- full service flow from desired state to collector.
//!
//! A stub inference backend and local TCP listeners stand in for the
//! model server and the remote collector.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use loglens_agent::transform::{Completion, InferenceRequest};
use loglens_agent::{
    AgentConfig, AgentError, EvtxFileReader, Forwarder, InferenceBackend, MonitorContext,
    Reconciler, ServiceRegistry, StateStore, TemplateCatalog, Transformer,
};
use loglens_core::pipeline::BoxFuture;
use loglens_core::types::{ButtonState, Checkpoint, ForwarderConfig, ModelAssociation, Protocol, ServiceKey};

/// Replies with a canned completion and counts calls.
struct StubBackend {
    reply: String,
    calls: AtomicUsize,
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn infer<'a>(
        &'a self,
        _request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<Completion, AgentError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(Completion {
                text: self.reply.clone(),
                elapsed: Duration::from_millis(3),
            })
        })
    }
}

/// Never answers; models a wedged inference server.
struct HangingBackend;

impl InferenceBackend for HangingBackend {
    fn name(&self) -> &str {
        "hanging"
    }

    fn infer<'a>(
        &'a self,
        _request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<Completion, AgentError>> {
        Box::pin(std::future::pending())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    root: PathBuf,
    store: Arc<StateStore>,
    registry: Arc<ServiceRegistry>,
    reconciler: Reconciler,
}

fn harness(backend: Arc<dyn InferenceBackend>, tweak: impl FnOnce(&mut AgentConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let template_dir = root.join("templates");
    std::fs::create_dir_all(&template_dir).unwrap();

    let mut config = AgentConfig {
        data_dir: root.join("state"),
        template_dir: template_dir.clone(),
        text_poll_interval: Duration::from_millis(25),
        evtx_poll_interval: Duration::from_millis(25),
        reconcile_interval: Duration::from_millis(50),
        hostname: "test-host".to_owned(),
        ..Default::default()
    };
    tweak(&mut config);

    let store = Arc::new(StateStore::new(&config.data_dir));
    let ctx = MonitorContext {
        store: store.clone(),
        transformer: Arc::new(Transformer::new(
            backend,
            config.transform_timeout,
            config.hostname.clone(),
        )),
        forwarder: Arc::new(Forwarder::new(config.forward_connect_timeout)),
        event_reader: Arc::new(EvtxFileReader),
        config: Arc::new(config),
    };
    let registry = Arc::new(ServiceRegistry::new(ctx));
    let catalog = Arc::new(TemplateCatalog::new(&template_dir));
    let reconciler = Reconciler::new(registry.clone(), store.clone(), catalog);

    Harness {
        _dir: dir,
        root,
        store,
        registry,
        reconciler,
    }
}

/// Collector that pushes every received line into a channel.
///
/// Connections are drained one at a time so arrival order is preserved.
async fn tcp_collector() -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut lines = tokio::io::BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(line);
            }
        }
    });

    (port, rx)
}

async fn register_source(
    store: &StateStore,
    path: &Path,
    template: &str,
    state: ButtonState,
) -> ServiceKey {
    let path_str = path.display().to_string();
    store.add_saved_path(&path_str).await.unwrap();
    store.assign_template(&path_str, template).await.unwrap();
    let key = ServiceKey::new(path, template);
    store.set_button_state(&key, state).await.unwrap();
    key
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for: {what}");
}

const ACTIVE: ButtonState = ButtonState {
    enabled: true,
    started: true,
};

#[tokio::test]
async fn test_text_source_end_to_end_with_transformation() {
    // Given: a text source at offset 0, a matching template with a model and a stub backend
    let backend = Arc::new(StubBackend {
        reply: r#"{"user":"alice","result":"fail"}"#.to_owned(),
        calls: AtomicUsize::new(0),
    });
    let h = harness(backend.clone(), |_| {});
    let (port, mut received) = tcp_collector().await;

    std::fs::write(
        h.root.join("templates/login.yaml"),
        "name: login\ntype_regex: 'user=(\\w+)'\ntypes: [alice]\nprompt: Extract user and result\n",
    )
    .unwrap();
    let source = h.root.join("auth.log");
    let line = "login failed user=alice";
    std::fs::write(&source, line).unwrap();

    h.store
        .set_forwarder_default(&ForwarderConfig {
            ip: "127.0.0.1".to_owned(),
            port,
            protocol: Protocol::Tcp,
        })
        .await
        .unwrap();
    h.store
        .set_association("login", Some(ModelAssociation::new("tiny.gguf")))
        .await
        .unwrap();
    let key = register_source(&h.store, &source, "login", ACTIVE).await;
    h.store
        .save_checkpoint(&key, Checkpoint::Text { offset: 0 })
        .await
        .unwrap();

    // When: the reconciler runs one pass
    let report = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(report.started, 1);

    // Then: the collector receives the model output and progress is recorded
    let payload = tokio::time::timeout(Duration::from_secs(10), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, r#"{"user":"alice","result":"fail"}"#);

    let store = h.store.clone();
    eventually("counter increments to 1", || {
        let store = store.clone();
        async move { store.counter("auth.log").await.unwrap() == 1 }
    })
    .await;

    let store = h.store.clone();
    let k = key.clone();
    eventually("checkpoint passes the line", || {
        let store = store.clone();
        let k = k.clone();
        async move {
            matches!(
                store.checkpoint(&k).await.unwrap(),
                Some(Checkpoint::Text { offset }) if offset >= line.len() as u64
            )
        }
    })
    .await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    h.registry.stop_all().await;
}

#[tokio::test]
async fn test_per_source_override_wins_over_default() {
    // Given: a default collector that must stay silent and an override for the source
    let h = harness(Arc::new(loglens_agent::DisabledBackend), |_| {});
    let (default_port, mut default_rx) = tcp_collector().await;
    let (override_port, mut override_rx) = tcp_collector().await;

    let source = h.root.join("fw.log");
    std::fs::write(&source, "").unwrap();
    h.store
        .set_forwarder_default(&ForwarderConfig {
            ip: "127.0.0.1".to_owned(),
            port: default_port,
            protocol: Protocol::Tcp,
        })
        .await
        .unwrap();
    h.store
        .set_forwarder_override(
            "fw.log",
            Some(ForwarderConfig {
                ip: "127.0.0.1".to_owned(),
                port: override_port,
                protocol: Protocol::Tcp,
            }),
        )
        .await
        .unwrap();
    let key = register_source(&h.store, &source, "raw", ACTIVE).await;

    // When: the service starts in passthrough mode and a line is appended
    h.reconciler.reconcile_once().await.unwrap();
    let store = h.store.clone();
    let k = key.clone();
    eventually("text checkpoint initialized", || {
        let store = store.clone();
        let k = k.clone();
        async move { store.checkpoint(&k).await.unwrap().is_some() }
    })
    .await;
    std::fs::write(&source, "action=DROP src=10.0.0.9\n").unwrap();

    // Then: only the override collector receives the raw line
    let payload = tokio::time::timeout(Duration::from_secs(10), override_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, "action=DROP src=10.0.0.9");
    assert!(
        tokio::time::timeout(Duration::from_millis(200), default_rx.recv())
            .await
            .is_err()
    );

    h.registry.stop_all().await;
}

#[tokio::test]
async fn test_restart_resumes_from_checkpoint() {
    // Given: a service that processed one line and was shut down
    let (port, mut received) = tcp_collector().await;
    let source;
    let data_root;
    {
        let h = harness(Arc::new(loglens_agent::DisabledBackend), |_| {});
        source = h.root.join("app.log");
        std::fs::write(&source, "").unwrap();
        h.store
            .set_forwarder_default(&ForwarderConfig {
                ip: "127.0.0.1".to_owned(),
                port,
                protocol: Protocol::Tcp,
            })
            .await
            .unwrap();
        let key = register_source(&h.store, &source, "raw", ACTIVE).await;
        assert_eq!(h.reconciler.autostart().await.unwrap(), 1);

        let store = h.store.clone();
        eventually("checkpoint initialized", || {
            let store = store.clone();
            let k = key.clone();
            async move { store.checkpoint(&k).await.unwrap().is_some() }
        })
        .await;
        std::fs::write(&source, "first\n").unwrap();
        assert_eq!(received.recv().await.unwrap(), "first");

        let store = h.store.clone();
        eventually("checkpoint after first line", || {
            let store = store.clone();
            let k = key.clone();
            async move { store.checkpoint(&k).await.unwrap() == Some(Checkpoint::Text { offset: 6 }) }
        })
        .await;
        h.registry.stop_all().await;

        // keep the directory alive for the second run
        data_root = h._dir;
    }

    // When: lines arrive while stopped and a fresh process autostarts
    let mut file = std::fs::OpenOptions::new().append(true).open(&source).unwrap();
    std::io::Write::write_all(&mut file, b"second\nthird\n").unwrap();

    let h2 = harness(Arc::new(loglens_agent::DisabledBackend), |config| {
        config.data_dir = data_root.path().join("state");
        config.template_dir = data_root.path().join("templates");
    });
    assert_eq!(h2.reconciler.autostart().await.unwrap(), 1);

    // Then: only the lines after the checkpoint are forwarded, in order
    assert_eq!(received.recv().await.unwrap(), "second");
    assert_eq!(received.recv().await.unwrap(), "third");
    assert!(
        tokio::time::timeout(Duration::from_millis(200), received.recv())
            .await
            .is_err()
    );

    let store = h2.store.clone();
    eventually("counter reaches 3", || {
        let store = store.clone();
        async move { store.counter("app.log").await.unwrap() == 3 }
    })
    .await;
    h2.registry.stop_all().await;
}

#[tokio::test]
async fn test_stop_all_bounded_with_unresponsive_tasks() {
    // Given: five services stuck inside an inference call that never returns
    let h = harness(Arc::new(HangingBackend), |config| {
        config.stop_timeout = Duration::from_millis(500);
        config.transform_timeout = Duration::from_secs(3600);
    });
    std::fs::write(h.root.join("templates/all.yaml"), "name: all\n").unwrap();
    h.store
        .set_association("all", Some(ModelAssociation::new("tiny.gguf")))
        .await
        .unwrap();

    let mut keys = Vec::new();
    for i in 0..5 {
        let source = h.root.join(format!("svc{i}.log"));
        std::fs::write(&source, "record\n").unwrap();
        let key = register_source(&h.store, &source, "all", ACTIVE).await;
        h.store
            .save_checkpoint(&key, Checkpoint::Text { offset: 0 })
            .await
            .unwrap();
        keys.push(key);
    }
    h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(h.registry.live_count().await, 5);

    // let every task enter the hanging call
    tokio::time::sleep(Duration::from_millis(200)).await;

    // When: everything is stopped
    let started = Instant::now();
    let stopped = h.registry.stop_all().await;

    // Then: all five are gone within the shared join deadline
    assert_eq!(stopped, 5);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(h.registry.live_count().await, 0);
    for key in &keys {
        assert!(!h.registry.is_running(key).await);
    }
}

#[tokio::test]
async fn test_reconcile_loop_follows_state_changes() {
    // Given: a running reconciliation loop and an enabled, started service
    let h = Arc::new(harness(Arc::new(loglens_agent::DisabledBackend), |_| {}));
    let source = h.root.join("app.log");
    std::fs::write(&source, "").unwrap();
    let key = register_source(&h.store, &source, "raw", ACTIVE).await;

    let cancel = tokio_util::sync::CancellationToken::new();
    let loop_handle = {
        let h = h.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { h.reconciler.run(Duration::from_millis(50), cancel).await })
    };

    let registry = h.registry.clone();
    let k = key.clone();
    eventually("service started by loop", || {
        let registry = registry.clone();
        let k = k.clone();
        async move { registry.is_running(&k).await }
    })
    .await;

    // When: the user pauses the service
    h.store
        .set_button_state(
            &key,
            ButtonState {
                enabled: true,
                started: false,
            },
        )
        .await
        .unwrap();

    // Then: the loop stops it
    let registry = h.registry.clone();
    let k = key.clone();
    eventually("service stopped by loop", || {
        let registry = registry.clone();
        let k = k.clone();
        async move { !registry.is_running(&k).await }
    })
    .await;

    cancel.cancel();
    loop_handle.await.unwrap();
    h.registry.stop_all().await;
}
