//! RemoteStore against a live in-process server.

#![cfg(feature = "http-server")]

mod common;

use common::{TestStore, axis, encoder, random_unit_vector, write_solid_image};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use vindex::engine::SearchEngine;
use vindex::vector::VectorDimension;
use vindex::{Metric, Record, RecordId, RemoteStore, VectorStore, VindexError};

/// Server on an ephemeral port, stopped on drop.
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    _fixture: TestStore,
}

impl TestServer {
    fn start() -> Self {
        Self::with_body_limit(vindex::config::default_max_body_bytes())
    }

    fn with_body_limit(max_body_bytes: usize) -> Self {
        let fixture = TestStore::new();
        let store = fixture.store.clone();
        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("Failed to build runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("Failed to bind");
                addr_tx
                    .send(listener.local_addr().expect("local addr"))
                    .expect("Failed to report addr");
                vindex::server::serve_on(listener, store, max_body_bytes, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server failed");
            });
        });

        let addr = addr_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("server did not start");
        Self {
            addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            _fixture: fixture,
        }
    }

    fn client(&self) -> Arc<dyn VectorStore> {
        Arc::new(self.remote())
    }

    fn remote(&self) -> RemoteStore {
        RemoteStore::connect("127.0.0.1", self.addr.port(), Duration::from_secs(10))
            .expect("Failed to build client")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[test]
fn test_health() {
    let server = TestServer::start();
    let health = server.remote().health().unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_remote_round_trip() {
    let server = TestServer::start();
    let store = server.client();
    let dim = VectorDimension::new(3).unwrap();

    let info = store.ensure_collection("remote", dim, Metric::Cosine).unwrap();
    assert_eq!(info.count, 0);

    let records = vec![
        Record::new(RecordId::new(0), "x.png", axis(3, 0)),
        Record::new(RecordId::new(1), "y.png", axis(3, 1)),
        Record::new(RecordId::new(2), "z.png", vec![0.6, 0.8, 0.0]),
    ];
    assert_eq!(store.insert("remote", &records).unwrap(), 3);
    assert_eq!(store.count("remote").unwrap(), 3);

    let hits = store.search("remote", &axis(3, 1), 2, 0.0).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, RecordId::new(1));
    assert_eq!(hits[0].path, "y.png");
    assert_eq!(hits[1].id, RecordId::new(2));

    let described = store.describe("remote").unwrap();
    assert_eq!(described.dimension, dim);
    assert_eq!(described.count, 3);

    store.drop_collection("remote").unwrap();
    assert!(matches!(
        store.count("remote"),
        Err(VindexError::CollectionNotFound { .. })
    ));
}

#[test]
fn test_remote_errors_keep_their_kind() {
    let server = TestServer::start();
    let store = server.client();
    let dim = VectorDimension::new(3).unwrap();
    store.ensure_collection("c", dim, Metric::Cosine).unwrap();
    store
        .insert("c", &[Record::new(RecordId::new(7), "a.png", axis(3, 0))])
        .unwrap();

    match store.insert("c", &[Record::new(RecordId::new(7), "b.png", axis(3, 1))]) {
        Err(VindexError::DuplicateId { id, .. }) => assert_eq!(id, RecordId::new(7)),
        other => panic!("expected duplicate id, got {other:?}"),
    }

    assert!(matches!(
        store.ensure_collection("c", VectorDimension::new(4).unwrap(), Metric::Cosine),
        Err(VindexError::CollectionDimensionMismatch {
            existing: 3,
            requested: 4,
            ..
        })
    ));
    assert!(matches!(
        store.ensure_collection("c", dim, Metric::InnerProduct),
        Err(VindexError::CollectionMetricMismatch { .. })
    ));
    assert!(matches!(
        store.search("missing", &axis(3, 0), 1, 0.0),
        Err(VindexError::CollectionNotFound { .. })
    ));
    assert!(matches!(
        store.search("c", &[1.0, 0.0], 1, 0.0),
        Err(VindexError::DimensionMismatch { .. })
    ));
}

fn wide_batch(count: u64, dim: usize) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(11);
    (0..count)
        .map(|id| Record::new(RecordId::new(id), format!("wide_{id}.png"), random_unit_vector(&mut rng, dim)))
        .collect()
}

#[test]
fn test_insert_batch_larger_than_two_megabytes() {
    let server = TestServer::start();
    let store = server.client();
    store
        .ensure_collection("wide", VectorDimension::new(768).unwrap(), Metric::Cosine)
        .unwrap();

    let records = wide_batch(320, 768);
    assert!(serde_json::to_vec(&records).unwrap().len() > 2 * 1024 * 1024);

    assert_eq!(store.insert("wide", &records).unwrap(), 320);
    assert_eq!(store.count("wide").unwrap(), 320);
    let hits = store.search("wide", &records[17].vector, 1, 0.0).unwrap();
    assert_eq!(hits[0].id, RecordId::new(17));
}

#[test]
fn test_body_limit_follows_configuration() {
    let server = TestServer::with_body_limit(64 * 1024);
    let store = server.client();
    store
        .ensure_collection("wide", VectorDimension::new(768).unwrap(), Metric::Cosine)
        .unwrap();

    assert!(matches!(
        store.insert("wide", &wide_batch(32, 768)),
        Err(VindexError::Backend { .. })
    ));
    assert_eq!(store.count("wide").unwrap(), 0);
    assert_eq!(store.insert("wide", &wide_batch(1, 768)).unwrap(), 1);
}

#[test]
fn test_engine_over_remote_store() {
    let server = TestServer::start();
    let scratch = TestStore::new();
    let folder = scratch.dir.path().join("photos");
    write_solid_image(&folder, "cat.png", [255, 0, 0]);
    write_solid_image(&folder, "dog.png", [0, 255, 0]);

    let engine = SearchEngine::new(encoder(), server.client(), "pets", Metric::Cosine).unwrap();
    let report = engine.index_folder(&folder, false, 8).unwrap();
    assert_eq!(report.indexed, 2);

    let hits = engine.search_by_text("dog", 1, 0.0).unwrap();
    assert!(hits[0].path.ends_with("dog.png"));
}

#[test]
fn test_unreachable_server_is_backend_error() {
    let store = RemoteStore::connect("127.0.0.1", 1, Duration::from_millis(500)).unwrap();
    assert!(matches!(
        store.count("c"),
        Err(VindexError::Backend { .. })
    ));
}
