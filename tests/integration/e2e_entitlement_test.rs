//! End-to-end tests for the license gate
//!
//! Runs the gateway router against the JSONBin record store, with an
//! in-process fake JSONBin server holding the license document.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use media_gateway::plans::{Arg, InvocationTemplate};
use media_gateway::{
    new_store_lock, router, AppState, EntitlementEngine, PlanCatalog, RequestOrchestrator,
    Transcoder,
};
use reelgate_config::RecordStoreConfig;
use reelgate_store::{JsonBinStore, RecordStore};
use reelgate_types::{hash_device, LicenseCollection, LicenseRecord};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceExt;

const MASTER_KEY: &str = "$2b$10$test-master-key";
const BIN_ID: &str = "65f0c0ffee";

/// Minimal stand-in for the JSONBin v3 API
#[derive(Clone)]
struct FakeJsonBin {
    document: Arc<Mutex<Value>>,
    writes: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
    base_url: String,
}

impl FakeJsonBin {
    async fn start(collection: LicenseCollection) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake JSONBin");
        let addr = listener.local_addr().unwrap();

        let fake = Self {
            document: Arc::new(Mutex::new(serde_json::to_value(&collection).unwrap())),
            writes: Arc::new(AtomicUsize::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
            base_url: format!("http://{}/v3/b", addr),
        };

        let app = Router::new()
            .route("/v3/b/:bin", get(read_bin).put(write_bin))
            .with_state(fake.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        fake
    }

    fn store_config(&self) -> RecordStoreConfig {
        RecordStoreConfig {
            base_url: self.base_url.clone(),
            bin_id: BIN_ID.to_string(),
            master_key: MASTER_KEY.to_string(),
            timeout_secs: 5,
        }
    }

    fn store(&self) -> Arc<dyn RecordStore> {
        Arc::new(JsonBinStore::new(&self.store_config()).expect("store config"))
    }

    async fn collection(&self) -> LicenseCollection {
        serde_json::from_value(self.document.lock().await.clone()).unwrap()
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-master-key")
        .and_then(|value| value.to_str().ok())
        == Some(MASTER_KEY)
}

async fn read_bin(State(fake): State<FakeJsonBin>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if fake.offline.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let record = fake.document.lock().await.clone();
    Json(json!({ "record": record, "metadata": { "id": BIN_ID, "private": true } })).into_response()
}

async fn write_bin(
    State(fake): State<FakeJsonBin>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if fake.offline.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    *fake.document.lock().await = body.clone();
    fake.writes.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "record": body, "metadata": { "parentId": BIN_ID } })).into_response()
}

fn gateway(store: Arc<dyn RecordStore>, script: &str, work: &TempDir) -> Router {
    let engine = Arc::new(EntitlementEngine::new(store, new_store_lock()));
    let stub = InvocationTemplate::new(
        "/bin/sh",
        vec![Arg::lit("-c"), Arg::lit(script), Arg::Input, Arg::Output],
    );
    let orchestrator = RequestOrchestrator::new(
        engine,
        PlanCatalog::uniform(stub),
        Transcoder::new(Duration::from_secs(10)),
        64 * 1024,
    )
    .with_work_dir(Some(work.path().to_path_buf()));

    router(AppState::new(Arc::new(orchestrator), None, 30))
}

fn me(key: &str, device: &str) -> Request<Body> {
    Request::builder()
        .uri("/me")
        .header("x-key", key)
        .header("x-device", device)
        .body(Body::empty())
        .unwrap()
}

fn seed() -> LicenseCollection {
    LicenseCollection::new(vec![
        LicenseRecord::new("ABC123", 30).unwrap(),
        LicenseRecord::new("SPARE-KEY-01", 7).unwrap(),
    ])
}

#[tokio::test]
async fn test_concurrent_first_use_binds_exactly_one_device() {
    let fake = FakeJsonBin::start(seed()).await;
    let work = TempDir::new().unwrap();
    let app = gateway(fake.store(), r#"cp "$0" "$1""#, &work);

    let requests = (0..8).map(|i| {
        let app = app.clone();
        async move {
            let device = format!("device-{}", i);
            let status = app.oneshot(me("ABC123", &device)).await.unwrap().status();
            (device, status)
        }
    });
    let results = futures::future::join_all(requests).await;

    let winners: Vec<&String> = results
        .iter()
        .filter(|(_, status)| *status == StatusCode::OK)
        .map(|(device, _)| device)
        .collect();
    assert_eq!(winners.len(), 1, "results: {:?}", results);
    assert!(results
        .iter()
        .filter(|(_, status)| *status != StatusCode::OK)
        .all(|(_, status)| *status == StatusCode::FORBIDDEN));

    let stored = fake.collection().await;
    let record = stored.find("ABC123").unwrap();
    assert_eq!(record.device_hash.as_deref(), Some(hash_device(winners[0]).as_str()));
    assert!(record.activated_on.is_some());
    assert!(!stored.find("SPARE-KEY-01").unwrap().is_bound());
}

#[tokio::test]
async fn test_binding_survives_gateway_restart() {
    let fake = FakeJsonBin::start(seed()).await;
    let work = TempDir::new().unwrap();

    let first = gateway(fake.store(), r#"cp "$0" "$1""#, &work);
    let response = first.oneshot(me("ABC123", "studio-mac")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let second = gateway(fake.store(), r#"cp "$0" "$1""#, &work);
    let response = second.clone().oneshot(me("ABC123", "studio-mac")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = second.oneshot(me("ABC123", "laptop")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_outage_never_overwrites_document() {
    let fake = FakeJsonBin::start(seed()).await;
    let work = TempDir::new().unwrap();
    let app = gateway(fake.store(), r#"cp "$0" "$1""#, &work);

    fake.set_offline(true);
    let response = app.clone().oneshot(me("ABC123", "studio-mac")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(fake.writes(), 0);

    fake.set_offline(false);
    assert_eq!(fake.collection().await, seed());
    let response = app.oneshot(me("ABC123", "studio-mac")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fake.writes(), 1);
}

#[tokio::test]
async fn test_wrong_master_key_is_unavailable() {
    let fake = FakeJsonBin::start(seed()).await;
    let work = TempDir::new().unwrap();
    let mut config = fake.store_config();
    config.master_key = "not-the-key".to_string();
    let store: Arc<dyn RecordStore> = Arc::new(JsonBinStore::new(&config).unwrap());

    let response = gateway(store, r#"cp "$0" "$1""#, &work)
        .oneshot(me("ABC123", "studio-mac"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(fake.writes(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_round_trip_through_remote_store() {
    let fake = FakeJsonBin::start(seed()).await;
    let work = TempDir::new().unwrap();
    let app = gateway(fake.store(), r#"cp "$0" "$1""#, &work);

    let boundary = "e2e-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"plan\"\r\n\r\nultra\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"take1.mp4\"\r\n\
         Content-Type: video/mp4\r\n\r\nframe-data\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/process")
        .header("content-type", format!("multipart/form-data; boundary={}", boundary))
        .header("x-key", "SPARE-KEY-01")
        .header("x-device", "render-node")
        .header("x-device-name", "Render Node")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-reelgate-tier"], "ultra");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"frame-data");

    let stored = fake.collection().await;
    let record = stored.find("SPARE-KEY-01").unwrap();
    assert!(record.is_bound_to("render-node"));
    assert_eq!(record.device_name.as_deref(), Some("Render Node"));
    assert!(record.last_used.is_some());
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}
