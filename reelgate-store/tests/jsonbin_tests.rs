//! JSONBin Record Store Tests

use reelgate_config::RecordStoreConfig;
use reelgate_store::{JsonBinStore, LoadOutcome, RecordStore, StoreError};
use reelgate_types::{hash_device, LicenseCollection, LicenseRecord};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> JsonBinStore {
    let config = RecordStoreConfig {
        base_url: format!("{}/v3/b", server.uri()),
        bin_id: "licenses".to_string(),
        master_key: "master-secret".to_string(),
        timeout_secs: 2,
    };
    JsonBinStore::new(&config).unwrap()
}

#[tokio::test]
async fn test_load_decodes_record_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/b/licenses"))
        .and(header("X-Master-Key", "master-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "record": {
                "codes": [
                    {"key": "ABC123", "duration_days": 30},
                    {"key": "XYZ789", "device_id": "dev-1", "activated_on": "2025-01-01T00:00:00"}
                ]
            },
            "metadata": {"id": "licenses", "private": true}
        })))
        .mount(&server)
        .await;

    let collection = match store_for(&server).load().await {
        LoadOutcome::Fresh(collection) => collection,
        other => panic!("expected fresh load, got {:?}", other),
    };

    assert_eq!(collection.len(), 2);
    assert!(!collection.find("ABC123").unwrap().is_bound());
    let legacy = collection.find("XYZ789").unwrap();
    assert_eq!(legacy.device_hash, Some(hash_device("dev-1")));
    assert_eq!(legacy.duration_days, 30);
}

#[tokio::test]
async fn test_load_without_codes_is_empty_but_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/b/licenses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"record": {}})))
        .mount(&server)
        .await;

    let outcome = store_for(&server).load().await;
    assert_eq!(outcome, LoadOutcome::Fresh(LicenseCollection::default()));
}

#[tokio::test]
async fn test_load_not_found_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/b/licenses"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let outcome = store_for(&server).load().await;
    assert!(outcome.is_degraded());
    assert!(outcome.into_collection().is_empty());
}

#[tokio::test]
async fn test_load_malformed_payload_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/b/licenses"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    assert!(store_for(&server).load().await.is_degraded());
}

#[tokio::test]
async fn test_load_server_error_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(store_for(&server).load().await.is_degraded());
}

#[tokio::test]
async fn test_load_unreachable_degrades() {
    let config = RecordStoreConfig {
        // Reserved port; nothing listens here
        base_url: "http://127.0.0.1:9/v3/b".to_string(),
        bin_id: "licenses".to_string(),
        master_key: "master-secret".to_string(),
        timeout_secs: 1,
    };
    let store = JsonBinStore::new(&config).unwrap();

    assert!(store.load().await.is_degraded());
}

#[tokio::test]
async fn test_save_puts_whole_document() {
    let server = MockServer::start().await;
    let collection = LicenseCollection::new(vec![LicenseRecord::new("ABC123", 30).unwrap()]);

    Mock::given(method("PUT"))
        .and(path("/v3/b/licenses"))
        .and(header("X-Master-Key", "master-secret"))
        .and(body_json(json!({
            "codes": [{
                "key": "ABC123",
                "duration_days": 30,
                "activated_on": null,
                "device_hash": null,
                "device_name": null,
                "last_used": null
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"record": {}})))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server).save(&collection).await.unwrap();
}

#[tokio::test]
async fn test_save_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid master key"))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .save(&LicenseCollection::default())
        .await
        .unwrap_err();

    match err {
        StoreError::Rejected { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid master key"));
        }
        other => panic!("unexpected error: {}", other),
    }
}
