//! Load Tests for the license gate
//!
//! These tests simulate high load scenarios:
//! - Many devices racing for the same unbound keys
//! - Sustained authorization throughput on bound keys
//!
//! Run with: cargo test --test load_test --release -- --ignored

use media_gateway::{new_store_lock, EntitlementEngine, EntitlementError};
use reelgate_store::MemoryStore;
use reelgate_types::{LicenseCollection, LicenseRecord};
use std::sync::Arc;
use std::time::Instant;

fn engine_with_keys(count: usize) -> (Arc<EntitlementEngine>, Arc<MemoryStore>) {
    let records = (0..count)
        .map(|i| LicenseRecord::new(format!("LOAD-{:05}", i), 30).expect("valid record"))
        .collect();
    let store = Arc::new(MemoryStore::with_collection(LicenseCollection::new(records)));
    let engine = Arc::new(EntitlementEngine::new(store.clone(), new_store_lock()));
    (engine, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore] // Should be run manually
async fn test_contended_first_use() {
    let keys = 50;
    let devices_per_key = 20;
    let (engine, store) = engine_with_keys(keys);

    let start = Instant::now();
    let mut handles = Vec::new();
    for k in 0..keys {
        for d in 0..devices_per_key {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .authorize(&format!("LOAD-{:05}", k), &format!("device-{}-{}", k, d), None)
                    .await
            }));
        }
    }

    let mut granted = 0;
    let mut mismatched = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => granted += 1,
            Err(EntitlementError::DeviceMismatch) => mismatched += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    println!("Resolved {} claims in {:?}", keys * devices_per_key, start.elapsed());

    assert_eq!(granted, keys);
    assert_eq!(mismatched, keys * (devices_per_key - 1));
    // One bind write per key, nothing for the losers
    assert_eq!(store.save_count(), keys);
    assert!(store.snapshot().await.codes.iter().all(|record| record.is_bound()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore] // Should be run manually
async fn test_bound_key_throughput() {
    let (engine, _store) = engine_with_keys(1_000);
    for i in 0..1_000 {
        engine
            .authorize(&format!("LOAD-{:05}", i), &format!("device-{}", i), None)
            .await
            .expect("bind");
    }

    let requests = 10_000;
    let start = Instant::now();
    let mut handles = Vec::new();
    for n in 0..requests {
        let engine = Arc::clone(&engine);
        let i = n % 1_000;
        handles.push(tokio::spawn(async move {
            engine
                .authorize(&format!("LOAD-{:05}", i), &format!("device-{}", i), None)
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked").expect("authorize");
    }

    let elapsed = start.elapsed();
    let per_second = requests as f64 / elapsed.as_secs_f64();
    println!("Authorized {} requests in {:?} ({:.0}/s)", requests, elapsed, per_second);

    assert!(per_second > 500.0, "Throughput too low: {:.0}/s", per_second);
}
