//! In-process license document
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{StoreError, StoreResult};
use crate::gateway::{LoadOutcome, RecordStore};
use async_trait::async_trait;
use reelgate_types::LicenseCollection;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Record store held in memory
///
/// Used when no remote store is configured and as the test double for the
/// entitlement engine. Counts round trips and can simulate outages.
#[derive(Default)]
pub struct MemoryStore {
    document: RwLock<LicenseCollection>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    unavailable: AtomicBool,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(collection: LicenseCollection) -> Self {
        Self {
            document: RwLock::new(collection),
            ..Self::default()
        }
    }

    /// Current document, without counting a load
    pub async fn snapshot(&self) -> LicenseCollection {
        self.document.read().await.clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make loads degrade as if the remote were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make saves fail
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self) -> LoadOutcome {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return LoadOutcome::degraded("memory store marked unavailable");
        }
        LoadOutcome::Fresh(self.document.read().await.clone())
    }

    async fn save(&self, collection: &LicenseCollection) -> StoreResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store rejecting writes".to_string(),
            ));
        }
        *self.document.write().await = collection.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
