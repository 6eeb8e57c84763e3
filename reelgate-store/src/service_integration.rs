//! Record store wiring for services
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


use crate::error::StoreResult;
use crate::gateway::RecordStore;
use crate::jsonbin::JsonBinStore;
use crate::memory::MemoryStore;
use reelgate_config::RecordStoreConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Initialize the record store for a service
///
/// Falls back to an empty in-memory document when no remote store is
/// configured. Records provisioned there are lost on restart.
pub fn init_record_store(config: Option<&RecordStoreConfig>) -> StoreResult<Arc<dyn RecordStore>> {
    match config {
        Some(config) => {
            let store = JsonBinStore::new(config)?;
            info!(backend = store.backend_name(), "Record store initialized");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No JSONBIN_* configuration found, using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
