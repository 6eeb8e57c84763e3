//! JSONBin-backed license document
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
use reelgate_config::RecordStoreConfig;
use reelgate_types::LicenseCollection;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const MASTER_KEY_HEADER: &str = "X-Master-Key";

/// Read envelope: `{"record": {...}, "metadata": {...}}`
#[derive(Deserialize)]
struct ReadEnvelope {
    #[serde(default)]
    record: LicenseCollection,
}

/// License document stored in a single JSONBin bin
pub struct JsonBinStore {
    client: Client,
    document_url: String,
    master_key: String,
}

impl JsonBinStore {
    /// Create a store for the configured bin
    pub fn new(config: &RecordStoreConfig) -> StoreResult<Self> {
        if config.master_key.is_empty() {
            return Err(StoreError::Configuration(
                "JSONBin master key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!(url = %config.document_url(), "JSONBin record store configured");

        Ok(Self {
            client,
            document_url: config.document_url(),
            master_key: config.master_key.clone(),
        })
    }

    async fn fetch(&self) -> Result<LicenseCollection, String> {
        let response = self
            .client
            .get(&self.document_url)
            .header(MASTER_KEY_HEADER, &self.master_key)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err("license document not found".to_string());
        }
        if !status.is_success() {
            return Err(format!("unexpected status {}", status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;

        serde_json::from_slice::<ReadEnvelope>(&body)
            .map(|envelope| envelope.record)
            .map_err(|e| format!("malformed license document: {}", e))
    }
}

#[async_trait]
impl RecordStore for JsonBinStore {
    async fn load(&self) -> LoadOutcome {
        match self.fetch().await {
            Ok(collection) => {
                debug!(records = collection.len(), "Loaded license document");
                LoadOutcome::Fresh(collection)
            }
            Err(reason) => {
                warn!(reason = %reason, "License document unavailable, serving degraded");
                LoadOutcome::degraded(reason)
            }
        }
    }

    async fn save(&self, collection: &LicenseCollection) -> StoreResult<()> {
        let body = serde_json::to_vec(collection)?;

        let response = self
            .client
            .put(&self.document_url)
            .header(MASTER_KEY_HEADER, &self.master_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "License document write rejected");
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(records = collection.len(), "Saved license document");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "jsonbin"
    }
}
