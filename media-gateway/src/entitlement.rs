//! Entitlement Engine - key lookup, device binding, expiry
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


use chrono::{DateTime, Utc};
use reelgate_store::{LoadOutcome, RecordStore};
use reelgate_types::{mask_key, LicenseCollection, LicenseRecord, StatusResponse};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Process-wide lock serializing every load-mutate-save cycle
///
/// Only protects writers inside this process. A second instance writing the
/// same remote document can still interleave with us.
pub type StoreLock = Arc<Mutex<()>>;

pub fn new_store_lock() -> StoreLock {
    Arc::new(Mutex::new(()))
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Entitlement failures. None are retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntitlementError {
    #[error("license key not found")]
    KeyNotFound,

    #[error("license key is bound to another device")]
    DeviceMismatch,

    #[error("license expired")]
    Expired { expired_on: Option<DateTime<Utc>> },

    #[error("license key already exists")]
    DuplicateKey,

    #[error("invalid license: {0}")]
    Invalid(String),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;

/// Successful authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub key: String,
    pub device_name: Option<String>,
    pub activated_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    pub days_left: i64,
    pub last_used: DateTime<Utc>,
    /// True when this call claimed the key
    pub newly_bound: bool,
}

impl Entitlement {
    /// Status body with the key masked
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            status: "ok".to_string(),
            key: mask_key(&self.key),
            device_name: self.device_name.clone(),
            activated_on: Some(self.activated_on),
            expires_on: Some(self.expires_on),
            active: true,
            days_left: self.days_left,
            last_used: Some(self.last_used),
        }
    }
}

/// Gates access on key, device binding and expiry
pub struct EntitlementEngine {
    store: Arc<dyn RecordStore>,
    lock: StoreLock,
    clock: Arc<dyn Clock>,
}

impl EntitlementEngine {
    /// Create an engine over an injected store and lock
    pub fn new(store: Arc<dyn RecordStore>, lock: StoreLock) -> Self {
        Self {
            store,
            lock,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate `key` for `device_id`, binding it on first use
    ///
    /// Writes once when the key is first bound (even if it then turns out to
    /// be expired) and once per successful call to record `last_used`.
    /// Rejections for unknown keys, other devices and expiry never write.
    pub async fn authorize(
        &self,
        key: &str,
        device_id: &str,
        device_label: Option<&str>,
    ) -> EntitlementResult<Entitlement> {
        let _guard = self.lock.lock().await;
        let masked = mask_key(key);

        let mut collection = self.load_collection().await?;
        let now = self.clock.now();

        let record = collection
            .find_mut(key)
            .ok_or(EntitlementError::KeyNotFound)?;

        let newly_bound = if record.is_bound() {
            if !record.is_bound_to(device_id) {
                warn!(key = %masked, "Device mismatch for bound license");
                return Err(EntitlementError::DeviceMismatch);
            }
            false
        } else {
            record.bind(device_id, device_label, now)
        };

        if record.is_expired_at(now) {
            let expired_on = record.expires_on();
            if newly_bound {
                // The claim stands even though the key cannot be used
                self.persist(&collection).await?;
            }
            info!(key = %masked, "License expired");
            return Err(EntitlementError::Expired { expired_on });
        }

        record.last_used = Some(now);
        let entitlement = Self::entitlement_for(record, now, newly_bound)?;
        self.persist(&collection).await?;

        if newly_bound {
            info!(
                key = %masked,
                device_name = entitlement.device_name.as_deref().unwrap_or("-"),
                expires_on = %entitlement.expires_on,
                "License bound to device"
            );
        } else {
            debug!(key = %masked, days_left = entitlement.days_left, "License authorized");
        }

        Ok(entitlement)
    }

    /// Append a new unbound record
    pub async fn provision(&self, key: &str, duration_days: u32) -> EntitlementResult<LicenseRecord> {
        let record = LicenseRecord::new(key, duration_days)
            .map_err(|e| EntitlementError::Invalid(e.to_string()))?;

        let _guard = self.lock.lock().await;
        let mut collection = self.load_collection().await?;

        if collection.contains(key) {
            return Err(EntitlementError::DuplicateKey);
        }
        collection
            .insert(record.clone())
            .map_err(|_| EntitlementError::DuplicateKey)?;
        self.persist(&collection).await?;

        info!(key = %mask_key(key), duration_days, "License provisioned");
        Ok(record)
    }

    /// Degraded loads are refused so an outage never reads as "no such key"
    /// and never lets a save overwrite the remote document with an empty one.
    async fn load_collection(&self) -> EntitlementResult<LicenseCollection> {
        match self.store.load().await {
            LoadOutcome::Fresh(collection) => Ok(collection),
            LoadOutcome::Degraded { reason } => {
                warn!(
                    backend = self.store.backend_name(),
                    reason = %reason,
                    "Record store degraded"
                );
                Err(EntitlementError::StoreUnavailable(reason))
            }
        }
    }

    async fn persist(&self, collection: &LicenseCollection) -> EntitlementResult<()> {
        self.store.save(collection).await.map_err(|e| {
            warn!(backend = self.store.backend_name(), error = %e, "Failed to save license document");
            EntitlementError::StoreUnavailable(e.to_string())
        })
    }

    fn entitlement_for(
        record: &LicenseRecord,
        now: DateTime<Utc>,
        newly_bound: bool,
    ) -> EntitlementResult<Entitlement> {
        match (record.activated_on, record.expires_on()) {
            (Some(activated_on), Some(expires_on)) => Ok(Entitlement {
                key: record.key.clone(),
                device_name: record.device_name.clone(),
                activated_on,
                expires_on,
                days_left: record.days_left_at(now),
                last_used: now,
                newly_bound,
            }),
            _ => Err(EntitlementError::Invalid("record has no activation time".to_string())),
        }
    }
}
