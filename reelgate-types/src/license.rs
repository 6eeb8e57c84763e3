//! License records and the stored collection document

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ReelgateError, Result};

/// Validity window applied when a stored record omits `duration_days`
pub const DEFAULT_DURATION_DAYS: u32 = 30;

/// Longest validity window accepted for new records (100 years)
pub const MAX_DURATION_DAYS: u32 = 36_500;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A single license key and its device binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredRecord")]
pub struct LicenseRecord {
    pub key: String,
    pub duration_days: u32,
    #[serde(serialize_with = "timestamp::serialize")]
    pub activated_on: Option<DateTime<Utc>>,
    pub device_hash: Option<String>,
    pub device_name: Option<String>,
    #[serde(serialize_with = "timestamp::serialize")]
    pub last_used: Option<DateTime<Utc>>,
}

impl LicenseRecord {
    /// Create a new, unbound record
    pub fn new(key: impl Into<String>, duration_days: u32) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ReelgateError::Validation("license key must not be empty".to_string()));
        }
        if duration_days == 0 {
            return Err(ReelgateError::Validation(
                "duration_days must be positive".to_string(),
            ));
        }
        if duration_days > MAX_DURATION_DAYS {
            return Err(ReelgateError::Validation(format!(
                "duration_days must not exceed {}",
                MAX_DURATION_DAYS
            )));
        }

        Ok(Self {
            key,
            duration_days,
            activated_on: None,
            device_hash: None,
            device_name: None,
            last_used: None,
        })
    }

    /// True once a device has claimed this key
    pub fn is_bound(&self) -> bool {
        self.device_hash.is_some()
    }

    /// Whether `device_id` hashes to the bound device
    pub fn is_bound_to(&self, device_id: &str) -> bool {
        self.device_hash.as_deref() == Some(hash_device(device_id).as_str())
    }

    /// Claim the key for a device. Keeps an existing `activated_on`.
    ///
    /// Returns `false` without touching the record if it is already bound.
    pub fn bind(&mut self, device_id: &str, device_name: Option<&str>, now: DateTime<Utc>) -> bool {
        if self.is_bound() {
            return false;
        }

        self.device_hash = Some(hash_device(device_id));
        self.device_name = device_name.map(str::to_string);
        if self.activated_on.is_none() {
            self.activated_on = Some(now);
        }
        true
    }

    /// `activated_on + duration_days`, or `None` while unactivated
    ///
    /// Windows past the end of the calendar saturate, so such a record never
    /// expires.
    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.activated_on.map(|start| {
            start
                .checked_add_signed(Duration::days(i64::from(self.duration_days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Unactivated records count as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_on() {
            Some(expires_on) => now >= expires_on,
            None => true,
        }
    }

    /// Whole days remaining, rounded up, never negative
    pub fn days_left_at(&self, now: DateTime<Utc>) -> i64 {
        match self.expires_on() {
            Some(expires_on) => {
                let remaining = (expires_on - now).num_seconds();
                if remaining <= 0 {
                    0
                } else {
                    (remaining + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
                }
            }
            None => 0,
        }
    }
}

/// On-disk shape of a record. Accepts documents written by older
/// deployments: missing `duration_days`, naive timestamps, and a raw
/// `device_id` in place of `device_hash`.
#[derive(Deserialize)]
struct StoredRecord {
    key: String,
    #[serde(default = "default_duration_days")]
    duration_days: u32,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    activated_on: Option<DateTime<Utc>>,
    #[serde(default)]
    device_hash: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    last_used: Option<DateTime<Utc>>,
}

fn default_duration_days() -> u32 {
    DEFAULT_DURATION_DAYS
}

impl From<StoredRecord> for LicenseRecord {
    fn from(stored: StoredRecord) -> Self {
        let device_hash = stored
            .device_hash
            .or_else(|| stored.device_id.as_deref().map(hash_device));

        Self {
            key: stored.key,
            duration_days: stored.duration_days,
            activated_on: stored.activated_on,
            device_hash,
            device_name: stored.device_name,
            last_used: stored.last_used,
        }
    }
}

/// The full list of license records, saved and loaded as one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCollection {
    #[serde(default)]
    pub codes: Vec<LicenseRecord>,
}

impl LicenseCollection {
    pub fn new(codes: Vec<LicenseRecord>) -> Self {
        Self { codes }
    }

    pub fn find(&self, key: &str) -> Option<&LicenseRecord> {
        self.codes.iter().find(|record| record.key == key)
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut LicenseRecord> {
        self.codes.iter_mut().find(|record| record.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Append a record, rejecting a key that is already present
    pub fn insert(&mut self, record: LicenseRecord) -> Result<()> {
        if self.contains(&record.key) {
            return Err(ReelgateError::DuplicateKey(mask_key(&record.key)));
        }
        self.codes.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Lowercase hex SHA-256 of a caller-supplied device identifier
pub fn hash_device(device_id: &str) -> String {
    hex::encode(Sha256::digest(device_id.as_bytes()))
}

/// Key form safe for logs and status echoes
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}****{}", head, tail)
}

/// RFC 3339 on write; RFC 3339 or naive UTC on read
pub mod timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_some(&at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.filter(|value| !value.trim().is_empty())
            .map(|value| parse(&value).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Ok(at.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| ReelgateError::InvalidTimestamp(raw.to_string()))
    }
}
