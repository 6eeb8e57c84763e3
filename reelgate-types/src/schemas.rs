//! Response and request bodies for the gateway HTTP surface
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
use serde::{Deserialize, Serialize};

// ============================================================================
// Entitlement
// ============================================================================

/// Body of `GET /me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    /// Masked key echo
    pub key: String,
    pub device_name: Option<String>,
    pub activated_on: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub active: bool,
    pub days_left: i64,
    pub last_used: Option<DateTime<Utc>>,
}

// ============================================================================
// Transform
// ============================================================================

/// Body returned when the external transform fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformFailure {
    /// Always `"failed"`
    pub status: String,
    pub message: String,
    pub tier: String,
    /// Next tier worth trying, if any
    pub escalation: Option<String>,
}

impl TransformFailure {
    pub fn new(tier: impl Into<String>, message: impl Into<String>, escalation: Option<String>) -> Self {
        Self {
            status: "failed".to_string(),
            message: message.into(),
            tier: tier.into(),
            escalation,
        }
    }
}

// ============================================================================
// Administration
// ============================================================================

/// Body of `POST /admin/keys`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub key: String,
    #[serde(default)]
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub key: String,
    pub duration_days: u32,
}

/// Generic error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
