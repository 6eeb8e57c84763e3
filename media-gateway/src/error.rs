//! Gateway error taxonomy and its HTTP mapping
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


use crate::entitlement::EntitlementError;
use crate::plans::Tier;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reelgate_types::{ErrorBody, TransformFailure};
use thiserror::Error;

/// Everything a request can fail with
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing license key or device identifier")]
    Unauthenticated,

    #[error("license key not found")]
    KeyNotFound,

    #[error("license key is bound to another device")]
    DeviceMismatch,

    #[error("license expired")]
    Expired,

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{tier} transform failed: {message}")]
    TransformFailed {
        tier: Tier,
        message: String,
        escalation: Option<Tier>,
    },

    #[error("admin credential missing or invalid")]
    AdminForbidden,

    #[error("license key already exists")]
    DuplicateKey,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::KeyNotFound => StatusCode::NOT_FOUND,
            GatewayError::DeviceMismatch | GatewayError::Expired => StatusCode::FORBIDDEN,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::TransformFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::AdminForbidden => StatusCode::FORBIDDEN,
            GatewayError::DuplicateKey => StatusCode::CONFLICT,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated => "UNAUTHENTICATED",
            GatewayError::KeyNotFound => "KEY_NOT_FOUND",
            GatewayError::DeviceMismatch => "DEVICE_MISMATCH",
            GatewayError::Expired => "EXPIRED",
            GatewayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            GatewayError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            GatewayError::TransformFailed { .. } => "TRANSFORM_FAILED",
            GatewayError::AdminForbidden => "ADMIN_FORBIDDEN",
            GatewayError::DuplicateKey => "DUPLICATE_KEY",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<EntitlementError> for GatewayError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::KeyNotFound => GatewayError::KeyNotFound,
            EntitlementError::DeviceMismatch => GatewayError::DeviceMismatch,
            EntitlementError::Expired { .. } => GatewayError::Expired,
            EntitlementError::DuplicateKey => GatewayError::DuplicateKey,
            EntitlementError::Invalid(message) => GatewayError::InvalidRequest(message),
            EntitlementError::StoreUnavailable(reason) => GatewayError::StoreUnavailable(reason),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            GatewayError::TransformFailed { tier, message, escalation } => {
                let body = TransformFailure::new(
                    tier.as_str(),
                    message,
                    escalation.map(|next| next.as_str().to_string()),
                );
                (status, Json(body)).into_response()
            }
            other => {
                let body = ErrorBody {
                    code: other.error_code().to_string(),
                    message: other.to_string(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
