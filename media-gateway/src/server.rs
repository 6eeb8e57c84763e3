//! HTTP surface for the Media Gateway
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


use crate::error::GatewayError;
use crate::health::health_check;
use crate::orchestrator::{Artifact, Credentials, RequestOrchestrator};
use crate::plans::Tier;
use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use reelgate_types::{mask_key, ProvisionRequest, ProvisionResponse, StatusResponse};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

pub const KEY_HEADER: &str = "x-key";
pub const DEVICE_HEADER: &str = "x-device";
pub const DEVICE_NAME_HEADER: &str = "x-device-name";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const TIER_HEADER: &str = "x-reelgate-tier";

/// Room for multipart framing on top of the file ceiling
const BODY_LIMIT_SLACK: u64 = 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<RequestOrchestrator>,
    admin_token: Option<Arc<str>>,
    default_duration_days: u32,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<RequestOrchestrator>,
        admin_token: Option<String>,
        default_duration_days: u32,
    ) -> Self {
        Self {
            orchestrator,
            admin_token: admin_token.map(Arc::from),
            default_duration_days,
        }
    }
}

/// Build the gateway router
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(
        state
            .orchestrator
            .max_upload_bytes()
            .saturating_add(BODY_LIMIT_SLACK),
    )
    .unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/me", get(me))
        .route(
            "/process",
            post(process).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/admin/keys", post(provision))
        .with_state(state)
}

/// Serve the router until Ctrl+C or SIGTERM
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind media gateway to {}: {}", addr, e))?;

    info!(addr = addr, "Media gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Media gateway server error: {}", e))?;

    info!("Media gateway stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal (Ctrl+C) received");
        },
        _ = terminate => {
            info!("Shutdown signal (SIGTERM) received");
        },
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn credentials_from_headers(headers: &HeaderMap) -> Credentials {
    Credentials::new(
        header_value(headers, KEY_HEADER),
        header_value(headers, DEVICE_HEADER),
        header_value(headers, DEVICE_NAME_HEADER),
    )
}

/// GET /me - entitlement status, binding the device on first use
async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, GatewayError> {
    let credentials = credentials_from_headers(&headers);
    let entitlement = state.orchestrator.authorize(&credentials).await?;
    Ok(Json(entitlement.to_status()))
}

/// POST /process - multipart `file` plus optional `plan`
async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, GatewayError> {
    let orchestrator = &state.orchestrator;
    let limit = orchestrator.max_upload_bytes();

    let credentials = credentials_from_headers(&headers);
    let entitlement = orchestrator.authorize(&credentials).await?;
    let mut multipart = multipart.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;

    let oversized = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map_or(false, |length| length > limit.saturating_add(BODY_LIMIT_SLACK));
    if oversized {
        warn!(key = %mask_key(&entitlement.key), "Rejecting oversized upload by content length");
        return Err(GatewayError::PayloadTooLarge { limit });
    }

    let to_gateway_error = |err: MultipartError| {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge { limit }
        } else {
            GatewayError::InvalidRequest(err.body_text())
        }
    };

    let mut workspace = orchestrator.open_workspace()?;
    let mut tier_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(to_gateway_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = workspace
                    .ingest(file_name.as_deref(), field.map_err(to_gateway_error), limit)
                    .await?;
                info!(
                    key = %mask_key(&entitlement.key),
                    request_id = %workspace.request_id(),
                    bytes,
                    "Upload received"
                );
            }
            Some("plan") => {
                tier_name = Some(field.text().await.map_err(to_gateway_error)?);
            }
            _ => {}
        }
    }

    let tier_name = tier_name.unwrap_or_else(|| Tier::DEFAULT.as_str().to_string());
    let artifact = orchestrator.transform(workspace, &tier_name).await?;
    artifact_response(artifact).await
}

async fn artifact_response(artifact: Artifact) -> Result<Response, GatewayError> {
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name());
    let tier = artifact.tier();
    let stream = artifact
        .into_stream()
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(TIER_HEADER, tier.as_str())
        .body(Body::from_stream(stream))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

/// POST /admin/keys - append a new unbound license
async fn provision(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProvisionResponse>), GatewayError> {
    check_admin(state.admin_token.as_deref(), &headers)?;
    let Json(request) = payload.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;

    let duration_days = request.duration_days.unwrap_or(state.default_duration_days);
    let record = state
        .orchestrator
        .engine()
        .provision(request.key.trim(), duration_days)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            key: mask_key(&record.key),
            duration_days: record.duration_days,
        }),
    ))
}

/// Compare digests so the check does not depend on token length
fn check_admin(expected: Option<&str>, headers: &HeaderMap) -> Result<(), GatewayError> {
    let expected = expected.ok_or(GatewayError::AdminForbidden)?;
    let provided = header_value(headers, ADMIN_TOKEN_HEADER).ok_or(GatewayError::AdminForbidden)?;

    if Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes()) {
        Ok(())
    } else {
        warn!("Rejected admin request with invalid token");
        Err(GatewayError::AdminForbidden)
    }
}
