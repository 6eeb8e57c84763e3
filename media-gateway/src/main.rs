//! Media Gateway
//!
//! License-gated video transform service:
//! - Checks license keys and binds them to a device on first use
//! - Accepts an uploaded clip and a quality tier
//! - Runs FFmpeg for the tier and streams the result back
//! - Lets an operator provision new keys
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


use anyhow::Result;
use media_gateway::{
    new_store_lock, server, AppState, EntitlementEngine, PlanCatalog, RequestOrchestrator,
    Transcoder,
};
use reelgate_config::AppConfig;
use reelgate_logging::init_service_logging;
use reelgate_store::init_record_store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_service_logging("media-gateway", config.log_level(), config.json_logs());

    info!("Starting Media Gateway");

    let store = init_record_store(config.record_store.as_ref())
        .map_err(|e| anyhow::anyhow!("Failed to initialize record store: {}", e))?;
    info!(backend = store.backend_name(), "Record store ready");

    let engine = Arc::new(EntitlementEngine::new(store, new_store_lock()));

    let transform = &config.transform;
    if !Transcoder::probe(&transform.ffmpeg_path).await {
        warn!(
            ffmpeg = %transform.ffmpeg_path,
            "FFmpeg not found or not runnable, transform requests will fail"
        );
    }

    let orchestrator = RequestOrchestrator::new(
        engine,
        PlanCatalog::ffmpeg(&transform.ffmpeg_path),
        Transcoder::new(Duration::from_secs(transform.timeout_secs)),
        transform.max_upload_bytes,
    )
    .with_work_dir(transform.work_dir.clone());

    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, key provisioning is disabled");
    }

    info!(
        max_upload_bytes = transform.max_upload_bytes,
        transform_timeout_secs = transform.timeout_secs,
        default_duration_days = config.default_duration_days,
        "Configuration loaded"
    );

    let state = AppState::new(
        Arc::new(orchestrator),
        config.admin_token.clone(),
        config.default_duration_days,
    );

    server::serve(state, &config.server.bind_addr()).await
}
