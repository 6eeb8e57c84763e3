//! Request Orchestrator - authenticate, authorize, stage, transform
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


use crate::entitlement::{Entitlement, EntitlementEngine};
use crate::error::GatewayError;
use crate::plans::{PlanCatalog, Tier};
use crate::transcoder::Transcoder;
use axum::body::Bytes;
use futures::{Stream, StreamExt};
use reelgate_types::mask_key;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extension used when the upload name carries none
const DEFAULT_EXTENSION: &str = "mp4";
const OUTPUT_FILE_NAME: &str = "output.mp4";

/// Caller credentials as presented on the request
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub key: Option<String>,
    pub device_id: Option<String>,
    pub device_label: Option<String>,
}

impl Credentials {
    pub fn new(key: Option<String>, device_id: Option<String>, device_label: Option<String>) -> Self {
        Self {
            key,
            device_id,
            device_label,
        }
    }

    /// Key and device id, both present and non-blank
    pub fn required(&self) -> Result<(&str, &str), GatewayError> {
        fn present(value: &Option<String>) -> Option<&str> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
        }

        match (present(&self.key), present(&self.device_id)) {
            (Some(key), Some(device_id)) => Ok((key, device_id)),
            _ => Err(GatewayError::Unauthenticated),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.device_label
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Per-request scratch directory. Everything in it is removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    input: Option<PathBuf>,
    request_id: Uuid,
}

impl Workspace {
    fn create(parent: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("reelgate-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        Ok(Self {
            dir,
            input: None,
            request_id: Uuid::new_v4(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Staged input, once [`Workspace::ingest`] succeeded
    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_FILE_NAME)
    }

    /// Stream an upload to disk, rejecting it once it passes `limit` bytes
    pub async fn ingest<S, B>(
        &mut self,
        file_name: Option<&str>,
        payload: S,
        limit: u64,
    ) -> Result<u64, GatewayError>
    where
        S: Stream<Item = Result<B, GatewayError>>,
        B: AsRef<[u8]>,
    {
        if self.input.is_some() {
            return Err(GatewayError::InvalidRequest(
                "only one file may be uploaded per request".to_string(),
            ));
        }

        let path = self
            .dir
            .path()
            .join(format!("input.{}", input_extension(file_name)));
        let mut file = tokio::fs::File::create(&path).await.map_err(internal)?;

        futures::pin_mut!(payload);
        let mut written: u64 = 0;
        while let Some(chunk) = payload.next().await {
            let chunk = chunk?;
            let chunk = chunk.as_ref();

            written += chunk.len() as u64;
            if written > limit {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                warn!(request_id = %self.request_id, limit, "Upload exceeds size ceiling");
                return Err(GatewayError::PayloadTooLarge { limit });
            }
            file.write_all(chunk).await.map_err(internal)?;
        }
        file.flush().await.map_err(internal)?;

        if written == 0 {
            return Err(GatewayError::InvalidRequest("uploaded file is empty".to_string()));
        }

        debug!(request_id = %self.request_id, bytes = written, path = %path.display(), "Upload staged");
        self.input = Some(path);
        Ok(written)
    }
}

/// Extension of the uploaded file name if it is short and alphanumeric
fn input_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn internal(err: std::io::Error) -> GatewayError {
    GatewayError::Internal(err.to_string())
}

/// Transformed output plus the scratch directory that holds it
#[derive(Debug)]
pub struct Artifact {
    dir: TempDir,
    path: PathBuf,
    tier: Tier,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn file_name(&self) -> &'static str {
        OUTPUT_FILE_NAME
    }

    /// Body stream for the output file
    ///
    /// The scratch directory moves into the stream and is deleted when the
    /// stream is exhausted or dropped.
    pub async fn into_stream(
        self,
    ) -> std::io::Result<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
        let file = tokio::fs::File::open(&self.path).await?;
        let dir = self.dir;
        Ok(ReaderStream::new(file).map(move |chunk| {
            let _scratch = &dir;
            chunk
        }))
    }
}

/// Composes entitlement, staging, plan selection and the transform
pub struct RequestOrchestrator {
    engine: Arc<EntitlementEngine>,
    plans: PlanCatalog,
    transcoder: Transcoder,
    max_upload_bytes: u64,
    work_dir: Option<PathBuf>,
}

impl RequestOrchestrator {
    pub fn new(
        engine: Arc<EntitlementEngine>,
        plans: PlanCatalog,
        transcoder: Transcoder,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            engine,
            plans,
            transcoder,
            max_upload_bytes,
            work_dir: None,
        }
    }

    /// Parent directory for scratch space
    pub fn with_work_dir(mut self, work_dir: Option<PathBuf>) -> Self {
        self.work_dir = work_dir;
        self
    }

    pub fn engine(&self) -> &EntitlementEngine {
        &self.engine
    }

    pub fn plans(&self) -> &PlanCatalog {
        &self.plans
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Require credentials, then check and bind the license
    ///
    /// Only this step holds the store lock.
    pub async fn authorize(&self, credentials: &Credentials) -> Result<Entitlement, GatewayError> {
        let (key, device_id) = credentials.required()?;
        let entitlement = self
            .engine
            .authorize(key, device_id, credentials.label())
            .await?;
        Ok(entitlement)
    }

    pub fn open_workspace(&self) -> Result<Workspace, GatewayError> {
        Workspace::create(self.work_dir.as_deref()).map_err(internal)
    }

    /// Run the plan for `tier_name` over the staged input
    ///
    /// On failure the workspace is dropped here, removing input and any
    /// partial output.
    pub async fn transform(&self, workspace: Workspace, tier_name: &str) -> Result<Artifact, GatewayError> {
        let input = workspace
            .input()
            .ok_or_else(|| GatewayError::InvalidRequest("missing file upload".to_string()))?
            .to_path_buf();
        let output = workspace.output_path();
        let (tier, template) = self.plans.resolve_name(tier_name);

        info!(
            request_id = %workspace.request_id(),
            tier = %tier,
            requested = tier_name,
            "Starting transform"
        );

        match self.transcoder.run(template, &input, &output).await {
            Ok(()) => {
                // Input is no longer needed while the output streams out
                if let Err(e) = tokio::fs::remove_file(&input).await {
                    debug!(error = %e, "Failed to remove staged input early");
                }
                Ok(Artifact {
                    dir: workspace.dir,
                    path: output,
                    tier,
                })
            }
            Err(e) => {
                let escalation = tier.escalate();
                warn!(
                    request_id = %workspace.request_id(),
                    tier = %tier,
                    escalation = escalation.map(|t| t.as_str()).unwrap_or("none"),
                    error = %e,
                    "Transform failed"
                );
                Err(GatewayError::TransformFailed {
                    tier,
                    message: e.to_string(),
                    escalation,
                })
            }
        }
    }

    /// Full sequence for a payload that is available up front
    pub async fn process<S, B>(
        &self,
        credentials: &Credentials,
        tier_name: &str,
        file_name: Option<&str>,
        payload: S,
    ) -> Result<Artifact, GatewayError>
    where
        S: Stream<Item = Result<B, GatewayError>>,
        B: AsRef<[u8]>,
    {
        let entitlement = self.authorize(credentials).await?;
        info!(key = %mask_key(&entitlement.key), days_left = entitlement.days_left, "Transform request authorized");

        let mut workspace = self.open_workspace()?;
        workspace
            .ingest(file_name, payload, self.max_upload_bytes)
            .await?;
        self.transform(workspace, tier_name).await
    }
}
