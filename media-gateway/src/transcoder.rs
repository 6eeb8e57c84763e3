//! External transform invocation
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


use crate::plans::InvocationTemplate;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Keep at most this much of the tool's stderr in error messages
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `stderr` is kept for logs and left out of the message
    #[error("transform exited with {status}")]
    Exited { status: String, stderr: String },

    #[error("transform timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transform produced no output")]
    MissingOutput,
}

/// Runs one invocation template per call
#[derive(Debug, Clone)]
pub struct Transcoder {
    timeout: Duration,
}

impl Transcoder {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check if the executable can be started
    pub async fn probe(program: &str) -> bool {
        match Command::new(program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    /// Run `template` from `input` to `output`
    ///
    /// The child is killed if it outlives the timeout or if the returned
    /// future is dropped. A partial output file is removed on any failure.
    pub async fn run(
        &self,
        template: &InvocationTemplate,
        input: &Path,
        output: &Path,
    ) -> Result<(), TranscodeError> {
        let args = template.render(input, output);
        debug!(program = %template.program, args = ?args, "Starting transform");

        let child = Command::new(&template.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: template.program.clone(),
                source,
            })?;

        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            // Dropping the wait future drops the child, which kills it
            Err(_) => Err(TranscodeError::TimedOut(self.timeout)),
            Ok(Err(e)) => Err(TranscodeError::Exited {
                status: "unknown".to_string(),
                stderr: e.to_string(),
            }),
            Ok(Ok(finished)) if !finished.status.success() => Err(TranscodeError::Exited {
                status: finished.status.to_string(),
                stderr: stderr_tail(&finished.stderr),
            }),
            Ok(Ok(_)) => match tokio::fs::metadata(output).await {
                Ok(meta) if meta.is_file() => Ok(()),
                _ => Err(TranscodeError::MissingOutput),
            },
        };

        match &result {
            Ok(()) => info!(
                program = %template.program,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Transform completed"
            ),
            Err(e) => {
                match e {
                    TranscodeError::Exited { stderr, .. } => warn!(
                        program = %template.program,
                        error = %e,
                        stderr = %stderr,
                        "Transform failed"
                    ),
                    _ => warn!(program = %template.program, error = %e, "Transform failed"),
                }
                remove_partial(output).await;
            }
        }

        result
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

async fn remove_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!(path = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output.display(), error = %e, "Failed to remove partial output"),
    }
}
