//! Error types for the record store
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


use thiserror::Error;

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote store rejected write: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
