//! Media Gateway Library
//!
//! This library provides the license-gated media transform service:
//! - Entitlement checks with one-shot device binding
//! - Quality tier selection and escalation hints
//! - External FFmpeg invocation with scoped scratch space
//! - The HTTP surface tying them together
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


pub mod entitlement;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod plans;
pub mod server;
pub mod transcoder;

// Re-export the main entry points for convenience
pub use entitlement::{new_store_lock, Entitlement, EntitlementEngine, EntitlementError, StoreLock};
pub use error::GatewayError;
pub use orchestrator::{Credentials, RequestOrchestrator};
pub use plans::{escalate, PlanCatalog, Tier};
pub use server::{router, AppState};
pub use transcoder::Transcoder;
