//! Record Store Gateway for Reelgate
//!
//! Loads and saves the whole license collection as a single remote document.
//! Read failures degrade to an explicitly-marked empty collection; write
//! failures are reported to the caller.
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


pub mod error;
pub mod gateway;
pub mod jsonbin;
pub mod memory;
pub mod service_integration;

pub use error::{StoreError, StoreResult};
pub use gateway::{LoadOutcome, RecordStore};
pub use jsonbin::JsonBinStore;
pub use memory::MemoryStore;
pub use service_integration::init_record_store;
