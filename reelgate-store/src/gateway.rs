//! Record store contract
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


use crate::error::StoreResult;
use async_trait::async_trait;
use reelgate_types::LicenseCollection;

/// Result of reading the license document
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The document was read and decoded
    Fresh(LicenseCollection),
    /// The document could not be read; callers see no records
    Degraded { reason: String },
}

impl LoadOutcome {
    pub fn degraded(reason: impl Into<String>) -> Self {
        LoadOutcome::Degraded {
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, LoadOutcome::Degraded { .. })
    }

    /// The loaded collection, or an empty one in degraded mode
    pub fn into_collection(self) -> LicenseCollection {
        match self {
            LoadOutcome::Fresh(collection) => collection,
            LoadOutcome::Degraded { .. } => LicenseCollection::default(),
        }
    }
}

/// Trait for license document backends
///
/// Every call is a full round trip. Implementations do not cache, and a
/// `save` is not atomic with respect to writers in other processes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the whole collection. Never fails; see [`LoadOutcome`].
    async fn load(&self) -> LoadOutcome;

    /// Replace the whole collection
    async fn save(&self, collection: &LicenseCollection) -> StoreResult<()>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelgate_types::LicenseRecord;

    #[test]
    fn test_degraded_outcome_yields_empty_collection() {
        let outcome = LoadOutcome::degraded("connection refused");
        assert!(outcome.is_degraded());
        assert!(outcome.into_collection().is_empty());
    }

    #[test]
    fn test_fresh_outcome_keeps_records() {
        let collection = LicenseCollection::new(vec![LicenseRecord::new("ABC123", 30).unwrap()]);
        let outcome = LoadOutcome::Fresh(collection.clone());
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.into_collection(), collection);
    }
}
