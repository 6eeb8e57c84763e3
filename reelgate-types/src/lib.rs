//! Reelgate Types
//!
//! Shared definitions for license records, the stored collection document,
//! and the wire schemas returned by the Reelgate services.

pub mod license;
pub mod schemas;
pub mod error;

pub use license::*;
pub use schemas::*;
pub use error::*;
