//! officepatch: surgical patching of ZIP-based office documents
//!
//! Edits specific parts of an OOXML package — datamashup query definitions,
//! link targets, chart data caches — while leaving every other byte alone.
//! The package rewriter copies entries through untouched unless a patch
//! explicitly supplies replacement bytes, and write-back always goes through
//! an atomic temp-file swap guarded by a timestamped backup.

pub mod backup;
pub mod cachesync;
pub mod config;
pub mod error;
pub mod mashup;
pub mod ops;
pub mod package;
pub mod substitute;

pub use cachesync::CacheSyncOutcome;
pub use config::{PatchConfig, PatchOptions};
pub use error::PatchError;
pub use mashup::MashupContainer;
pub use ops::caches::CacheSyncReport;
pub use package::{Entry, Package};
