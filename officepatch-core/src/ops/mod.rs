//! End-to-end patch flows
//!
//! Each flow opens its own snapshot of the carrier document, derives what it
//! needs, and either reports results (extraction) or writes a wholesale
//! replacement document through [`crate::package::Package::save_atomic`].
//! Nothing is retained between invocations.

pub mod archive;
pub mod caches;
pub mod links;
pub mod queries;
