//! Error taxonomy for patch operations
//!
//! Fatal conditions get their own variant so callers (and tests) can
//! downcast them out of `anyhow::Error`. Benign no-ops — a replacement file
//! matching no nested entry, a search string with zero occurrences — are
//! reported through return counts, never as errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    /// A length prefix in the mashup container claims more bytes than remain.
    #[error(
        "mashup container truncated: `{field}` declares {declared} bytes but only {remaining} remain"
    )]
    TruncatedContainer {
        field: &'static str,
        declared: usize,
        remaining: usize,
    },

    /// Bytes left over after the ninth container field. The format has no
    /// padding, so this is corruption.
    #[error("mashup container has {extra} trailing bytes after the final field")]
    TrailingContainerBytes { extra: usize },

    /// The `pkgParts` payload is not a readable archive.
    #[error("embedded package parts are not a valid archive: {reason}")]
    MalformedNestedArchive { reason: String },

    /// A chart entry lacks the relationship pointing at its embedded
    /// spreadsheet package.
    #[error("chart `{chart}` has no embedded-package relationship")]
    MissingRelationship { chart: String },

    /// The pre-mutation safety copy could not be created.
    #[error("failed to create backup copy of `{path}`: {source}")]
    BackupCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
