//! Whole-document explode/repack
//!
//! Companion flows for manual surgery: dump every entry of a document to a
//! directory tree, edit by hand, and rebuild the document from the tree.

use crate::backup::create_backup;
use crate::config::PatchOptions;
use crate::package;
use anyhow::Result;
use std::path::Path;

/// Extract every entry of the document to `out_dir`. Returns the number of
/// files written.
pub fn explode<P: AsRef<Path>, Q: AsRef<Path>>(doc_path: P, out_dir: Q) -> Result<usize> {
    package::explode(doc_path, out_dir)
}

/// Rebuild a document at `doc_path` from the tree under `dir`. When the
/// target already exists it is backed up (unless suppressed) before being
/// atomically replaced.
pub fn repack<P: AsRef<Path>, Q: AsRef<Path>>(
    dir: P,
    doc_path: Q,
    options: &PatchOptions,
) -> Result<()> {
    let doc_path = doc_path.as_ref();

    if doc_path.exists() && options.backup {
        create_backup(doc_path)?;
    }

    package::pack_dir(dir)?.save_atomic(doc_path)
}
