//! Link retargeting and update-popup toggling
//!
//! Both flows stage the document's `ppt/` subtree into a per-operation
//! scratch directory, run exact-literal substitution over the staged files,
//! and feed the patched bytes back through the package rewrite. The scratch
//! directory is a scoped `TempDir`, removed on every exit path.

use crate::backup::create_backup;
use crate::config::PatchOptions;
use crate::package::Package;
use crate::substitute::search_and_replace;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PPT_PREFIX: &str = "ppt/";

/// Rewrite absolute link targets in relationship parts. `search` and
/// `replace` are plain filesystem paths; both are encoded to the
/// `file:///`-style form relationship XML uses before substitution.
/// Returns the number of occurrences replaced.
pub fn retarget<P: AsRef<Path>>(
    doc_path: P,
    search: &str,
    replace: &str,
    options: &PatchOptions,
) -> Result<usize> {
    let doc_path = doc_path.as_ref();
    if options.backup {
        create_backup(doc_path)?;
    }

    let package = Package::from_file(doc_path)?;
    let scratch = stage_ppt_subtree(&package)?;

    let rel_files = staged_paths(&package, &scratch, |path| {
        path.contains("/_rels/") && path.ends_with(".rels")
    });
    let count = search_and_replace(
        &encode_link_target(search),
        &encode_link_target(replace),
        &rel_files,
    )?;

    restore_staged(&package, &scratch)?.save_atomic(doc_path)?;
    Ok(count)
}

/// Flip the link auto-update flags in chart and slide XML. With
/// `auto_update` set, opening the presentation refreshes links (and shows
/// the update popup); without it, links are manual and the popup stays
/// hidden. Returns the total occurrence count across both forms.
pub fn toggle_popup<P: AsRef<Path>>(
    doc_path: P,
    auto_update: bool,
    options: &PatchOptions,
) -> Result<usize> {
    let doc_path = doc_path.as_ref();
    if options.backup {
        create_backup(doc_path)?;
    }

    let package = Package::from_file(doc_path)?;
    let scratch = stage_ppt_subtree(&package)?;

    // Charts carry an explicit 0/1 flag.
    let chart_files = staged_paths(&package, &scratch, |path| {
        in_dir(path, "ppt/charts/") && path.ends_with(".xml")
    });
    let mut count = search_and_replace(
        &format!(r#"<c:autoUpdate val="{}"/>"#, u8::from(!auto_update)),
        &format!(r#"<c:autoUpdate val="{}"/>"#, u8::from(auto_update)),
        &chart_files,
    )?;

    // Table links encode the flag by presence of the attribute.
    let slide_files = staged_paths(&package, &scratch, |path| {
        in_dir(path, "ppt/slides/") && path.ends_with(".xml")
    });
    let (slide_search, slide_replace) = if auto_update {
        ("<p:link/>", r#"<p:link updateAutomatic="1"/>"#)
    } else {
        (r#"<p:link updateAutomatic="1"/>"#, "<p:link/>")
    };
    count += search_and_replace(slide_search, slide_replace, &slide_files)?;

    restore_staged(&package, &scratch)?.save_atomic(doc_path)?;
    Ok(count)
}

/// `file:///` form used by relationship targets: spaces percent-encoded,
/// forward slashes flipped to backslashes.
pub fn encode_link_target(path: &str) -> String {
    format!("file:///{}", path.replace(' ', "%20").replace('/', "\\"))
}

fn in_dir(path: &str, dir: &str) -> bool {
    path.strip_prefix(dir)
        .is_some_and(|rest| !rest.contains('/'))
}

/// Write every `ppt/` entry into a scratch directory mirroring the package
/// layout.
fn stage_ppt_subtree(package: &Package) -> Result<TempDir> {
    let scratch = TempDir::new().context("Failed to create scratch directory")?;
    for entry in package.entries() {
        if !entry.path.starts_with(PPT_PREFIX) || entry.path.ends_with('/') {
            continue;
        }
        let target = scratch.path().join(&entry.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &entry.bytes)?;
    }
    Ok(scratch)
}

/// Scratch paths of the staged `ppt/` entries selected by `filter`.
fn staged_paths<F: Fn(&str) -> bool>(
    package: &Package,
    scratch: &TempDir,
    filter: F,
) -> Vec<PathBuf> {
    package
        .entries()
        .iter()
        .filter(|e| e.path.starts_with(PPT_PREFIX) && filter(&e.path))
        .map(|e| scratch.path().join(&e.path))
        .collect()
}

/// Rebuild the package with every `ppt/` entry replaced by its (possibly
/// patched) staged file. Entry order is untouched.
fn restore_staged(package: &Package, scratch: &TempDir) -> Result<Package> {
    package.rewrite(|entry| {
        if entry.path.starts_with(PPT_PREFIX) && !entry.path.ends_with('/') {
            let staged = scratch.path().join(&entry.path);
            Ok(Some(std::fs::read(&staged).with_context(|| {
                format!("Failed to read staged entry {}", staged.display())
            })?))
        } else {
            Ok(None)
        }
    })
}
