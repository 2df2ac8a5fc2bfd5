//! Chart cache synchronization
//!
//! A presentation chart keeps its own cached copy of the data series it
//! plots; the authoritative copy lives in the embedded workbook the chart's
//! relationship part points at. After the workbook is updated out-of-band,
//! the presentation's caches go stale. This flow re-copies every cache
//! subtree from the embedded workbook's chart XML into the presentation's.

use crate::backup::create_backup;
use crate::cachesync::sync_cache_elements;
use crate::config::PatchOptions;
use crate::error::PatchError;
use crate::package::Package;
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

const PACKAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/package";
const CHARTS_DIR: &str = "ppt/charts/";
const EMBEDDED_CHART_PART: &str = "xl/charts/chart1.xml";

/// Aggregate result across all charts of one document.
#[derive(Debug, Default)]
pub struct CacheSyncReport {
    /// Chart XML entries rewritten.
    pub charts_updated: usize,
    /// Cache subtrees replaced in total.
    pub caches_synced: usize,
    /// Cache elements that found no positional partner. Non-zero means the
    /// presentation and its embedded workbook disagree on cache counts and
    /// the result should be reviewed.
    pub unmatched: usize,
}

fn is_chart_entry(path: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^ppt/charts/chart\d+\.xml$").expect("valid regex"))
        .is_match(path)
}

/// Synchronize every chart's cache subtrees from its embedded workbook.
/// A chart without an embedded-package relationship is a fatal
/// [`PatchError::MissingRelationship`]; the document is left untouched.
pub fn sync<P: AsRef<Path>>(doc_path: P, options: &PatchOptions) -> Result<CacheSyncReport> {
    let doc_path = doc_path.as_ref();
    if options.backup {
        create_backup(doc_path)?;
    }

    let package = Package::from_file(doc_path)?;
    let mut report = CacheSyncReport::default();
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();

    for entry in package.entries() {
        if !is_chart_entry(&entry.path) {
            continue;
        }

        let embedded_path = embedded_package_path(&package, &entry.path)?;
        let embedded = package
            .entry(&embedded_path)
            .ok_or_else(|| PatchError::MissingRelationship {
                chart: entry.path.clone(),
            })?;
        let workbook = Package::from_bytes(&embedded.bytes).with_context(|| {
            format!("Failed to open embedded package {}", embedded_path)
        })?;
        let source = workbook.entry(EMBEDDED_CHART_PART).ok_or_else(|| {
            anyhow::anyhow!("{} has no {}", embedded_path, EMBEDDED_CHART_PART)
        })?;

        let outcome = sync_cache_elements(&entry.bytes, &source.bytes)
            .with_context(|| format!("Failed to sync caches for {}", entry.path))?;

        report.charts_updated += 1;
        report.caches_synced += outcome.synced;
        report.unmatched += outcome.unmatched;
        replacements.insert(entry.path.clone(), outcome.xml);
    }

    if !replacements.is_empty() {
        package
            .rewrite(|entry| Ok(replacements.get(&entry.path).cloned()))?
            .save_atomic(doc_path)?;
    }

    Ok(report)
}

/// Resolve the chart's embedded-package relationship target to a package
/// entry path.
fn embedded_package_path(package: &Package, chart_path: &str) -> Result<String> {
    let chart_name = chart_path.rsplit('/').next().unwrap_or(chart_path);
    let rels_path = format!("{}_rels/{}.rels", CHARTS_DIR, chart_name);

    let missing = || PatchError::MissingRelationship {
        chart: chart_path.to_string(),
    };

    let rels = package.entry(&rels_path).ok_or_else(missing)?;
    let target = find_package_relationship(&rels.bytes)?.ok_or_else(missing)?;
    Ok(resolve_relative(CHARTS_DIR, &target))
}

/// Scan a relationships part for the embedded-package relationship and
/// return its target, if any.
fn find_package_relationship(xml: &[u8]) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut rel_type = String::new();
                let mut target = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Type" => rel_type = attr.unescape_value()?.into_owned(),
                        b"Target" => target = attr.unescape_value()?.into_owned(),
                        _ => {}
                    }
                }
                if rel_type == PACKAGE_REL_TYPE {
                    return Ok(Some(target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

/// Resolve a relationship target (which may climb with `..`) against the
/// directory of the relationships part's owner.
fn resolve_relative(base_dir: &str, target: &str) -> String {
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
