//! Datamashup query extraction and update
//!
//! Carrier documents store the mashup container base64-encoded as the single
//! text node of `customXml/item<n>.xml` entries. Extraction decodes each
//! item and writes the formula entries out as standalone `.m` files; update
//! reads edited `.m` files back in and rewrites each item's text node with
//! the re-encoded container.

use crate::backup::create_backup;
use crate::config::PatchOptions;
use crate::mashup::{self, MashupContainer};
use crate::package::Package;
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use std::io::Cursor;
use std::path::Path;
use std::sync::OnceLock;

/// Carrier entries holding a base64-encoded mashup container.
pub fn is_custom_xml_item(path: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^customXml/item\d+\.xml$").expect("valid regex"))
        .is_match(path)
}

/// Extract every formula entry from every custom-XML item of the document
/// at `doc_path` into `out_dir`. Read-only; returns the total count of
/// files written.
pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(doc_path: P, out_dir: Q) -> Result<usize> {
    let package = Package::from_file(doc_path)?;
    let out_dir = out_dir.as_ref();

    let mut count = 0;
    for entry in package.entries() {
        if !is_custom_xml_item(&entry.path) {
            continue;
        }
        let container = decode_item(&entry.bytes)
            .with_context(|| format!("Failed to decode mashup in {}", entry.path))?;
        count += container.extract_formula_entries(out_dir)?;
    }
    Ok(count)
}

/// Update the document's mashup containers from caller-supplied `.m` files,
/// matched by base file name. Returns the number of custom-XML items
/// rewritten; entries in `m_files` matching no formula entry are ignored.
pub fn update<P: AsRef<Path>, Q: AsRef<Path>>(
    doc_path: P,
    m_files: &[Q],
    options: &PatchOptions,
) -> Result<usize> {
    let doc_path = doc_path.as_ref();
    let replacements = mashup::load_replacements(m_files)?;

    if options.backup {
        create_backup(doc_path)?;
    }

    let mut touched = 0;
    Package::rewrite_file(doc_path, |entry| {
        if !is_custom_xml_item(&entry.path) {
            return Ok(None);
        }
        let container = decode_item(&entry.bytes)
            .with_context(|| format!("Failed to decode mashup in {}", entry.path))?;
        let updated = container.replace_formula_entries(&replacements)?;
        let xml = replace_item_text(&entry.bytes, &BASE64.encode(updated.encode()))?;
        touched += 1;
        Ok(Some(xml))
    })?;

    Ok(touched)
}

fn decode_item(xml: &[u8]) -> Result<MashupContainer> {
    let text = item_text(xml)?;
    let raw = BASE64
        .decode(text.as_bytes())
        .context("custom-XML item text is not valid base64")?;
    Ok(MashupContainer::decode(&raw)?)
}

/// Collect the item's text content, ignoring insignificant whitespace
/// around the base64 payload.
fn item_text(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => {
                text.extend(t.unescape()?.chars().filter(|c| !c.is_ascii_whitespace()));
            }
            Event::CData(c) => {
                text.extend(
                    String::from_utf8_lossy(&c)
                        .chars()
                        .filter(|c| !c.is_ascii_whitespace()),
                );
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Rewrite the item with `new_text` as its single text node, preserving the
/// surrounding element structure and attributes. Only text inside the root
/// element is a replacement slot; prolog whitespace around it passes through
/// verbatim.
fn replace_item_text(xml: &[u8], new_text: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut written = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) if depth == 0 => writer.write_event(Event::Text(t))?,
            Event::Text(_) | Event::CData(_) => {
                if !written {
                    writer.write_event(Event::Text(BytesText::new(new_text)))?;
                    written = true;
                }
            }
            Event::Eof => break,
            event => {
                match &event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth = depth.saturating_sub(1),
                    _ => {}
                }
                writer.write_event(event)?;
            }
        }
        buf.clear();
    }

    if !written {
        anyhow::bail!("custom-XML item has no text node to replace");
    }
    Ok(writer.into_inner().into_inner())
}
