//! Positional synchronization of cached-data XML subtrees
//!
//! Chart XML carries `numCache`/`strCache`/`ptCache` style elements holding
//! a snapshot of the plotted data. Synchronization pairs the i-th
//! cache-named element of the target document with the i-th of the source
//! document and splices the source subtree into the target, leaving the
//! surrounding structure alone. Pairing stops at the shorter sequence;
//! the leftover count is reported rather than swallowed.

use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// Result of one document-pair synchronization.
#[derive(Debug)]
pub struct CacheSyncOutcome {
    /// Rewritten target document.
    pub xml: Vec<u8>,
    /// Number of subtrees replaced.
    pub synced: usize,
    /// Elements left unpaired because the two documents disagree on how
    /// many cache elements they contain.
    pub unmatched: usize,
}

fn is_cache_name(name: &[u8]) -> bool {
    // Local name (namespace prefix stripped) containing "Cache".
    let local = match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    };
    String::from_utf8_lossy(local).contains("Cache")
}

/// Replace the target document's cache elements with the source document's,
/// paired by document order. Cache elements nested inside an already-matched
/// subtree are not re-matched; both documents are scanned with the same
/// rule, so the pairing stays aligned.
pub fn sync_cache_elements(target_xml: &[u8], source_xml: &[u8]) -> Result<CacheSyncOutcome> {
    let sources = collect_cache_subtrees(source_xml)?;

    let mut reader = Reader::from_reader(target_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    let mut target_seen = 0usize;
    let mut synced = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if is_cache_name(e.name().as_ref()) => {
                let replacement = sources.get(target_seen);
                target_seen += 1;
                match replacement {
                    Some(subtree) => {
                        // Drop the original subtree, splice in the source's.
                        consume_subtree(&mut reader, None)?;
                        for event in subtree {
                            writer.write_event(event.clone())?;
                        }
                        synced += 1;
                    }
                    None => {
                        writer.write_event(Event::Start(e))?;
                        consume_subtree(&mut reader, Some(&mut writer))?;
                    }
                }
            }
            Event::Empty(e) if is_cache_name(e.name().as_ref()) => {
                let replacement = sources.get(target_seen);
                target_seen += 1;
                match replacement {
                    Some(subtree) => {
                        for event in subtree {
                            writer.write_event(event.clone())?;
                        }
                        synced += 1;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }

    let unmatched = target_seen.abs_diff(sources.len());
    Ok(CacheSyncOutcome {
        xml: writer.into_inner().into_inner(),
        synced,
        unmatched,
    })
}

/// Count the cache elements a document exposes to pairing (source side of
/// the report).
pub fn count_cache_elements(xml: &[u8]) -> Result<usize> {
    Ok(collect_cache_subtrees(xml)?.len())
}

/// Collect each top-most cache element of `xml` as an owned event sequence.
fn collect_cache_subtrees(xml: &[u8]) -> Result<Vec<Vec<Event<'static>>>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut subtrees = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if is_cache_name(e.name().as_ref()) => {
                let mut events = vec![Event::Start(e.into_owned())];
                let mut depth = 1usize;
                let mut inner = Vec::new();
                while depth > 0 {
                    let event = reader.read_event_into(&mut inner)?;
                    match &event {
                        Event::Start(_) => depth += 1,
                        Event::End(_) => depth -= 1,
                        Event::Eof => anyhow::bail!("unterminated cache element"),
                        _ => {}
                    }
                    events.push(event.into_owned());
                    inner.clear();
                }
                subtrees.push(events);
            }
            Event::Empty(e) if is_cache_name(e.name().as_ref()) => {
                subtrees.push(vec![Event::Empty(e.into_owned())]);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(subtrees)
}

/// Consume events up to and including the end tag matching an already-read
/// start tag. With a writer, events (and the end tag) are copied through;
/// without one they are discarded.
fn consume_subtree(
    reader: &mut Reader<&[u8]>,
    mut writer: Option<&mut Writer<Cursor<Vec<u8>>>>,
) -> Result<()> {
    let mut depth = 1usize;
    let mut buf = Vec::new();
    while depth > 0 {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => anyhow::bail!("unterminated cache element"),
            _ => {}
        }
        if let Some(w) = writer.as_deref_mut() {
            w.write_event(event)?;
        }
        buf.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = r#"<c:chart xmlns:c="x"><c:ser><c:strCache><c:pt>stale-a</c:pt></c:strCache><c:numCache><c:pt>stale-1</c:pt></c:numCache></c:ser></c:chart>"#;
    const SOURCE: &str = r#"<c:chartSpace xmlns:c="x"><c:strCache><c:pt>fresh-a</c:pt></c:strCache><c:numCache><c:pt>fresh-1</c:pt></c:numCache></c:chartSpace>"#;

    #[test]
    fn test_pairs_by_document_order() -> Result<()> {
        let outcome = sync_cache_elements(TARGET.as_bytes(), SOURCE.as_bytes())?;
        let xml = String::from_utf8(outcome.xml)?;

        assert_eq!(outcome.synced, 2);
        assert_eq!(outcome.unmatched, 0);
        assert!(xml.contains("fresh-a"));
        assert!(xml.contains("fresh-1"));
        assert!(!xml.contains("stale"));
        // Surrounding structure of the target is preserved.
        assert!(xml.contains("<c:ser>"));
        assert!(xml.starts_with("<c:chart"));
        Ok(())
    }

    #[test]
    fn test_extra_target_elements_left_untouched() -> Result<()> {
        let source = r#"<c:chartSpace><c:strCache><c:pt>fresh-a</c:pt></c:strCache></c:chartSpace>"#;
        let outcome = sync_cache_elements(TARGET.as_bytes(), source.as_bytes())?;
        let xml = String::from_utf8(outcome.xml)?;

        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.unmatched, 1);
        assert!(xml.contains("fresh-a"));
        assert!(xml.contains("stale-1"));
        Ok(())
    }

    #[test]
    fn test_extra_source_elements_reported() -> Result<()> {
        let target = r#"<c:chart><c:numCache><c:pt>stale-1</c:pt></c:numCache></c:chart>"#;
        let outcome = sync_cache_elements(target.as_bytes(), SOURCE.as_bytes())?;

        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.unmatched, 1);
        // First source cache replaces the only target cache.
        assert!(String::from_utf8(outcome.xml)?.contains("fresh-a"));
        Ok(())
    }

    #[test]
    fn test_empty_cache_elements_pair() -> Result<()> {
        let target = r#"<c:chart><c:numCache/></c:chart>"#;
        let source = r#"<c:chartSpace><c:numCache><c:pt>v</c:pt></c:numCache></c:chartSpace>"#;
        let outcome = sync_cache_elements(target.as_bytes(), source.as_bytes())?;

        assert_eq!(outcome.synced, 1);
        assert!(String::from_utf8(outcome.xml)?.contains("<c:pt>v</c:pt>"));
        Ok(())
    }

    #[test]
    fn test_nested_caches_not_rematched() -> Result<()> {
        // A cache inside a cache is part of the outer subtree, not a second
        // pairing slot.
        let target = r#"<r><a:ptCache><a:numCache>inner</a:numCache></a:ptCache></r>"#;
        let source = r#"<r><b:ptCache>fresh</b:ptCache><b:numCache>spare</b:numCache></r>"#;
        let outcome = sync_cache_elements(target.as_bytes(), source.as_bytes())?;

        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.unmatched, 1);
        let xml = String::from_utf8(outcome.xml)?;
        assert!(xml.contains("fresh"));
        assert!(!xml.contains("inner"));
        assert!(!xml.contains("spare"));
        Ok(())
    }

    #[test]
    fn test_no_cache_elements_is_noop() -> Result<()> {
        let target = r#"<c:chart><c:title>t</c:title></c:chart>"#;
        let outcome = sync_cache_elements(target.as_bytes(), SOURCE.as_bytes())?;

        assert_eq!(outcome.synced, 0);
        assert_eq!(outcome.unmatched, 2);
        assert_eq!(outcome.xml, target.as_bytes());
        Ok(())
    }
}
