//! Exact-literal text substitution over extracted files
//!
//! Purely textual: the caller supplies an unambiguous literal (typically a
//! whole XML attribute-bearing element or an encoded link target), not a
//! pattern. Zero occurrences is a valid no-op reported through the count.

use anyhow::{Context, Result};
use std::path::Path;

/// Replace every non-overlapping occurrence of `search` with `replace` in
/// each of `files`, rewriting the files in place. Returns the total
/// occurrence count across all files.
pub fn search_and_replace<P: AsRef<Path>>(
    search: &str,
    replace: &str,
    files: &[P],
) -> Result<usize> {
    let mut count = 0;
    for file in files {
        let file = file.as_ref();
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let occurrences = content.matches(search).count();
        if occurrences > 0 {
            let updated = content.replace(search, replace);
            std::fs::write(file, updated)
                .with_context(|| format!("Failed to write {}", file.display()))?;
        }
        count += occurrences;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_across_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.xml");
        std::fs::write(&a, "X and X")?;
        std::fs::write(&b, "one X here")?;

        let count = search_and_replace("X", "Y", &[&a, &b])?;

        assert_eq!(count, 3);
        assert_eq!(std::fs::read_to_string(&a)?, "Y and Y");
        assert_eq!(std::fs::read_to_string(&b)?, "one Y here");
        Ok(())
    }

    #[test]
    fn test_zero_occurrences_is_not_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a.xml");
        std::fs::write(&a, "nothing to see")?;

        let count = search_and_replace("missing", "anything", &[&a])?;

        assert_eq!(count, 0);
        assert_eq!(std::fs::read_to_string(&a)?, "nothing to see");
        Ok(())
    }

    #[test]
    fn test_replaces_whole_xml_elements() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("chart.xml");
        std::fs::write(&a, r#"<c:chart><c:autoUpdate val="1"/></c:chart>"#)?;

        let count = search_and_replace(
            r#"<c:autoUpdate val="1"/>"#,
            r#"<c:autoUpdate val="0"/>"#,
            &[&a],
        )?;

        assert_eq!(count, 1);
        assert!(std::fs::read_to_string(&a)?.contains(r#"<c:autoUpdate val="0"/>"#));
        Ok(())
    }
}
