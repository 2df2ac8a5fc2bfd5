//! Timestamped backup copies for destructive operations

use crate::error::PatchError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Create a sibling copy of `path` with a Unix-epoch-second timestamp
/// inserted before the extension: `report.pptx` -> `report-1700000000.pptx`.
///
/// Returns the backup path. Every destructive operation calls this before
/// touching the original; a failure here aborts the operation with
/// [`PatchError::BackupCreation`] before any mutation happens.
pub fn create_backup(path: &Path) -> Result<PathBuf> {
    let backup_path = backup_path_for(path, unix_timestamp());
    std::fs::copy(path, &backup_path).map_err(|source| PatchError::BackupCreation {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(backup_path)
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn backup_path_for(path: &Path, timestamp: u64) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let backup_name = match file_name.rfind('.') {
        Some(pos) => format!("{}-{}{}", &file_name[..pos], timestamp, &file_name[pos..]),
        None => format!("{}-{}", file_name, timestamp),
    };

    path.with_file_name(backup_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_name_has_timestamp_before_extension() {
        let p = backup_path_for(Path::new("/data/report.pptx"), 1700000000);
        assert_eq!(p, PathBuf::from("/data/report-1700000000.pptx"));
    }

    #[test]
    fn test_backup_name_without_extension() {
        let p = backup_path_for(Path::new("/data/report"), 42);
        assert_eq!(p, PathBuf::from("/data/report-42"));
    }

    #[test]
    fn test_backup_copies_file_contents() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let original = dir.path().join("doc.xlsx");
        std::fs::write(&original, b"payload")?;

        let backup = create_backup(&original)?;

        assert_ne!(backup, original);
        assert_eq!(std::fs::read(&backup)?, b"payload");
        assert_eq!(std::fs::read(&original)?, b"payload");
        Ok(())
    }

    #[test]
    fn test_backup_of_missing_file_fails() {
        let err = create_backup(Path::new("/nonexistent/doc.xlsx")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::BackupCreation { .. })
        ));
    }
}
