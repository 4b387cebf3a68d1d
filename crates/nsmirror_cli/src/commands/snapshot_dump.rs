//! Snapshot dump command implementation.

use super::{open_snapshot, print_rows};
use nsmirror_codec::SnapshotRow;
use std::path::Path;

/// Runs the snapshot-dump command.
pub fn run(file: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rows = read_rows(file, limit)?;
    print_rows(&rows, format)
}

fn read_rows(file: &Path, limit: Option<usize>) -> Result<Vec<SnapshotRow>, Box<dyn std::error::Error>> {
    let db = open_snapshot(file)?;
    let mut rows = db.rows()?;
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{row, snapshot_file};

    #[test]
    fn rows_come_back_oldest_first() {
        let file = snapshot_file(&[row("/trace/0001", "b,2,h,pending,", 2.0), row("/trace/0001", "a,1,h,pending,", 1.0)]);
        let rows = read_rows(file.path(), None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "a,1,h,pending,");
    }

    #[test]
    fn limit_truncates() {
        let file = snapshot_file(&[row("/d", "a", 1.0), row("/d", "b", 2.0), row("/d", "c", 3.0)]);
        assert_eq!(read_rows(file.path(), Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"not a snapshot").unwrap();
        assert!(read_rows(&path, None).is_err());
        assert!(read_rows(&dir.path().join("missing"), None).is_err());
    }
}
