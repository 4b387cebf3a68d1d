//! CLI command implementations.

pub mod shard;
pub mod snapshot_dump;
pub mod snapshot_query;

use nsmirror_codec::{SnapshotCodec, SnapshotDb, SnapshotRow};
use std::fs;
use std::path::Path;

/// Reads and opens a snapshot blob.
pub fn open_snapshot(file: &Path) -> Result<SnapshotDb, Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("Snapshot not found at {}", file.display()).into());
    }
    let blob = fs::read(file)?;
    tracing::debug!(file = %file.display(), bytes = blob.len(), "read snapshot blob");
    Ok(SnapshotCodec::default().open(&blob)?)
}

/// Prints rows in `format`.
pub fn print_rows(rows: &[SnapshotRow], format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(rows)?);
        }
        _ => {
            println!("Snapshot Rows ({} total)", rows.len());
            println!("================");
            println!();
            for row in rows {
                print!("[{:>14.3}] {}", row.timestamp, row.path);
                if let Some(ref data) = row.data {
                    print!(" data={} bytes", data.len());
                }
                println!();
            }
        }
    }
    Ok(())
}
