//! Snapshot query command implementation.

use super::{open_snapshot, print_rows};
use std::path::Path;

/// Runs the snapshot-query command.
pub fn run(file: &Path, pattern: &str, names_only: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_snapshot(file)?;

    if names_only {
        let names = db.names_matching(pattern)?;
        match format {
            "json" => println!("{}", serde_json::to_string_pretty(&names)?),
            _ => names.iter().for_each(|name| println!("{name}")),
        }
        return Ok(());
    }

    let rows = db.rows_matching(pattern)?;
    tracing::debug!(pattern, matched = rows.len(), "snapshot query");
    print_rows(&rows, format)
}
