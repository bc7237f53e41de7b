//! Inspect command implementation.

use super::scan::{self, KeyKind};
use super::{open_existing, to_hex, CliError, Format};
use nestdb_core::{next_instance_id, Database};
use nestdb_storage::LOG_FILE;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Default, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Batch log size in bytes.
    pub log_size: u64,
    /// Sequence number of the last applied batch.
    pub sequence: u64,
    /// Next instance ID the allocator will hand out.
    pub next_instance_id: u64,
    /// Number of table items.
    pub item_count: usize,
    /// Number of map count cells.
    pub count_cells: usize,
    /// Number of map entries.
    pub entry_count: usize,
    /// Number of keys outside the known layout.
    pub unknown_keys: usize,
    /// Total bytes of keys and values.
    pub data_size: usize,
    /// Per-table statistics, keyed by hex prefix.
    pub tables: Vec<TableStats>,
}

/// Statistics for a single table prefix.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table prefix as hex.
    pub prefix: String,
    /// Number of items.
    pub item_count: usize,
    /// Total bytes of item values.
    pub data_size: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), CliError> {
    let db = open_existing(path)?;
    let mut result = inspect(&db)?;
    result.path = path.display().to_string();
    result.log_size = std::fs::metadata(path.join(LOG_FILE))
        .map(|m| m.len())
        .unwrap_or(0);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Collects key statistics from the database's current snapshot.
pub fn inspect(db: &Database) -> Result<InspectResult, CliError> {
    let snapshot = db.snapshot();
    let mut result = InspectResult {
        sequence: snapshot.sequence(),
        next_instance_id: next_instance_id(&snapshot)?.as_u64(),
        ..InspectResult::default()
    };
    let mut tables: BTreeMap<Vec<u8>, (usize, usize)> = BTreeMap::new();

    scan::walk(&snapshot, |key, value| {
        result.data_size += key.len() + value.len();
        match scan::classify(key) {
            KeyKind::Item { prefix, .. } => {
                result.item_count += 1;
                let stats = tables.entry(prefix.to_vec()).or_default();
                stats.0 += 1;
                stats.1 += value.len();
            }
            KeyKind::CountCell(_) => result.count_cells += 1,
            KeyKind::Entry { .. } => result.entry_count += 1,
            KeyKind::Allocator => {}
            KeyKind::Unknown => result.unknown_keys += 1,
        }
    })?;

    result.tables = tables
        .into_iter()
        .map(|(prefix, (item_count, data_size))| TableStats {
            prefix: to_hex(&prefix),
            item_count,
            data_size,
        })
        .collect();
    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("NestDB Database Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:      {}", format_size(result.log_size));
    println!("  Data size:     {}", format_size(result.data_size as u64));
    println!("  Sequence:      {}", result.sequence);
    println!();
    println!("Keys:");
    println!("  Table items:   {}", result.item_count);
    println!("  Maps:          {}", result.count_cells);
    println!("  Map entries:   {}", result.entry_count);
    println!("  Unknown:       {}", result.unknown_keys);
    println!("  Next instance: {}", result.next_instance_id);

    if !result.tables.is_empty() {
        println!();
        println!("Tables:");
        for table in &result.tables {
            println!(
                "  [{}] {} items, {} bytes",
                table.prefix, table.item_count, table.data_size
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
