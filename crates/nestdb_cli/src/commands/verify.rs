//! Verify command implementation.

use super::scan::{self, KeyKind};
use super::{open_existing, to_hex, CliError, Format};
use nestdb_core::{next_instance_id, Database, InstanceId, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, error};

/// A structural problem found by verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// A map's count cell disagrees with its number of entries.
    CountMismatch {
        /// Map instance.
        instance: u64,
        /// Count stored in the cell.
        stored: u64,
        /// Entries actually present.
        actual: u64,
    },
    /// A count cell exists for an ID the allocator never handed out.
    UnallocatedCount {
        /// Map instance.
        instance: u64,
    },
    /// Entries exist for a map without a count cell.
    MissingCount {
        /// Map instance.
        instance: u64,
        /// Number of entries found.
        entries: u64,
    },
    /// A map reference points at an instance with no count cell.
    DanglingReference {
        /// Hex of the physical key holding the reference.
        key: String,
        /// Referenced instance.
        instance: u64,
    },
    /// A stored value or cell could not be decoded.
    Undecodable {
        /// Hex of the physical key.
        key: String,
        /// Decoder message.
        message: String,
    },
    /// A key outside the known layout.
    UnknownKey {
        /// Hex of the physical key.
        key: String,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch {
                instance,
                stored,
                actual,
            } => write!(
                f,
                "map#{instance}: count cell says {stored}, found {actual} entries"
            ),
            Self::UnallocatedCount { instance } => {
                write!(f, "map#{instance}: count cell beyond allocator")
            }
            Self::MissingCount { instance, entries } => {
                write!(f, "map#{instance}: {entries} entries but no count cell")
            }
            Self::DanglingReference { key, instance } => {
                write!(f, "{key}: references unknown map#{instance}")
            }
            Self::Undecodable { key, message } => write!(f, "{key}: {message}"),
            Self::UnknownKey { key } => write!(f, "{key}: unknown key layout"),
        }
    }
}

/// Verification result.
#[derive(Debug, Default, Serialize)]
pub struct VerifyResult {
    /// Number of keys checked.
    pub keys_checked: usize,
    /// Number of maps (count cells) found.
    pub maps_checked: usize,
    /// Maps nothing references, left behind by deleted or overwritten items.
    pub unreferenced_maps: Vec<u64>,
    /// Problems found.
    pub problems: Vec<Problem>,
}

impl VerifyResult {
    /// Returns `true` if no problems were found.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, format: Format) -> Result<(), CliError> {
    let db = open_existing(path)?;
    let result = verify(&db)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(path, &result),
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err(CliError::VerificationFailed(result.problems.len()))
    }
}

/// Checks every map's count cell, the allocator and all map references.
pub fn verify(db: &Database) -> Result<VerifyResult, CliError> {
    let snapshot = db.snapshot();
    let next = next_instance_id(&snapshot)?;

    let mut result = VerifyResult::default();
    let mut counts: BTreeMap<InstanceId, u64> = BTreeMap::new();
    let mut entries: BTreeMap<InstanceId, u64> = BTreeMap::new();
    let mut references: Vec<(Vec<u8>, InstanceId)> = Vec::new();

    scan::walk(&snapshot, |key, value| {
        result.keys_checked += 1;
        let holds_value = match scan::classify(key) {
            KeyKind::Item { .. } => true,
            KeyKind::Entry { id, .. } => {
                // An empty value is an absent entry.
                if !value.is_empty() {
                    *entries.entry(id).or_default() += 1;
                }
                true
            }
            KeyKind::CountCell(id) => {
                match <[u8; 8]>::try_from(value) {
                    Ok(bytes) => {
                        counts.insert(id, u64::from_le_bytes(bytes));
                    }
                    Err(_) => result.problems.push(Problem::Undecodable {
                        key: to_hex(key),
                        message: format!("count cell is {} bytes, expected 8", value.len()),
                    }),
                }
                false
            }
            KeyKind::Allocator => false,
            KeyKind::Unknown => {
                result.problems.push(Problem::UnknownKey { key: to_hex(key) });
                false
            }
        };
        if !holds_value {
            return;
        }
        match Value::decode(db, value) {
            Ok(Some(Value::Map(map))) => {
                if let Some(id) = map.instance_id() {
                    references.push((key.to_vec(), id));
                }
            }
            Ok(_) => {}
            Err(err) => result.problems.push(Problem::Undecodable {
                key: to_hex(key),
                message: err.to_string(),
            }),
        }
    })?;

    result.maps_checked = counts.len();

    for (&id, &stored) in &counts {
        let actual = entries.get(&id).copied().unwrap_or(0);
        if stored != actual {
            result.problems.push(Problem::CountMismatch {
                instance: id.as_u64(),
                stored,
                actual,
            });
        }
        if id >= next {
            result.problems.push(Problem::UnallocatedCount {
                instance: id.as_u64(),
            });
        }
    }

    for (&id, &found) in &entries {
        if !counts.contains_key(&id) {
            result.problems.push(Problem::MissingCount {
                instance: id.as_u64(),
                entries: found,
            });
        }
    }

    let mut referenced = BTreeSet::new();
    for (key, id) in references {
        if !counts.contains_key(&id) {
            result.problems.push(Problem::DanglingReference {
                key: to_hex(&key),
                instance: id.as_u64(),
            });
        }
        referenced.insert(id);
    }
    result.unreferenced_maps = counts
        .keys()
        .filter(|id| !referenced.contains(id))
        .map(|id| id.as_u64())
        .collect();

    for problem in &result.problems {
        error!(%problem, "verification problem");
    }
    debug!(
        keys = result.keys_checked,
        maps = result.maps_checked,
        problems = result.problems.len(),
        "verification finished"
    );
    Ok(result)
}

fn print_text_output(path: &Path, result: &VerifyResult) {
    println!("Verifying database at {:?}", path);
    println!();
    println!("  Keys checked: {}", result.keys_checked);
    println!("  Maps checked: {}", result.maps_checked);
    if !result.unreferenced_maps.is_empty() {
        println!(
            "  Unreferenced maps: {} (not reclaimed)",
            result.unreferenced_maps.len()
        );
    }

    if !result.problems.is_empty() {
        println!();
        println!("  Problems:");
        for problem in &result.problems {
            println!("    - {problem}");
        }
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
    } else {
        println!("✗ Database verification failed");
    }
}
