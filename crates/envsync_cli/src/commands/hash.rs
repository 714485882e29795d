//! Hash command implementation.

use super::load_snapshot;
use crate::error::CliError;
use crate::Format;
use envsync_core::{state_hash, Domain};
use serde_json::json;
use std::path::Path;

/// Print the state hash of every domain, or of one.
pub fn run(
    path: &Path,
    namespace: &str,
    domain: Option<&str>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let domains = match domain {
        Some(name) => {
            vec![Domain::from_name(name).ok_or_else(|| CliError::UnknownDomain(name.to_string()))?]
        }
        None => Domain::ALL.to_vec(),
    };
    let snapshot = load_snapshot(path, namespace)?;

    let rows: Vec<(Domain, bool, u64)> = domains
        .into_iter()
        .map(|d| {
            (
                d,
                snapshot.cache.is_enabled(d),
                state_hash(&snapshot.cache.state(d)),
            )
        })
        .collect();

    match format {
        Format::Json => {
            let value: Vec<_> = rows
                .iter()
                .map(|(domain, enabled, hash)| {
                    json!({ "domain": domain, "enabled": enabled, "hash": format!("{:016x}", hash) })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Format::Text => {
            for (domain, enabled, hash) in rows {
                println!(
                    "{:016x}  {:<14} {}",
                    hash,
                    domain.to_string(),
                    if enabled { "enabled" } else { "disabled" }
                );
            }
        }
    }
    Ok(())
}
