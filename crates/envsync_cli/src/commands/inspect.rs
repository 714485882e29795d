//! Inspect command implementation.

use super::load_snapshot;
use crate::Format;
use envsync_core::{state_hash, Domain, FieldValue, CURRENT_SCHEMA_VERSION};
use envsync_store::StoredValue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Settings file path.
    pub path: String,
    /// Key namespace.
    pub namespace: String,
    /// Schema version in the file.
    pub stored_version: Option<u32>,
    /// Schema version this build writes.
    pub current_version: u32,
    /// Whether the file holds a custom snapshot.
    pub custom_snapshot: bool,
    /// Migrations a load runs.
    pub migrations: Vec<String>,
    /// Whether the file was written by a newer build.
    pub newer_schema: bool,
    /// Values validation repaired.
    pub corrections: usize,
    /// Per-domain state after loading.
    pub domains: Vec<DomainView>,
    /// Raw store entries (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<BTreeMap<String, StoredValue>>,
}

/// One domain as a load would apply it.
#[derive(Debug, Serialize)]
pub struct DomainView {
    /// Domain name.
    pub domain: Domain,
    /// Enabled flag.
    pub enabled: bool,
    /// Whether any field was read from the file.
    pub loaded: bool,
    /// State hash.
    pub hash: String,
    /// Field values.
    pub fields: BTreeMap<&'static str, FieldValue>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    namespace: &str,
    show_raw: bool,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = load_snapshot(path, namespace)?;
    let report = &snapshot.report;

    let domains = Domain::ALL
        .into_iter()
        .map(|domain| {
            let state = snapshot.cache.state(domain);
            DomainView {
                domain,
                enabled: snapshot.cache.is_enabled(domain),
                loaded: report.loaded_domains.contains(domain),
                hash: format!("{:016x}", state_hash(&state)),
                fields: state.fields().into_iter().collect(),
            }
        })
        .collect();

    let result = InspectResult {
        path: path.display().to_string(),
        namespace: namespace.to_string(),
        stored_version: report.stored_version,
        current_version: CURRENT_SCHEMA_VERSION,
        custom_snapshot: report.custom_snapshot,
        migrations: report.applied_migrations.clone(),
        newer_schema: report.newer_schema,
        corrections: report.corrections,
        domains,
        raw: show_raw.then(|| snapshot.file.snapshot()),
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Environment Settings");
    println!("====================");
    println!();
    println!("Path:      {}", result.path);
    println!("Namespace: {}", result.namespace);
    match result.stored_version {
        Some(v) => println!("Schema:    v{} (current v{})", v, result.current_version),
        None => println!("Schema:    none (current v{})", result.current_version),
    }
    println!("Custom:    {}", if result.custom_snapshot { "yes" } else { "no" });
    if result.newer_schema {
        println!("Warning:   written by a newer schema, unknown keys were skipped");
    }
    if !result.migrations.is_empty() {
        println!("Pending migrations: {}", result.migrations.join(", "));
    }
    if result.corrections > 0 {
        println!("Out-of-range values repaired on load: {}", result.corrections);
    }

    for view in &result.domains {
        println!();
        println!(
            "[{}] {} hash={}{}",
            view.domain,
            if view.enabled { "enabled" } else { "disabled" },
            view.hash,
            if view.loaded { "" } else { " (defaults)" }
        );
        for (name, value) in &view.fields {
            println!("  {:<28} {}", name, value);
        }
    }

    if let Some(raw) = &result.raw {
        println!();
        println!("Raw entries:");
        for (key, value) in raw {
            println!("  {} = {:?}", key, value);
        }
    }
}
