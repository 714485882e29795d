//! Migration commands.

use crate::error::CliError;
use crate::Format;
use envsync_core::migration::MigrationRunResult;
use envsync_core::{MigrationManager, SettingsPersistence, CURRENT_SCHEMA_VERSION};
use envsync_store::{FileStore, InMemoryStore, SettingsStore};
use serde_json::json;
use std::path::Path;
use tracing::info;

/// List all registered migrations.
pub fn list(format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let manager = MigrationManager::with_builtin();
    let migrations = manager.list();

    if format == Format::Json {
        let entries: Vec<_> = migrations
            .iter()
            .map(|m| json!({ "version": m.version, "name": m.name, "description": m.description }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Registered Migrations");
    println!("=====================");
    for migration in &migrations {
        println!("  v{}: {}", migration.version, migration.name);
        if let Some(desc) = &migration.description {
            println!("      {}", desc);
        }
    }
    Ok(())
}

/// Upgrade the snapshot at `path` to the current schema.
pub fn run(
    path: &Path,
    namespace: &str,
    dry_run: bool,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Migrating settings at {:?}", path);

    let file = FileStore::open(path)?;
    let persistence = SettingsPersistence::new(namespace);
    let Some(from) = persistence.stored_version(&file) else {
        report_nothing(format, "no versioned snapshot")?;
        return Ok(());
    };
    if from >= CURRENT_SCHEMA_VERSION {
        report_nothing(format, "already at the current schema")?;
        return Ok(());
    }

    let result = if dry_run {
        let copy = InMemoryStore::with_values(file.snapshot());
        persistence.migrations().run(&copy, namespace, from)
    } else {
        let result = persistence.migrations().run(&file, namespace, from);
        if result.applied_count > 0 {
            file.set_float(&persistence.version_key(), result.final_version as f32)?;
            file.flush()?;
        }
        result
    };

    print_result(&result, from, dry_run, format)?;

    if let Some(failed) = result.migrations.iter().find(|m| !m.success) {
        return Err(CliError::MigrationFailed {
            version: failed.version,
            message: failed.error.clone().unwrap_or_default(),
        }
        .into());
    }
    Ok(())
}

fn report_nothing(format: Format, reason: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "applied": 0, "reason": reason }))?
        ),
        Format::Text => println!("Nothing to migrate: {}", reason),
    }
    Ok(())
}

fn print_result(
    result: &MigrationRunResult,
    from: u32,
    dry_run: bool,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    if format == Format::Json {
        let migrations: Vec<_> = result
            .migrations
            .iter()
            .map(|m| {
                json!({
                    "version": m.version,
                    "name": m.name,
                    "success": m.success,
                    "error": m.error,
                    "operations": m.operations.iter().map(|op| format!("{:?}", op)).collect::<Vec<_>>(),
                })
            })
            .collect();
        let value = json!({
            "from": from,
            "to": result.final_version,
            "dry_run": dry_run,
            "applied": result.applied_count,
            "failed": result.failed_count,
            "migrations": migrations,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if dry_run {
        println!("DRY RUN - no changes will be made");
        println!();
    }
    println!("Migrating v{} -> v{}", from, CURRENT_SCHEMA_VERSION);
    for migration in &result.migrations {
        let status = if migration.success { "ok" } else { "FAILED" };
        println!("  v{}: {} [{}]", migration.version, migration.name, status);
        for op in &migration.operations {
            println!("      {:?}", op);
        }
        if let Some(error) = &migration.error {
            println!("      error: {}", error);
        }
    }
    println!();
    println!(
        "{} applied, {} failed, snapshot now at v{}",
        result.applied_count,
        result.failed_count,
        if dry_run { from } else { result.final_version }
    );
    Ok(())
}
