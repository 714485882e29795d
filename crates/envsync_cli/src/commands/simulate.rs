//! Simulate command implementation.
//!
//! Attaches a synchronizer to an in-memory scene, applies edits and runs a
//! number of frames, then prints what reached the scene and the store.

use crate::error::CliError;
use crate::Format;
use envsync_core::{
    state_hash, CullMode, Domain, DomainState, FieldValue, LightSource, Rgb, SkyLightSource,
    ToneMapper,
};
use envsync_engine::{FrameReport, MemoryAuthority, SyncConfig, SyncPolicy, Synchronizer};
use envsync_store::{FileStore, InMemoryStore, SettingsStore};
use serde_json::json;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Options of one simulation.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Policy applied on attach.
    pub policy: SyncPolicy,
    /// Frames to run.
    pub frames: u64,
    /// `domain.field=value` edits applied before the first frame.
    pub edits: Vec<String>,
    /// Start from a scene with no objects.
    pub empty_scene: bool,
    /// Persist into the settings file.
    pub save: bool,
}

/// An edit parsed from the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Toggle a domain.
    Enabled(Domain, bool),
    /// Set a field.
    Field(Domain, String, FieldValue),
}

/// Runs the simulate command.
pub fn run(
    path: Option<&Path>,
    namespace: &str,
    options: &SimulateOptions,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn SettingsStore> = match (path, options.save) {
        (Some(path), true) => Arc::new(FileStore::open_with_create_dirs(path)?),
        (Some(path), false) => Arc::new(InMemoryStore::with_values(FileStore::open(path)?.snapshot())),
        (None, true) => return Err(CliError::SaveWithoutPath.into()),
        (None, false) => Arc::new(InMemoryStore::new()),
    };

    let config = SyncConfig::new()
        .with_policy(options.policy)
        .with_key_namespace(namespace);
    let mut sync = Synchronizer::new(config, store);
    if let Err(err) = sync.load_settings() {
        warn!(error = %err, "stored settings not loaded");
    }

    let scene = MemoryAuthority::new();
    if !options.empty_scene {
        for domain in Domain::ALL.into_iter().filter(|d| d.enabled_by_default()) {
            scene.insert_state(&DomainState::default_for(domain));
        }
    }
    sync.attach(Box::new(scene.clone()));

    {
        let mut update = sync.update();
        for raw in &options.edits {
            match parse_edit(raw, update.cache())? {
                Edit::Enabled(domain, enabled) => {
                    update.set_enabled(domain, enabled);
                }
                Edit::Field(domain, name, value) => {
                    update.set_field(domain, &name, value)?;
                }
            }
        }
    }

    let reports: Vec<FrameReport> = (0..options.frames).map(|_| sync.on_frame_start()).collect();
    let binding = sync.binding_state();
    sync.detach();

    let stats = sync.stats();
    let domains: Vec<_> = Domain::ALL
        .into_iter()
        .map(|domain| {
            (
                domain,
                sync.cache().is_enabled(domain),
                scene.is_domain_active(domain),
                state_hash(&sync.cache().state(domain)),
            )
        })
        .collect();

    match format {
        Format::Json => {
            let value = json!({
                "policy": options.policy.to_string(),
                "binding": format!("{:?}", binding),
                "frames": reports.iter().map(|r| json!({
                    "frame": r.frame,
                    "pulled": r.pulled,
                    "pushed": r.pushed.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
                    "persisted": r.persisted,
                })).collect::<Vec<_>>(),
                "stats": {
                    "pulls": stats.pulls,
                    "deferred_pulls": stats.deferred_pulls,
                    "pushes": stats.pushes,
                    "field_writes": stats.field_writes,
                    "objects_created": stats.objects_created,
                    "objects_removed": stats.objects_removed,
                    "objects_deactivated": stats.objects_deactivated,
                    "objects_refreshed": stats.objects_refreshed,
                    "push_failures": stats.push_failures,
                    "corrections": stats.corrections,
                    "persists": stats.persists,
                },
                "domains": domains.iter().map(|(domain, enabled, active, hash)| json!({
                    "domain": domain,
                    "enabled": enabled,
                    "in_scene": active,
                    "hash": format!("{:016x}", hash),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Format::Text => {
            println!("Simulation ({} policy, bound as {:?})", options.policy, binding);
            println!();
            for report in &reports {
                println!(
                    "  frame {:>3}: pulled={} pushed={:?} persisted={}",
                    report.frame, report.pulled, report.pushed, report.persisted
                );
            }
            println!();
            println!(
                "Pulls: {}  Pushes: {}  Field writes: {}  Created: {}  Removed: {}  Deactivated: {}  Refreshed: {}",
                stats.pulls,
                stats.pushes,
                stats.field_writes,
                stats.objects_created,
                stats.objects_removed,
                stats.objects_deactivated,
                stats.objects_refreshed
            );
            println!(
                "Failures: {}  Corrections: {}  Persists: {}",
                stats.push_failures, stats.corrections, stats.persists
            );
            println!();
            for (domain, enabled, active, hash) in domains {
                println!(
                    "  {:<14} {:<9} scene={:<8} {:016x}",
                    domain.to_string(),
                    if enabled { "enabled" } else { "disabled" },
                    if active { "active" } else { "-" },
                    hash
                );
            }
        }
    }
    Ok(())
}

/// Parses `domain.field=value` against the current value's kind.
///
/// `domain.enabled=true|false` toggles the domain.
pub fn parse_edit(
    raw: &str,
    cache: &envsync_core::EnvironmentCache,
) -> Result<Edit, CliError> {
    let malformed = || CliError::MalformedEdit(raw.to_string());
    let (key, value) = raw.split_once('=').ok_or_else(malformed)?;
    let (domain_name, field) = key.trim().split_once('.').ok_or_else(malformed)?;
    let domain =
        Domain::from_name(domain_name).ok_or_else(|| CliError::UnknownDomain(domain_name.to_string()))?;
    let value = value.trim();

    if field == "enabled" {
        let enabled = parse_bool(value)?;
        return Ok(Edit::Enabled(domain, enabled));
    }

    let current = cache.field(domain, field).ok_or_else(|| CliError::UnknownField {
        domain: domain.to_string(),
        field: field.to_string(),
    })?;
    let parsed = match current {
        FieldValue::Float(_) => FieldValue::Float(parse_float(value)?),
        FieldValue::Bool(_) => FieldValue::Bool(parse_bool(value)?),
        FieldValue::Text(_) => FieldValue::Text(value.to_string()),
        FieldValue::Color(_) => FieldValue::Color(parse_color(value)?),
        FieldValue::Choice(_) => FieldValue::Choice(parse_choice(domain, field, value)?),
    };
    Ok(Edit::Field(domain, field.to_string(), parsed))
}

fn bad(value: &str, expected: &'static str) -> CliError {
    CliError::BadValue {
        value: value.to_string(),
        expected,
    }
}

fn parse_float(value: &str) -> Result<f32, CliError> {
    value.parse().map_err(|_| bad(value, "a number"))
}

fn parse_bool(value: &str) -> Result<bool, CliError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(bad(value, "a boolean")),
    }
}

fn parse_color(value: &str) -> Result<Rgb, CliError> {
    let channels: Vec<f32> = value
        .split(',')
        .map(|c| c.trim().parse())
        .collect::<Result<_, _>>()
        .map_err(|_| bad(value, "r,g,b"))?;
    match channels.as_slice() {
        [v] => Ok(Rgb::splat(*v)),
        [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
        _ => Err(bad(value, "r,g,b")),
    }
}

fn parse_choice(domain: Domain, field: &str, value: &str) -> Result<u32, CliError> {
    if let Ok(code) = value.parse::<u32>() {
        return Ok(code);
    }
    fn code_of<T: FromStr>(value: &str, to_code: fn(T) -> u32) -> Option<u32> {
        T::from_str(value).ok().map(to_code)
    }
    let code = match (domain, field) {
        (Domain::Sun, "light_source") => code_of(value, LightSource::code),
        (Domain::SkyLight, "source") => code_of(value, SkyLightSource::code),
        (Domain::RendererFlags, "tone_mapper") => code_of(value, ToneMapper::code),
        (Domain::RendererFlags, "cull_mode") => code_of(value, CullMode::code),
        _ => None,
    };
    code.ok_or_else(|| bad(value, "a choice name or code"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use envsync_core::EnvironmentCache;

    #[test]
    fn parses_edits_by_field_kind() {
        let cache = EnvironmentCache::new();
        assert_eq!(
            parse_edit("fog.density=0.5", &cache).unwrap(),
            Edit::Field(Domain::Fog, "density".into(), FieldValue::Float(0.5))
        );
        assert_eq!(
            parse_edit("fog.enabled=on", &cache).unwrap(),
            Edit::Enabled(Domain::Fog, true)
        );
        assert_eq!(
            parse_edit("skydisc.color=1,0.5,0", &cache).unwrap(),
            Edit::Field(
                Domain::SkyDisc,
                "color".into(),
                FieldValue::Color(Rgb::new(1.0, 0.5, 0.0))
            )
        );
        assert_eq!(
            parse_edit("sun.light_source=scene", &cache).unwrap(),
            Edit::Field(
                Domain::Sun,
                "light_source".into(),
                FieldValue::Choice(LightSource::SceneLight.code())
            )
        );
    }

    #[test]
    fn rejects_bad_edits() {
        let cache = EnvironmentCache::new();
        assert!(matches!(
            parse_edit("fog.density", &cache),
            Err(CliError::MalformedEdit(_))
        ));
        assert!(matches!(
            parse_edit("clouds.density=1", &cache),
            Err(CliError::UnknownDomain(_))
        ));
        assert!(matches!(
            parse_edit("fog.thickness=1", &cache),
            Err(CliError::UnknownField { .. })
        ));
        assert!(matches!(
            parse_edit("fog.density=thick", &cache),
            Err(CliError::BadValue { .. })
        ));
    }

    #[test]
    fn simulate_saves_into_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        let options = SimulateOptions {
            policy: SyncPolicy::ForceOverride,
            frames: 2,
            edits: vec!["fog.enabled=true".into(), "fog.density=0.3".into()],
            empty_scene: true,
            save: true,
        };
        run(Some(&path), "env", &options, Format::Json).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_float("env.fog.density"), Some(0.3));
        assert_eq!(store.get_bool("env.fog.enabled"), Some(true));
    }
}
