//! Property tests across the store, core and engine crates.

use envsync_core::{validate, Domain, DomainState, FieldValue, FogState};
use envsync_engine::{AuthorityCounters, SyncPolicy};
use envsync_testkit::prelude::*;
use proptest::prelude::*;

/// Writes every field and enabled flag of `cache` through the synchronizer.
fn apply(harness: &mut TestHarness, cache: &envsync_core::EnvironmentCache) {
    let mut update = harness.sync.update();
    for domain in Domain::ALL {
        for (name, value) in cache.state(domain).fields() {
            update.set_field(domain, name, value).unwrap();
        }
        update.set_enabled(domain, cache.is_enabled(domain));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn persistence_round_trip(cache in cache_strategy()) {
        let store = saved(&cache);
        let back = loaded(&store);

        prop_assert_eq!(back.enabled_mask(), cache.enabled_mask());
        for domain in cache.enabled_mask().iter() {
            let expected = cache.state(domain);
            let actual = back.state(domain);
            for ((name, want), (_, got)) in expected.fields().into_iter().zip(actual.fields()) {
                prop_assert!(
                    want.approx_eq(&got, 1e-4),
                    "{}.{}: saved {} loaded {}", domain, name, want, got
                );
            }
        }
    }

    #[test]
    fn validation_is_idempotent(mut state in any_raw_state_strategy()) {
        validate(&mut state, false);
        let once = state.clone();
        let report = validate(&mut state, false);
        prop_assert!(report.is_clean(), "second pass corrected {:?}", report.corrections);
        prop_assert_eq!(state, once);
    }

    #[test]
    fn second_push_writes_nothing(cache in cache_strategy()) {
        let mut harness = TestHarness::attached(SyncPolicy::ForceOverride);
        apply(&mut harness, &cache);
        harness.run_frames(1);
        prop_assert!(harness.dirty_mask().is_empty());

        harness.scene.reset_counters();
        {
            let mut update = harness.sync.update();
            for domain in Domain::ALL {
                let state = update.cache().state(domain);
                let float = state
                    .fields()
                    .into_iter()
                    .find_map(|(name, value)| value.as_float().map(|v| (name, v)));
                if let Some((name, v)) = float {
                    update.set_field(domain, name, v + 1.0).unwrap();
                    update.set_field(domain, name, v).unwrap();
                }
            }
        }
        harness.push_pending_changes();

        prop_assert_eq!(harness.scene.counters(), AuthorityCounters::default());
        prop_assert!(harness.dirty_mask().is_empty());
    }

    #[test]
    fn transaction_pushes_last_value_once(values in prop::collection::vec(0.0f32..100.0, 1..20)) {
        prop_assume!(values.iter().any(|v| *v != 10.0));
        let mut harness = TestHarness::attached(SyncPolicy::ForceOverride);
        harness.run_frames(1);
        harness.scene.reset_counters();
        let revision = harness.revision();
        let pushes = harness.stats().pushes;

        {
            let mut update = harness.sync.update();
            for v in &values {
                update.set_field(Domain::Sun, "intensity", *v).unwrap();
            }
        }
        prop_assert_eq!(harness.revision(), revision + 1);

        harness.run_frames(1);
        let last = *values.last().unwrap();
        prop_assert_eq!(harness.stats().pushes, pushes + 1);
        prop_assert!(harness.scene.writes_to(Domain::Sun) <= 1);
        prop_assert_eq!(
            harness.scene.field(Domain::Sun, "intensity"),
            Some(FieldValue::Float(last))
        );
    }

    #[test]
    fn pull_never_clobbers_pending_edit(edit in 0.0f32..1.0, external in 0.0f32..1.0) {
        let initial = FogState::default().density;
        prop_assume!((edit - initial).abs() > 1e-3);

        let mut harness = TestHarness::new(SyncPolicy::FollowExternal);
        harness.scene.insert_state(&DomainState::Fog(FogState::default()));
        harness.attach();
        harness.run_frames(1);

        harness.set_field(Domain::Fog, "density", edit).unwrap();
        harness.scene.set_external(Domain::Fog, "density", FieldValue::Float(external));
        harness.request_resync();
        harness.run_frames(2);

        prop_assert_eq!(harness.cache().fog.density, edit);
        prop_assert_eq!(
            harness.scene.field(Domain::Fog, "density"),
            Some(FieldValue::Float(edit))
        );
    }
}

#[test]
fn detach_then_reload_recovers_edits() {
    let mut harness = TestHarness::with_config(
        envsync_engine::SyncConfig::new().with_persist_debounce_frames(1000),
    );
    harness.populate_scene();
    harness.attach();
    harness.run_frames(1);

    harness.set_enabled(Domain::Fog, true);
    harness.set_field(Domain::Fog, "max_opacity", 0.5).unwrap();
    harness.run_frames(3);
    assert_eq!(harness.stats().persists, 0);

    harness.sync.detach();
    let reloaded = harness.reload();
    assert!(reloaded.cache().is_enabled(Domain::Fog));
    assert_eq!(reloaded.cache().fog.max_opacity, 0.5);
}

#[test]
fn legacy_snapshot_is_rewritten_on_first_frame() {
    let store = std::sync::Arc::new(legacy_snapshot(1));
    let mut harness = TestHarness::with_store(immediate_config(SyncPolicy::FollowExternal), store);
    let report = harness.run_frames(1);

    assert!(report[0].persisted);
    let reloaded = harness.reload();
    assert_eq!(reloaded.cache().fog.height_falloff, 0.6);
    assert!((reloaded.cache().sun.elevation_deg - 30.0).abs() < 1e-4);
}
