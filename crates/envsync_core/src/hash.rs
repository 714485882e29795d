//! Diagnostic hashing and field diffs.
//!
//! Hashes are for logging only: they let the synchronizer notice that the
//! authority no longer holds what was last pushed without keeping per-field
//! bookkeeping. Nothing branches on them except log output.

use crate::domain::Domain;
use crate::field::FieldValue;
use crate::state::DomainState;
use tracing::debug;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8], mut hash: u64) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// splitmix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn float_bits(v: f32) -> u32 {
    // 0.0 and -0.0 compare equal and must hash equal
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

fn value_hash(value: &FieldValue) -> u64 {
    match value {
        FieldValue::Float(v) => fnv1a(&float_bits(*v).to_le_bytes(), FNV_OFFSET ^ 1),
        FieldValue::Bool(v) => fnv1a(&[u8::from(*v)], FNV_OFFSET ^ 2),
        FieldValue::Color(c) => c
            .to_array()
            .iter()
            .fold(FNV_OFFSET ^ 3, |h, ch| fnv1a(&float_bits(*ch).to_le_bytes(), h)),
        FieldValue::Text(s) => fnv1a(s.as_bytes(), FNV_OFFSET ^ 4),
        FieldValue::Choice(code) => fnv1a(&code.to_le_bytes(), FNV_OFFSET ^ 5),
    }
}

/// Stable 64-bit hash of a domain's canonical state.
///
/// The hash combines per-field hashes with a wrapping sum, so it does not
/// depend on field order.
#[must_use]
pub fn state_hash(state: &DomainState) -> u64 {
    let seed = mix(state.domain().index() as u64 + 1);
    state.fields().iter().fold(seed, |acc, (name, value)| {
        let field = fnv1a(name.as_bytes(), FNV_OFFSET) ^ value_hash(value).rotate_left(17);
        acc.wrapping_add(mix(field))
    })
}

/// A field whose value differs between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Field name.
    pub field: &'static str,
    /// Value in the first snapshot.
    pub before: FieldValue,
    /// Value in the second snapshot.
    pub after: FieldValue,
}

/// Fields that differ between two snapshots, allowing `eps` on floats.
///
/// Snapshots of different domains have no fields in common and produce an
/// empty diff.
#[must_use]
pub fn diff_within(before: &DomainState, after: &DomainState, eps: f32) -> Vec<FieldChange> {
    if before.domain() != after.domain() {
        return Vec::new();
    }
    before
        .fields()
        .into_iter()
        .filter_map(|(field, old)| {
            let new = after.field(field)?;
            (!old.approx_eq(&new, eps)).then_some(FieldChange {
                field,
                before: old,
                after: new,
            })
        })
        .collect()
}

/// Fields that differ exactly between two snapshots.
#[must_use]
pub fn diff(before: &DomainState, after: &DomainState) -> Vec<FieldChange> {
    diff_within(before, after, 0.0)
}

/// Logs every changed field at debug level and returns how many changed.
pub fn diff_and_log(domain: Domain, context: &str, before: &DomainState, after: &DomainState) -> usize {
    let changes = diff(before, after);
    for change in &changes {
        debug!(
            domain = %domain,
            context,
            field = change.field,
            before = %change.before,
            after = %change.after,
            "field changed"
        );
    }
    changes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Rgb;
    use crate::state::{FogState, SunState};

    #[test]
    fn equal_states_hash_equal() {
        let a = DomainState::Fog(FogState::default());
        let b = DomainState::Fog(FogState::default());
        assert_eq!(state_hash(&a), state_hash(&b));
    }

    #[test]
    fn any_field_change_changes_hash() {
        let base = DomainState::default_for(Domain::Sun);
        let base_hash = state_hash(&base);

        for (field, value) in base.fields() {
            let mut changed = base.clone();
            let new = match value {
                FieldValue::Float(v) => FieldValue::Float(v + 1.0),
                FieldValue::Bool(v) => FieldValue::Bool(!v),
                FieldValue::Color(c) => FieldValue::Color(Rgb::new(c.r * 0.5, c.g, c.b)),
                FieldValue::Text(s) => FieldValue::Text(format!("{s}x")),
                FieldValue::Choice(code) => FieldValue::Choice(1 - code.min(1)),
            };
            changed.set_field(field, new).unwrap();
            assert_ne!(state_hash(&changed), base_hash, "{field} did not affect hash");
        }
    }

    #[test]
    fn signed_zero_hashes_equal() {
        let a = DomainState::Fog(FogState {
            start_distance: 0.0,
            ..FogState::default()
        });
        let b = DomainState::Fog(FogState {
            start_distance: -0.0,
            ..FogState::default()
        });
        assert_eq!(state_hash(&a), state_hash(&b));
    }

    #[test]
    fn domains_hash_apart() {
        let sky_light = DomainState::default_for(Domain::SkyLight);
        let sky_disc = DomainState::default_for(Domain::SkyDisc);
        assert_ne!(state_hash(&sky_light), state_hash(&sky_disc));
    }

    #[test]
    fn diff_lists_only_changed_fields() {
        let before = DomainState::Sun(SunState::default());
        let after = DomainState::Sun(SunState {
            intensity: 20.0,
            cast_shadows: false,
            ..SunState::default()
        });

        let changes = diff(&before, &after);
        let fields: Vec<_> = changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["intensity", "cast_shadows"]);
        assert_eq!(changes[0].before, FieldValue::Float(10.0));
        assert_eq!(changes[0].after, FieldValue::Float(20.0));

        assert_eq!(diff_and_log(Domain::Sun, "test", &before, &after), 2);
        assert!(diff(&before, &before).is_empty());
    }

    #[test]
    fn diff_within_ignores_noise() {
        let before = DomainState::Sun(SunState::default());
        let after = DomainState::Sun(SunState {
            elevation_deg: 45.000_004,
            ..SunState::default()
        });
        assert_eq!(diff(&before, &after).len(), 1);
        assert!(diff_within(&before, &after, 1e-4).is_empty());
    }

    #[test]
    fn diff_across_domains_is_empty() {
        let sun = DomainState::default_for(Domain::Sun);
        let fog = DomainState::default_for(Domain::Fog);
        assert!(diff(&sun, &fog).is_empty());
    }
}
