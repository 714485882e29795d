//! Property-based test generators using proptest.
//!
//! Raw strategies produce anything a caller could write, including NaN and
//! out-of-range values. Valid strategies run the validator over their
//! output, so every value lands where a push would leave it.

use envsync_core::{
    validate, CullMode, Domain, DomainMask, DomainState, EnvironmentCache, FieldValue,
    LightSource, Rgb, SkyLightSource, ToneMapper,
};
use proptest::prelude::*;

/// Strategy for any domain.
pub fn domain_strategy() -> impl Strategy<Value = Domain> {
    prop::sample::select(Domain::ALL.to_vec())
}

/// Strategy for any set of domains.
pub fn domain_mask_strategy() -> impl Strategy<Value = DomainMask> {
    any::<u8>().prop_map(|bits| DomainMask::from_bits(bits & DomainMask::ALL.bits()))
}

/// Strategy for scalars, mostly ordinary but sometimes hostile.
pub fn raw_float_strategy() -> BoxedStrategy<f32> {
    prop_oneof![
        8 => -1000.0f32..1000.0,
        1 => -1.0e6f32..1.0e6,
        1 => prop::sample::select(vec![f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -0.0]),
    ]
    .boxed()
}

/// Strategy for finite scalars in a plausible range.
pub fn finite_float_strategy() -> BoxedStrategy<f32> {
    prop_oneof![4 => -400.0f32..400.0, 1 => 0.0f32..1.0].boxed()
}

/// Strategy for an image path.
pub fn image_path_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}/[a-z0-9_]{1,12}\\.(hdr|exr)").expect("Invalid regex")
}

fn choice_codes(domain: Domain, field: &str) -> Vec<u32> {
    match (domain, field) {
        (Domain::Sun, "light_source") => LightSource::ALL.iter().map(|c| c.code()).collect(),
        (Domain::SkyLight, "source") => SkyLightSource::ALL.iter().map(|c| c.code()).collect(),
        (Domain::RendererFlags, "tone_mapper") => {
            ToneMapper::ALL.iter().map(|c| c.code()).collect()
        }
        (Domain::RendererFlags, "cull_mode") => CullMode::ALL.iter().map(|c| c.code()).collect(),
        _ => Vec::new(),
    }
}

fn field_strategy(
    domain: Domain,
    field: &'static str,
    default: FieldValue,
    float: fn() -> BoxedStrategy<f32>,
) -> BoxedStrategy<FieldValue> {
    match default {
        FieldValue::Float(_) => float().prop_map(FieldValue::Float).boxed(),
        FieldValue::Bool(_) => any::<bool>().prop_map(FieldValue::Bool).boxed(),
        FieldValue::Color(_) => (float(), float(), float())
            .prop_map(|(r, g, b)| FieldValue::Color(Rgb::new(r, g, b)))
            .boxed(),
        FieldValue::Text(_) => image_path_strategy().prop_map(FieldValue::Text).boxed(),
        FieldValue::Choice(code) => {
            let codes = choice_codes(domain, field);
            if codes.is_empty() {
                Just(FieldValue::Choice(code)).boxed()
            } else {
                prop::sample::select(codes).prop_map(FieldValue::Choice).boxed()
            }
        }
    }
}

fn state_strategy(domain: Domain, float: fn() -> BoxedStrategy<f32>) -> BoxedStrategy<DomainState> {
    let defaults = DomainState::default_for(domain);
    let fields: Vec<_> = defaults.fields();
    let names: Vec<&'static str> = fields.iter().map(|(name, _)| *name).collect();
    let strategies: Vec<BoxedStrategy<FieldValue>> = fields
        .into_iter()
        .map(|(name, default)| field_strategy(domain, name, default, float))
        .collect();

    strategies
        .prop_map(move |values| {
            let mut state = DomainState::default_for(domain);
            for (name, value) in names.iter().zip(values) {
                // generated kinds always match the defaults
                let _ = state.set_field(name, value);
            }
            state
        })
        .boxed()
}

/// Strategy for a domain state with arbitrary, possibly invalid values.
pub fn raw_state_strategy(domain: Domain) -> BoxedStrategy<DomainState> {
    state_strategy(domain, raw_float_strategy)
}

/// Strategy for a domain state that passes validation unchanged.
pub fn valid_state_strategy(domain: Domain) -> BoxedStrategy<DomainState> {
    state_strategy(domain, finite_float_strategy)
        .prop_map(|mut state| {
            validate(&mut state, false);
            state
        })
        .boxed()
}

/// Strategy for a raw state of any domain.
pub fn any_raw_state_strategy() -> impl Strategy<Value = DomainState> {
    domain_strategy().prop_flat_map(raw_state_strategy)
}

/// Strategy for a customized cache of valid states and a random enabled set.
pub fn cache_strategy() -> impl Strategy<Value = EnvironmentCache> {
    let states: Vec<_> = Domain::ALL.into_iter().map(valid_state_strategy).collect();
    (states, domain_mask_strategy()).prop_map(|(states, enabled)| {
        let mut cache = EnvironmentCache::new();
        for state in states {
            let domain = state.domain();
            cache.replace(state);
            cache.set_enabled(domain, enabled.contains(domain));
        }
        cache.set_customized(true);
        cache
    })
}
