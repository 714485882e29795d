//! Validate-and-clamp for canonical state.
//!
//! Validation is a pure repair pass driven by a fixed rule table per domain.
//! It never fails on out-of-range numbers: they are clamped and reported.
//! The only rejection is structural (an enabled sky image with no path),
//! which leaves the domain dirty until the user supplies one.

use crate::domain::Domain;
use crate::field::{FieldValue, Rgb};
use crate::state::DomainState;
use tracing::debug;

/// How a field is repaired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Clamp a scalar into `[min, max]`.
    Range {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
    /// Wrap a scalar into `[0, period)`.
    Wrap {
        /// Wrap period.
        period: f32,
    },
    /// Clamp every colour channel into `[min, max]`.
    Color {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
}

/// A rule bound to a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    /// Field name.
    pub field: &'static str,
    /// Repair applied to it.
    pub rule: Rule,
}

const fn range(field: &'static str, min: f32, max: f32) -> FieldRule {
    FieldRule {
        field,
        rule: Rule::Range { min, max },
    }
}

const fn unit_color(field: &'static str) -> FieldRule {
    FieldRule {
        field,
        rule: Rule::Color { min: 0.0, max: 1.0 },
    }
}

const fn degrees(field: &'static str) -> FieldRule {
    FieldRule {
        field,
        rule: Rule::Wrap { period: 360.0 },
    }
}

const ATMOSPHERE_RULES: &[FieldRule] = &[
    range("planet_radius_km", 1.0, 100_000.0),
    range("atmosphere_height_km", 1.0, 1000.0),
    unit_color("rayleigh_scattering"),
    range("rayleigh_scale_height_km", 0.1, 100.0),
    range("mie_scattering", 0.0, 1.0),
    range("mie_anisotropy", 0.0, 0.999),
    range("mie_scale_height_km", 0.1, 100.0),
    unit_color("ozone_absorption"),
    unit_color("ground_albedo"),
    range("multi_scattering", 0.0, 1.0),
];

const SUN_RULES: &[FieldRule] = &[
    degrees("azimuth_deg"),
    range("elevation_deg", -90.0, 90.0),
    unit_color("color"),
    range("intensity", 0.0, 100_000.0),
    range("angular_diameter_deg", 0.01, 10.0),
];

const FOG_RULES: &[FieldRule] = &[
    range("density", 0.0, 1.0),
    range("height_falloff", 0.0, 10.0),
    range("start_distance", 0.0, 100_000.0),
    range("max_opacity", 0.0, 1.0),
    range("anisotropy", 0.0, 0.999),
    unit_color("color"),
];

const SKY_DISC_RULES: &[FieldRule] = &[
    range("size_scale", 0.1, 100.0),
    range("intensity", 0.0, 1000.0),
    range("softness", 0.0, 1.0),
    unit_color("color"),
];

const SKY_LIGHT_RULES: &[FieldRule] = &[range("intensity", 0.0, 100.0), unit_color("tint")];

const EXPOSURE_LIMIT: f32 = 16.0;

const SKY_IMAGE_RULES: &[FieldRule] = &[
    range("exposure_ev", -EXPOSURE_LIMIT, EXPOSURE_LIMIT),
    degrees("rotation_deg"),
    unit_color("tint"),
    range("intensity_scale", 1.0 / 65_536.0, 65_536.0),
];

const RENDERER_RULES: &[FieldRule] = &[range("exposure_compensation", -10.0, 10.0)];

/// The rule table for a domain.
#[must_use]
pub fn rules_for(domain: Domain) -> &'static [FieldRule] {
    match domain {
        Domain::Atmosphere => ATMOSPHERE_RULES,
        Domain::Sun => SUN_RULES,
        Domain::Fog => FOG_RULES,
        Domain::SkyDisc => SKY_DISC_RULES,
        Domain::SkyLight => SKY_LIGHT_RULES,
        Domain::SkyImage => SKY_IMAGE_RULES,
        Domain::RendererFlags => RENDERER_RULES,
    }
}

/// One repaired field.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Field name.
    pub field: &'static str,
    /// Value before repair.
    pub before: FieldValue,
    /// Value after repair.
    pub after: FieldValue,
}

/// Outcome of validating one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// The validated domain.
    pub domain: Domain,
    /// Fields that were repaired.
    pub corrections: Vec<Correction>,
    /// Why the state cannot be applied, if it cannot.
    pub rejection: Option<String>,
}

impl ValidationReport {
    /// True if nothing was repaired or rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty() && self.rejection.is_none()
    }

    /// True if the state must not be written to the authority.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}

fn repair_scalar(value: f32, rule: Rule, default: f32) -> f32 {
    if !value.is_finite() {
        return default;
    }
    match rule {
        Rule::Range { min, max } | Rule::Color { min, max } => value.clamp(min, max),
        Rule::Wrap { period } => {
            let wrapped = value.rem_euclid(period);
            // rem_euclid can round up to exactly `period` for tiny negatives
            if wrapped >= period {
                0.0
            } else {
                wrapped
            }
        }
    }
}

fn repair(value: &FieldValue, rule: Rule, default: &FieldValue) -> FieldValue {
    match (value, default) {
        (FieldValue::Float(v), FieldValue::Float(d)) => {
            FieldValue::Float(repair_scalar(*v, rule, *d))
        }
        (FieldValue::Color(c), FieldValue::Color(d)) => {
            let channels = c.to_array();
            let defaults = d.to_array();
            let out = std::array::from_fn(|i| repair_scalar(channels[i], rule, defaults[i]));
            FieldValue::Color(Rgb::from_array(out))
        }
        (other, _) => other.clone(),
    }
}

fn same(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Float(x), FieldValue::Float(y)) => x.to_bits() == y.to_bits(),
        (FieldValue::Color(x), FieldValue::Color(y)) => x
            .to_array()
            .iter()
            .zip(y.to_array())
            .all(|(p, q)| p.to_bits() == q.to_bits()),
        _ => a == b,
    }
}

fn apply(state: &mut DomainState, field: &'static str, value: FieldValue, report: &mut ValidationReport) {
    let Some(before) = state.field(field) else {
        return;
    };
    if same(&before, &value) {
        return;
    }
    if let Err(err) = state.set_field(field, value.clone()) {
        debug!(domain = %report.domain, field, error = %err, "validation rule does not fit field");
        return;
    }
    debug!(
        domain = %report.domain,
        field,
        before = %before,
        after = %value,
        "corrected out-of-range value"
    );
    report.corrections.push(Correction {
        field,
        before,
        after: value,
    });
}

/// Clamps and repairs a domain's state in place.
///
/// `enabled` is the domain's enabled flag; a disabled domain is repaired but
/// never rejected, since nothing will be written for it.
///
/// Validation is idempotent: running it on its own output changes nothing.
pub fn validate(state: &mut DomainState, enabled: bool) -> ValidationReport {
    let domain = state.domain();
    let defaults = DomainState::default_for(domain);
    let mut report = ValidationReport {
        domain,
        corrections: Vec::new(),
        rejection: None,
    };

    for rule in rules_for(domain) {
        let (Some(current), Some(default)) = (state.field(rule.field), defaults.field(rule.field))
        else {
            continue;
        };
        let repaired = repair(&current, rule.rule, &default);
        apply(state, rule.field, repaired, &mut report);
    }

    if let DomainState::SkyImage(image) = &*state {
        let derived = FieldValue::Float(image.exposure_ev.exp2());
        let missing_path = image.path.trim().is_empty();
        apply(state, "intensity_scale", derived, &mut report);
        if enabled && missing_path {
            report.rejection = Some("sky image is enabled without an image path".to_string());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AtmosphereState, SkyImageState, SunState};
    use proptest::prelude::*;

    #[test]
    fn every_rule_names_a_real_field() {
        for domain in Domain::ALL {
            let defaults = DomainState::default_for(domain);
            for rule in rules_for(domain) {
                assert!(
                    defaults.field(rule.field).is_some(),
                    "{domain}.{} has a rule but no field",
                    rule.field
                );
            }
        }
    }

    #[test]
    fn defaults_are_valid() {
        for domain in Domain::ALL {
            let mut state = DomainState::default_for(domain);
            let report = validate(&mut state, false);
            assert!(report.is_clean(), "{domain} defaults needed {:?}", report.corrections);
        }
    }

    #[test]
    fn clamps_out_of_range_radius() {
        let mut state = DomainState::Atmosphere(AtmosphereState {
            planet_radius_km: 250_000.0,
            mie_anisotropy: 1.5,
            ..AtmosphereState::default()
        });
        let report = validate(&mut state, true);

        assert_eq!(report.corrections.len(), 2);
        assert_eq!(state.field("planet_radius_km"), Some(FieldValue::Float(100_000.0)));
        assert_eq!(state.field("mie_anisotropy"), Some(FieldValue::Float(0.999)));
    }

    #[test]
    fn non_finite_values_fall_back_to_defaults() {
        let mut state = DomainState::Sun(SunState {
            intensity: f32::NAN,
            color: Rgb::new(f32::INFINITY, 0.5, -1.0),
            ..SunState::default()
        });
        validate(&mut state, true);

        let DomainState::Sun(sun) = state else {
            panic!("domain changed");
        };
        assert_eq!(sun.intensity, SunState::default().intensity);
        assert_eq!(sun.color, Rgb::new(SunState::default().color.r, 0.5, 0.0));
    }

    #[test]
    fn angles_wrap() {
        let mut state = DomainState::Sun(SunState {
            azimuth_deg: -90.0,
            ..SunState::default()
        });
        validate(&mut state, true);
        assert_eq!(state.field("azimuth_deg"), Some(FieldValue::Float(270.0)));
    }

    #[test]
    fn sky_image_intensity_is_derived() {
        let mut state = DomainState::SkyImage(SkyImageState {
            path: "sky/noon.hdr".into(),
            exposure_ev: 2.0,
            intensity_scale: 3.0,
            ..SkyImageState::default()
        });
        let report = validate(&mut state, true);
        assert!(!report.is_rejected());
        assert_eq!(state.field("intensity_scale"), Some(FieldValue::Float(4.0)));
    }

    #[test]
    fn enabled_sky_image_requires_path() {
        let mut state = DomainState::default_for(Domain::SkyImage);
        assert!(validate(&mut state, true).is_rejected());
        assert!(!validate(&mut state, false).is_rejected());
    }

    fn float_rules() -> Vec<(Domain, &'static str, Rule)> {
        Domain::ALL
            .into_iter()
            .flat_map(|d| rules_for(d).iter().map(move |r| (d, r.field, r.rule)))
            .filter(|(d, field, _)| {
                matches!(DomainState::default_for(*d).field(field), Some(FieldValue::Float(_)))
            })
            .collect()
    }

    fn within(value: f32, rule: Rule) -> bool {
        match rule {
            Rule::Range { min, max } | Rule::Color { min, max } => value >= min && value <= max,
            Rule::Wrap { period } => value >= 0.0 && value < period,
        }
    }

    proptest! {
        #[test]
        fn validate_is_idempotent_and_in_range(
            index in 0usize..64,
            value in prop_oneof![
                any::<f32>(),
                -1.0e6f32..1.0e6f32,
                Just(f32::NAN),
                Just(f32::NEG_INFINITY),
                Just(-1.0e-9f32),
            ],
        ) {
            let rules = float_rules();
            let (domain, field, rule) = rules[index % rules.len()];

            let mut state = DomainState::default_for(domain);
            state.set_field(field, FieldValue::Float(value)).unwrap();

            validate(&mut state, false);
            let once = state.clone();
            let second = validate(&mut state, false);

            prop_assert!(second.corrections.is_empty());
            prop_assert_eq!(&state, &once);

            let repaired = state.field(field).and_then(|v| v.as_float()).unwrap();
            prop_assert!(within(repaired, rule), "{}.{} = {}", domain, field, repaired);
        }
    }
}
