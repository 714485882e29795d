//! Unit conversion between the cache's display units and the authority's
//! internal units.
//!
//! The cache stores angles in degrees; the authority stores radians under a
//! name without the unit suffix. Every other field is passed through under
//! its own name.

use crate::domain::Domain;
use crate::field::FieldValue;

/// How a cache field maps to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Same unit on both sides.
    Identity,
    /// Cache degrees, authority radians.
    DegreesToRadians,
}

const TABLE: &[(Domain, &str, &str, Conversion)] = &[
    (Domain::Sun, "azimuth_deg", "azimuth", Conversion::DegreesToRadians),
    (Domain::Sun, "elevation_deg", "elevation", Conversion::DegreesToRadians),
    (Domain::SkyImage, "rotation_deg", "rotation", Conversion::DegreesToRadians),
];

/// The authority-side name and conversion for a cache field.
#[must_use]
pub fn authority_field(domain: Domain, field: &'static str) -> (&'static str, Conversion) {
    TABLE
        .iter()
        .find(|(d, cache_name, _, _)| *d == domain && *cache_name == field)
        .map(|(_, _, authority_name, conversion)| (*authority_name, *conversion))
        .unwrap_or((field, Conversion::Identity))
}

/// Converts a cache value to authority units.
#[must_use]
pub fn to_authority(conversion: Conversion, value: FieldValue) -> FieldValue {
    match (conversion, value) {
        (Conversion::DegreesToRadians, FieldValue::Float(v)) => FieldValue::Float(v.to_radians()),
        (_, value) => value,
    }
}

/// Converts an authority value to cache units.
#[must_use]
pub fn from_authority(conversion: Conversion, value: FieldValue) -> FieldValue {
    match (conversion, value) {
        (Conversion::DegreesToRadians, FieldValue::Float(v)) => FieldValue::Float(v.to_degrees()),
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angles_are_renamed_and_converted() {
        let (name, conversion) = authority_field(Domain::Sun, "elevation_deg");
        assert_eq!(name, "elevation");
        assert_eq!(conversion, Conversion::DegreesToRadians);

        let rad = to_authority(conversion, FieldValue::Float(90.0));
        assert!(rad.approx_eq(&FieldValue::Float(std::f32::consts::FRAC_PI_2), 1e-6));

        let back = from_authority(conversion, rad);
        assert!(back.approx_eq(&FieldValue::Float(90.0), 1e-4));
    }

    #[test]
    fn other_fields_pass_through() {
        let (name, conversion) = authority_field(Domain::Atmosphere, "planet_radius_km");
        assert_eq!(name, "planet_radius_km");
        assert_eq!(conversion, Conversion::Identity);
        assert_eq!(
            to_authority(conversion, FieldValue::Float(6371.0)),
            FieldValue::Float(6371.0)
        );
    }

    #[test]
    fn non_float_values_are_untouched() {
        assert_eq!(
            to_authority(Conversion::DegreesToRadians, FieldValue::Bool(true)),
            FieldValue::Bool(true)
        );
    }
}
