//! Field values and the tagged enumerations carried by canonical state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A linear RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: f32,
    /// Green channel.
    pub g: f32,
    /// Blue channel.
    pub b: f32,
}

impl Rgb {
    /// White.
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    /// Creates a colour from its channels.
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Creates a grey colour.
    #[must_use]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Channels as an array.
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Builds a colour from an array.
    #[must_use]
    pub const fn from_array([r, g, b]: [f32; 3]) -> Self {
        Self::new(r, g, b)
    }
}

/// The type of a field, independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `f32` scalar.
    Float,
    /// Boolean toggle.
    Bool,
    /// RGB colour.
    Color,
    /// Free text (paths).
    Text,
    /// Tagged enumeration, carried as its integer code.
    Choice,
}

impl FieldKind {
    /// Short lowercase name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Color => "color",
            FieldKind::Text => "text",
            FieldKind::Choice => "choice",
        }
    }
}

/// The value of one canonical-state field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Scalar.
    Float(f32),
    /// Toggle.
    Bool(bool),
    /// Colour.
    Color(Rgb),
    /// Text.
    Text(String),
    /// Code of a tagged enumeration.
    Choice(u32),
}

impl FieldValue {
    /// The kind of this value.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Color(_) => FieldKind::Color,
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Choice(_) => FieldKind::Choice,
        }
    }

    /// Returns the scalar if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Compares two values, allowing `eps` of absolute error on floats and
    /// colour channels.
    #[must_use]
    pub fn approx_eq(&self, other: &FieldValue, eps: f32) -> bool {
        fn close(a: f32, b: f32, eps: f32) -> bool {
            a == b || (a - b).abs() <= eps
        }
        match (self, other) {
            (FieldValue::Float(a), FieldValue::Float(b)) => close(*a, *b, eps),
            (FieldValue::Color(a), FieldValue::Color(b)) => a
                .to_array()
                .iter()
                .zip(b.to_array())
                .all(|(x, y)| close(*x, y, eps)),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Color(c) => write!(f, "({}, {}, {})", c.r, c.g, c.b),
            FieldValue::Text(s) => write!(f, "{s:?}"),
            FieldValue::Choice(code) => write!(f, "#{code}"),
        }
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Rgb> for FieldValue {
    fn from(v: Rgb) -> Self {
        FieldValue::Color(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Conversion between a concrete field type and [`FieldValue`].
pub(crate) trait FieldType: Sized {
    /// Name of the accepted type for error messages.
    const EXPECTED: &'static str;

    fn to_value(&self) -> FieldValue;

    fn from_value(value: FieldValue) -> Option<Self>;
}

impl FieldType for f32 {
    const EXPECTED: &'static str = "float";

    fn to_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for bool {
    const EXPECTED: &'static str = "bool";

    fn to_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for Rgb {
    const EXPECTED: &'static str = "color";

    fn to_value(&self) -> FieldValue {
        FieldValue::Color(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Color(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for String {
    const EXPECTED: &'static str = "text";

    fn to_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Declares a closed enumeration stored as an integer code at the
/// persistence boundary.
macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $expected:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => [$($alias:literal),+] ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Integer code written to the settings store.
            #[must_use]
            pub const fn code(self) -> u32 {
                match self {
                    $( $name::$variant => $code ),+
                }
            }

            /// Decodes a stored integer code.
            #[must_use]
            pub const fn from_code(code: u32) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl FromStr for $name {
            type Err = &'static str;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let key = normalize_key(value);
                $(
                    if [$($alias),+].contains(&key.as_str()) {
                        return Ok($name::$variant);
                    }
                )+
                Err(concat!("unknown ", $expected))
            }
        }

        impl From<$name> for FieldValue {
            fn from(v: $name) -> Self {
                FieldValue::Choice(v.code())
            }
        }

        impl FieldType for $name {
            const EXPECTED: &'static str = $expected;

            fn to_value(&self) -> FieldValue {
                FieldValue::Choice(self.code())
            }

            fn from_value(value: FieldValue) -> Option<Self> {
                match value {
                    FieldValue::Choice(code) => Self::from_code(code),
                    _ => None,
                }
            }
        }
    };
}

choice_enum! {
    /// Where the sun light comes from.
    LightSource, "light source" {
        /// A directional light created and owned by the synchronizer.
        Synthesized = 0 => ["synthesized", "synth", "0"],
        /// A directional light the scene already contains.
        SceneLight = 1 => ["scenelight", "scene", "1"],
    }
}

choice_enum! {
    /// What the ambient sky light captures.
    SkyLightSource, "sky light source" {
        /// The procedural atmosphere.
        Atmosphere = 0 => ["atmosphere", "atmo", "0"],
        /// The sky image backdrop.
        SkyImage = 1 => ["skyimage", "image", "1"],
        /// A constant tint.
        Constant = 2 => ["constant", "flat", "2"],
    }
}

choice_enum! {
    /// Tone mapping operator.
    ToneMapper, "tone mapper" {
        /// Linear output, clipped.
        None = 0 => ["none", "linear", "0"],
        /// Reinhard.
        Reinhard = 1 => ["reinhard", "1"],
        /// ACES filmic fit.
        Aces = 2 => ["aces", "filmic", "2"],
        /// AgX.
        AgX = 3 => ["agx", "3"],
    }
}

choice_enum! {
    /// Face culling mode.
    CullMode, "cull mode" {
        /// Draw both faces.
        None = 0 => ["none", "off", "0"],
        /// Cull front faces.
        Front = 1 => ["front", "1"],
        /// Cull back faces.
        Back = 2 => ["back", "2"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_codes_round_trip() {
        for mapper in ToneMapper::ALL {
            assert_eq!(ToneMapper::from_code(mapper.code()), Some(*mapper));
        }
        assert_eq!(CullMode::from_code(7), None);
    }

    #[test]
    fn choice_parsing_accepts_aliases() {
        assert_eq!("ACES".parse::<ToneMapper>(), Ok(ToneMapper::Aces));
        assert_eq!("scene-light".parse::<LightSource>(), Ok(LightSource::SceneLight));
        assert_eq!("sky_image".parse::<SkyLightSource>(), Ok(SkyLightSource::SkyImage));
        assert_eq!("2".parse::<CullMode>(), Ok(CullMode::Back));
        assert_eq!("sideways".parse::<CullMode>(), Err("unknown cull mode"));
    }

    #[test]
    fn choice_from_wrong_value_kind() {
        assert_eq!(ToneMapper::from_value(FieldValue::Float(2.0)), None);
        assert_eq!(ToneMapper::from_value(FieldValue::Choice(9)), None);
        assert_eq!(ToneMapper::from_value(FieldValue::Choice(3)), Some(ToneMapper::AgX));
    }

    #[test]
    fn approx_eq_tolerates_float_noise() {
        let a = FieldValue::Float(45.0);
        let b = FieldValue::Float(45.000_004);
        assert!(a.approx_eq(&b, 1e-4));
        assert!(!a.approx_eq(&FieldValue::Float(45.1), 1e-4));

        let c = FieldValue::Color(Rgb::new(0.5, 0.5, 0.5));
        let d = FieldValue::Color(Rgb::new(0.5, 0.50001, 0.5));
        assert!(c.approx_eq(&d, 1e-4));
        assert!(!c.approx_eq(&FieldValue::Float(0.5), 1e-4));
    }

    #[test]
    fn value_kinds() {
        assert_eq!(FieldValue::from(1.0).kind(), FieldKind::Float);
        assert_eq!(FieldValue::from(true).kind(), FieldKind::Bool);
        assert_eq!(FieldValue::from("a").kind(), FieldKind::Text);
        assert_eq!(FieldValue::from(Rgb::WHITE).kind(), FieldKind::Color);
        assert_eq!(FieldValue::from(CullMode::Back).kind(), FieldKind::Choice);
    }
}
