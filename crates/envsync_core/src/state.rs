//! Canonical per-domain state and the environment cache.
//!
//! Every domain is a plain value struct. Snapshots are cloned, compared and
//! hashed field by field; nothing here holds a reference into the authority.

use crate::domain::{Domain, DomainMask};
use crate::error::{CoreError, CoreResult};
use crate::field::{
    CullMode, FieldType, FieldValue, LightSource, Rgb, SkyLightSource, ToneMapper,
};
use serde::{Deserialize, Serialize};

/// Field-level access shared by every domain's state struct.
pub trait CanonicalState: Clone + PartialEq + Default {
    /// The domain this state belongs to.
    const DOMAIN: Domain;

    /// Field names in declaration order.
    const FIELDS: &'static [&'static str];

    /// Reads a field by name.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Writes a field by name.
    ///
    /// Returns `Ok(true)` if the stored value changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the field does not exist or the value has the
    /// wrong type.
    fn set_field(&mut self, name: &str, value: FieldValue) -> CoreResult<bool>;
}

macro_rules! canonical_state {
    (
        $(#[$meta:meta])*
        $name:ident => $domain:path {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty = $default:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )+
        }

        impl Default for $name {
            fn default() -> Self {
                Self { $( $field: $default, )+ }
            }
        }

        impl CanonicalState for $name {
            const DOMAIN: Domain = $domain;
            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),+];

            fn field(&self, name: &str) -> Option<FieldValue> {
                match name {
                    $( stringify!($field) => Some(FieldType::to_value(&self.$field)), )+
                    _ => None,
                }
            }

            fn set_field(&mut self, name: &str, value: FieldValue) -> CoreResult<bool> {
                match name {
                    $(
                        stringify!($field) => {
                            let found = value.kind().name();
                            let new = <$ty as FieldType>::from_value(value).ok_or_else(|| {
                                CoreError::invalid_value(
                                    Self::DOMAIN,
                                    name,
                                    <$ty as FieldType>::EXPECTED,
                                    found,
                                )
                            })?;
                            if self.$field == new {
                                Ok(false)
                            } else {
                                self.$field = new;
                                Ok(true)
                            }
                        }
                    )+
                    _ => Err(CoreError::unknown_field(Self::DOMAIN, name)),
                }
            }
        }
    };
}

canonical_state! {
    /// Planet atmosphere scattering parameters. Lengths are kilometres.
    AtmosphereState => Domain::Atmosphere {
        /// Planet radius.
        planet_radius_km: f32 = 6371.0,
        /// Thickness of the atmosphere shell.
        atmosphere_height_km: f32 = 100.0,
        /// Rayleigh scattering coefficients per channel.
        rayleigh_scattering: Rgb = Rgb::new(0.005_802, 0.013_558, 0.033_1),
        /// Rayleigh density scale height.
        rayleigh_scale_height_km: f32 = 8.0,
        /// Mie scattering coefficient.
        mie_scattering: f32 = 0.003_996,
        /// Mie phase anisotropy.
        mie_anisotropy: f32 = 0.8,
        /// Mie density scale height.
        mie_scale_height_km: f32 = 1.2,
        /// Ozone absorption coefficients per channel.
        ozone_absorption: Rgb = Rgb::new(0.000_650, 0.001_881, 0.000_085),
        /// Ground albedo used for bounce light.
        ground_albedo: Rgb = Rgb::splat(0.3),
        /// Weight of the multiple scattering approximation.
        multi_scattering: f32 = 1.0,
    }
}

canonical_state! {
    /// Directional sun light. Angles are degrees.
    SunState => Domain::Sun {
        /// Compass direction of the sun.
        azimuth_deg: f32 = 135.0,
        /// Height of the sun above the horizon.
        elevation_deg: f32 = 45.0,
        /// Light colour.
        color: Rgb = Rgb::new(1.0, 0.956, 0.839),
        /// Illuminance.
        intensity: f32 = 10.0,
        /// Apparent diameter of the sun disc.
        angular_diameter_deg: f32 = 0.53,
        /// Whether the sun casts shadows.
        cast_shadows: bool = true,
        /// Which light the sun drives.
        light_source: LightSource = LightSource::Synthesized,
    }
}

canonical_state! {
    /// Exponential height fog.
    FogState => Domain::Fog {
        /// Base density.
        density: f32 = 0.02,
        /// How quickly density decays with height.
        height_falloff: f32 = 0.2,
        /// Distance from the camera where fog begins.
        start_distance: f32 = 0.0,
        /// Upper bound on fog opacity.
        max_opacity: f32 = 1.0,
        /// Phase function anisotropy.
        anisotropy: f32 = 0.2,
        /// Inscattering colour.
        color: Rgb = Rgb::new(0.45, 0.55, 0.7),
        /// Whether volumetric fog is used.
        volumetric: bool = false,
    }
}

canonical_state! {
    /// The visible sun disc.
    SkyDiscState => Domain::SkyDisc {
        /// Disc size relative to the physical angular diameter.
        size_scale: f32 = 1.0,
        /// Disc brightness.
        intensity: f32 = 1.0,
        /// Edge softness.
        softness: f32 = 0.1,
        /// Disc colour.
        color: Rgb = Rgb::WHITE,
    }
}

canonical_state! {
    /// Ambient light captured from the sky.
    SkyLightState => Domain::SkyLight {
        /// Ambient intensity.
        intensity: f32 = 1.0,
        /// Tint applied to the captured light.
        tint: Rgb = Rgb::WHITE,
        /// What the sky light captures.
        source: SkyLightSource = SkyLightSource::Atmosphere,
        /// Recapture every frame instead of on change.
        realtime_capture: bool = false,
    }
}

canonical_state! {
    /// Image-based sky backdrop. Angles are degrees.
    SkyImageState => Domain::SkyImage {
        /// Path of the environment image.
        path: String = String::new(),
        /// Exposure in stops.
        exposure_ev: f32 = 0.0,
        /// Rotation around the up axis.
        rotation_deg: f32 = 0.0,
        /// Tint applied to the image.
        tint: Rgb = Rgb::WHITE,
        /// Linear intensity derived from `exposure_ev`.
        intensity_scale: f32 = 1.0,
    }
}

canonical_state! {
    /// Renderer tone mapping and debug toggles.
    RendererFlagsState => Domain::RendererFlags {
        /// Tone mapping operator.
        tone_mapper: ToneMapper = ToneMapper::Aces,
        /// Face culling.
        cull_mode: CullMode = CullMode::Back,
        /// Exposure compensation in stops.
        exposure_compensation: f32 = 0.0,
        /// Draw wireframes.
        wireframe: bool = false,
        /// Draw bounding boxes.
        show_bounds: bool = false,
        /// Freeze the culling camera.
        freeze_culling: bool = false,
    }
}

/// The canonical state of one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainState {
    /// Atmosphere.
    Atmosphere(AtmosphereState),
    /// Sun.
    Sun(SunState),
    /// Fog.
    Fog(FogState),
    /// Sky disc.
    SkyDisc(SkyDiscState),
    /// Sky light.
    SkyLight(SkyLightState),
    /// Sky image.
    SkyImage(SkyImageState),
    /// Renderer flags.
    RendererFlags(RendererFlagsState),
}

macro_rules! dispatch {
    ($value:expr, $s:ident => $body:expr) => {
        match $value {
            DomainState::Atmosphere($s) => $body,
            DomainState::Sun($s) => $body,
            DomainState::Fog($s) => $body,
            DomainState::SkyDisc($s) => $body,
            DomainState::SkyLight($s) => $body,
            DomainState::SkyImage($s) => $body,
            DomainState::RendererFlags($s) => $body,
        }
    };
}

fn field_names_of<S: CanonicalState>(_: &S) -> &'static [&'static str] {
    S::FIELDS
}

impl DomainState {
    /// Default state of a domain.
    #[must_use]
    pub fn default_for(domain: Domain) -> Self {
        match domain {
            Domain::Atmosphere => DomainState::Atmosphere(AtmosphereState::default()),
            Domain::Sun => DomainState::Sun(SunState::default()),
            Domain::Fog => DomainState::Fog(FogState::default()),
            Domain::SkyDisc => DomainState::SkyDisc(SkyDiscState::default()),
            Domain::SkyLight => DomainState::SkyLight(SkyLightState::default()),
            Domain::SkyImage => DomainState::SkyImage(SkyImageState::default()),
            Domain::RendererFlags => DomainState::RendererFlags(RendererFlagsState::default()),
        }
    }

    /// The domain of this state.
    #[must_use]
    pub fn domain(&self) -> Domain {
        match self {
            DomainState::Atmosphere(_) => Domain::Atmosphere,
            DomainState::Sun(_) => Domain::Sun,
            DomainState::Fog(_) => Domain::Fog,
            DomainState::SkyDisc(_) => Domain::SkyDisc,
            DomainState::SkyLight(_) => Domain::SkyLight,
            DomainState::SkyImage(_) => Domain::SkyImage,
            DomainState::RendererFlags(_) => Domain::RendererFlags,
        }
    }

    /// Field names in declaration order.
    #[must_use]
    pub fn field_names(&self) -> &'static [&'static str] {
        dispatch!(self, s => field_names_of(s))
    }

    /// Reads a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        dispatch!(self, s => s.field(name))
    }

    /// Writes a field by name, returning whether it changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the field does not exist or the value has the
    /// wrong type.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> CoreResult<bool> {
        dispatch!(self, s => s.set_field(name, value))
    }

    /// Every field with its value, in declaration order.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        self.field_names()
            .iter()
            .filter_map(|name| self.field(name).map(|value| (*name, value)))
            .collect()
    }
}

/// The user-editable parameter cache: one canonical state and one enabled
/// flag per domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentCache {
    /// Atmosphere state.
    pub atmosphere: AtmosphereState,
    /// Sun state.
    pub sun: SunState,
    /// Fog state.
    pub fog: FogState,
    /// Sky disc state.
    pub sky_disc: SkyDiscState,
    /// Sky light state.
    pub sky_light: SkyLightState,
    /// Sky image state.
    pub sky_image: SkyImageState,
    /// Renderer flags state.
    pub renderer: RendererFlagsState,
    enabled: DomainMask,
    customized: bool,
}

impl Default for EnvironmentCache {
    fn default() -> Self {
        Self {
            atmosphere: AtmosphereState::default(),
            sun: SunState::default(),
            fog: FogState::default(),
            sky_disc: SkyDiscState::default(),
            sky_light: SkyLightState::default(),
            sky_image: SkyImageState::default(),
            renderer: RendererFlagsState::default(),
            enabled: Domain::ALL
                .into_iter()
                .filter(|d| d.enabled_by_default())
                .collect(),
            customized: false,
        }
    }
}

impl EnvironmentCache {
    /// Creates a cache holding engine defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of one domain's state.
    #[must_use]
    pub fn state(&self, domain: Domain) -> DomainState {
        match domain {
            Domain::Atmosphere => DomainState::Atmosphere(self.atmosphere.clone()),
            Domain::Sun => DomainState::Sun(self.sun.clone()),
            Domain::Fog => DomainState::Fog(self.fog.clone()),
            Domain::SkyDisc => DomainState::SkyDisc(self.sky_disc.clone()),
            Domain::SkyLight => DomainState::SkyLight(self.sky_light.clone()),
            Domain::SkyImage => DomainState::SkyImage(self.sky_image.clone()),
            Domain::RendererFlags => DomainState::RendererFlags(self.renderer.clone()),
        }
    }

    /// Replaces one domain's state, returning whether anything changed.
    pub fn replace(&mut self, state: DomainState) -> bool {
        fn swap<S: PartialEq>(slot: &mut S, new: S) -> bool {
            if *slot == new {
                false
            } else {
                *slot = new;
                true
            }
        }
        match state {
            DomainState::Atmosphere(s) => swap(&mut self.atmosphere, s),
            DomainState::Sun(s) => swap(&mut self.sun, s),
            DomainState::Fog(s) => swap(&mut self.fog, s),
            DomainState::SkyDisc(s) => swap(&mut self.sky_disc, s),
            DomainState::SkyLight(s) => swap(&mut self.sky_light, s),
            DomainState::SkyImage(s) => swap(&mut self.sky_image, s),
            DomainState::RendererFlags(s) => swap(&mut self.renderer, s),
        }
    }

    /// Reads one field.
    #[must_use]
    pub fn field(&self, domain: Domain, name: &str) -> Option<FieldValue> {
        match domain {
            Domain::Atmosphere => self.atmosphere.field(name),
            Domain::Sun => self.sun.field(name),
            Domain::Fog => self.fog.field(name),
            Domain::SkyDisc => self.sky_disc.field(name),
            Domain::SkyLight => self.sky_light.field(name),
            Domain::SkyImage => self.sky_image.field(name),
            Domain::RendererFlags => self.renderer.field(name),
        }
    }

    /// Writes one field, returning whether it changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the field does not exist or the value has the
    /// wrong type.
    pub fn set_field(&mut self, domain: Domain, name: &str, value: FieldValue) -> CoreResult<bool> {
        match domain {
            Domain::Atmosphere => self.atmosphere.set_field(name, value),
            Domain::Sun => self.sun.set_field(name, value),
            Domain::Fog => self.fog.set_field(name, value),
            Domain::SkyDisc => self.sky_disc.set_field(name, value),
            Domain::SkyLight => self.sky_light.set_field(name, value),
            Domain::SkyImage => self.sky_image.set_field(name, value),
            Domain::RendererFlags => self.renderer.set_field(name, value),
        }
    }

    /// Returns true if the domain is enabled.
    #[must_use]
    pub fn is_enabled(&self, domain: Domain) -> bool {
        self.enabled.contains(domain)
    }

    /// Enables or disables a domain, returning whether the flag changed.
    pub fn set_enabled(&mut self, domain: Domain, enabled: bool) -> bool {
        if self.is_enabled(domain) == enabled {
            return false;
        }
        if enabled {
            self.enabled.insert(domain);
        } else {
            self.enabled.remove(domain);
        }
        true
    }

    /// The set of enabled domains.
    #[must_use]
    pub fn enabled_mask(&self) -> DomainMask {
        self.enabled
    }

    /// Whether the user has edited the cache, making it a custom snapshot.
    #[must_use]
    pub fn is_customized(&self) -> bool {
        self.customized
    }

    /// Sets the custom-snapshot flag.
    pub fn set_customized(&mut self, customized: bool) {
        self.customized = customized;
    }
}

/// A canonical state type with a fixed slot in [`EnvironmentCache`].
pub trait CacheSlot: CanonicalState {
    /// Borrows this domain's state from the cache.
    fn slot(cache: &EnvironmentCache) -> &Self;

    /// Mutably borrows this domain's state from the cache.
    fn slot_mut(cache: &mut EnvironmentCache) -> &mut Self;
}

macro_rules! cache_slot {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(
            impl CacheSlot for $ty {
                fn slot(cache: &EnvironmentCache) -> &Self {
                    &cache.$field
                }

                fn slot_mut(cache: &mut EnvironmentCache) -> &mut Self {
                    &mut cache.$field
                }
            }
        )+
    };
}

cache_slot! {
    AtmosphereState => atmosphere,
    SunState => sun,
    FogState => fog,
    SkyDiscState => sky_disc,
    SkyLightState => sky_light,
    SkyImageState => sky_image,
    RendererFlagsState => renderer,
}
