//! Configuration domains and domain bitsets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// An independently dirty, enabled and validated group of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    /// Planet atmosphere scattering.
    Atmosphere,
    /// Directional sun light.
    Sun,
    /// Height fog.
    Fog,
    /// Visible sun disc in the sky.
    SkyDisc,
    /// Ambient sky light.
    SkyLight,
    /// Image-based sky backdrop.
    SkyImage,
    /// Renderer debug and tone mapping flags.
    RendererFlags,
}

impl Domain {
    /// Number of domains.
    pub const COUNT: usize = 7;

    /// Every domain, in declaration order.
    pub const ALL: [Domain; Self::COUNT] = [
        Domain::Atmosphere,
        Domain::Sun,
        Domain::Fog,
        Domain::SkyDisc,
        Domain::SkyLight,
        Domain::SkyImage,
        Domain::RendererFlags,
    ];

    /// Position of this domain in [`Domain::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit of this domain in a [`DomainMask`].
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Key segment used under the settings namespace, e.g. `env.atmo`.
    #[must_use]
    pub const fn key_segment(self) -> &'static str {
        match self {
            Domain::Atmosphere => "atmo",
            Domain::Sun => "sun",
            Domain::Fog => "fog",
            Domain::SkyDisc => "skydisc",
            Domain::SkyLight => "skylight",
            Domain::SkyImage => "skyimage",
            Domain::RendererFlags => "renderer",
        }
    }

    /// Parses a key segment or a lowercase domain name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.key_segment() == lower || d.to_string().to_ascii_lowercase() == lower)
    }

    /// Domains that must be re-applied whenever this one is.
    ///
    /// Sun state feeds atmosphere precomputation and the sky disc position;
    /// a sky light capturing the sky image must be refreshed with it. A
    /// dependent whose own fields come out unchanged is still refreshed in
    /// the authority after its source is written.
    #[must_use]
    pub const fn dependents(self) -> DomainMask {
        match self {
            Domain::Sun => DomainMask(Domain::Atmosphere.bit() | Domain::SkyDisc.bit()),
            Domain::SkyImage => DomainMask(Domain::SkyLight.bit()),
            _ => DomainMask::EMPTY,
        }
    }

    /// Whether the domain is enabled in a freshly constructed cache.
    #[must_use]
    pub const fn enabled_by_default(self) -> bool {
        matches!(
            self,
            Domain::Atmosphere | Domain::Sun | Domain::SkyLight | Domain::RendererFlags
        )
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Atmosphere => "Atmosphere",
            Domain::Sun => "Sun",
            Domain::Fog => "Fog",
            Domain::SkyDisc => "SkyDisc",
            Domain::SkyLight => "SkyLight",
            Domain::SkyImage => "SkyImage",
            Domain::RendererFlags => "RendererFlags",
        };
        f.write_str(name)
    }
}

/// A set of domains.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DomainMask(u8);

impl DomainMask {
    /// No domains.
    pub const EMPTY: DomainMask = DomainMask(0);

    /// Every domain.
    pub const ALL: DomainMask = DomainMask((1 << Domain::COUNT) - 1);

    /// Creates a mask from raw bits, ignoring bits past the last domain.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        DomainMask(bits & Self::ALL.0)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// A mask holding a single domain.
    #[must_use]
    pub const fn only(domain: Domain) -> Self {
        DomainMask(domain.bit())
    }

    /// Returns true if no domain is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if `domain` is set.
    #[must_use]
    pub const fn contains(self, domain: Domain) -> bool {
        self.0 & domain.bit() != 0
    }

    /// Adds a domain.
    pub fn insert(&mut self, domain: Domain) {
        self.0 |= domain.bit();
    }

    /// Removes a domain.
    pub fn remove(&mut self, domain: Domain) {
        self.0 &= !domain.bit();
    }

    /// Returns the union of both masks.
    #[must_use]
    pub const fn union(self, other: DomainMask) -> Self {
        DomainMask(self.0 | other.0)
    }

    /// Returns the domains in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: DomainMask) -> Self {
        DomainMask(self.0 & !other.0)
    }

    /// Number of domains set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates the set domains in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Domain> {
        Domain::ALL.into_iter().filter(move |d| self.contains(*d))
    }

    /// Adds every enabled dependent of the domains in this mask.
    ///
    /// Expansion is a single step: dependents of dependents are not chased,
    /// which the current table never needs.
    #[must_use]
    pub fn with_dependents(self, enabled: DomainMask) -> Self {
        let mut expanded = self;
        for domain in self.iter() {
            expanded = expanded.union(DomainMask(domain.dependents().0 & enabled.0));
        }
        expanded
    }
}

impl From<Domain> for DomainMask {
    fn from(domain: Domain) -> Self {
        DomainMask::only(domain)
    }
}

impl FromIterator<Domain> for DomainMask {
    fn from_iter<I: IntoIterator<Item = Domain>>(iter: I) -> Self {
        let mut mask = DomainMask::EMPTY;
        for domain in iter {
            mask.insert(domain);
        }
        mask
    }
}

impl BitOr for DomainMask {
    type Output = DomainMask;

    fn bitor(self, rhs: DomainMask) -> DomainMask {
        self.union(rhs)
    }
}

impl BitOr<Domain> for DomainMask {
    type Output = DomainMask;

    fn bitor(self, rhs: Domain) -> DomainMask {
        self.union(DomainMask::only(rhs))
    }
}

impl BitOrAssign for DomainMask {
    fn bitor_assign(&mut self, rhs: DomainMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DomainMask {
    type Output = DomainMask;

    fn bitand(self, rhs: DomainMask) -> DomainMask {
        DomainMask(self.0 & rhs.0)
    }
}

impl Not for DomainMask {
    type Output = DomainMask;

    fn not(self) -> DomainMask {
        DomainMask(!self.0 & Self::ALL.0)
    }
}

impl fmt::Debug for DomainMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_mask_covers_every_domain() {
        assert_eq!(DomainMask::ALL.len(), Domain::COUNT);
        for domain in Domain::ALL {
            assert!(DomainMask::ALL.contains(domain));
            assert_eq!(Domain::ALL[domain.index()], domain);
        }
    }

    #[test]
    fn mask_set_operations() {
        let mut mask = DomainMask::EMPTY;
        assert!(mask.is_empty());

        mask.insert(Domain::Fog);
        mask.insert(Domain::Sun);
        assert_eq!(mask.len(), 2);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![Domain::Sun, Domain::Fog]);

        mask.remove(Domain::Sun);
        assert_eq!(mask, DomainMask::only(Domain::Fog));

        let other = DomainMask::only(Domain::SkyDisc) | Domain::Fog;
        assert_eq!((mask | other).len(), 2);
        assert_eq!(other.difference(mask), DomainMask::only(Domain::SkyDisc));
        assert_eq!(!DomainMask::ALL, DomainMask::EMPTY);
    }

    #[test]
    fn from_bits_drops_unknown_bits() {
        assert_eq!(DomainMask::from_bits(0xff), DomainMask::ALL);
    }

    #[test]
    fn sun_dependents_follow_enabled_set() {
        let sun = DomainMask::only(Domain::Sun);

        let expanded = sun.with_dependents(DomainMask::only(Domain::Atmosphere));
        assert!(expanded.contains(Domain::Atmosphere));
        assert!(!expanded.contains(Domain::SkyDisc));

        let expanded = sun.with_dependents(DomainMask::EMPTY);
        assert_eq!(expanded, sun);
    }

    #[test]
    fn fog_has_no_dependents() {
        let fog = DomainMask::only(Domain::Fog);
        assert_eq!(fog.with_dependents(DomainMask::ALL), fog);
    }

    #[test]
    fn domain_names_parse() {
        assert_eq!(Domain::from_name("atmo"), Some(Domain::Atmosphere));
        assert_eq!(Domain::from_name("SkyImage"), Some(Domain::SkyImage));
        assert_eq!(Domain::from_name("renderer"), Some(Domain::RendererFlags));
        assert_eq!(Domain::from_name("weather"), None);
    }
}
