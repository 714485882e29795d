//! The external authority: the live object graph the cache is mirrored into.

use crate::error::SyncResult;
use envsync_core::{Domain, EnvironmentCache, FieldValue, LightSource};
use std::fmt;
use uuid::Uuid;

/// Identity of one installed object graph.
///
/// A new identity means every handle and every cached baseline from the
/// previous graph is meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AuthorityId(Uuid);

impl AuthorityId {
    /// Creates a random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AuthorityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to one object inside an authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

/// The live, externally-owned object graph.
///
/// Each domain maps to at most one object. Field names and units are the
/// authority's own (see [`envsync_core::authority_field`]).
///
/// # Invariants
///
/// - `try_get` returns the current object for a domain, active or not
/// - A handle returned by `create` is active
/// - Handles are never stable across a change of [`Authority::identity`]
///
/// # Implementors
///
/// - [`crate::MemoryAuthority`] - In-memory scene for tests and tools
pub trait Authority: Send {
    /// Identity of the installed graph.
    fn identity(&self) -> AuthorityId;

    /// The object for a domain, if one exists.
    fn try_get(&self, domain: Domain) -> Option<ObjectHandle>;

    /// Whether the object is active.
    fn is_active(&self, handle: ObjectHandle) -> bool;

    /// Creates the domain's object, replacing an inactive one.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be created.
    fn create(&mut self, domain: Domain) -> SyncResult<ObjectHandle>;

    /// Removes an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be removed.
    fn remove(&mut self, domain: Domain, handle: ObjectHandle) -> SyncResult<()>;

    /// Deactivates an object, keeping it in the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be deactivated.
    fn deactivate(&mut self, domain: Domain, handle: ObjectHandle) -> SyncResult<()>;

    /// Reads a field in authority units.
    fn get_field(&self, handle: ObjectHandle, name: &str) -> Option<FieldValue>;

    /// Writes a field in authority units.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale or the write is refused.
    fn set_field(&mut self, handle: ObjectHandle, name: &str, value: FieldValue) -> SyncResult<()>;

    /// Asks an object to recompute what it derives from other domains.
    ///
    /// Called on a dependent (see [`Domain::dependents`]) whose own fields
    /// are unchanged after a domain it depends on was written. The default
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale or the refresh is refused.
    fn refresh(&mut self, domain: Domain, handle: ObjectHandle) -> SyncResult<()> {
        let _ = (domain, handle);
        Ok(())
    }
}

/// What happens to a disabled domain's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableAction {
    /// Remove the object from the graph.
    Remove,
    /// Keep the object but deactivate it.
    Deactivate,
}

/// How a disabled domain's object is retired, given the rest of the cache.
///
/// A sun driving a scene light is only deactivated, since the light belongs
/// to the scene. The sky light stays in the graph while a sky image feeds it.
#[must_use]
pub fn disable_action(domain: Domain, cache: &EnvironmentCache) -> DisableAction {
    match domain {
        Domain::Sun if cache.sun.light_source == LightSource::SceneLight => {
            DisableAction::Deactivate
        }
        Domain::SkyLight if cache.is_enabled(Domain::SkyImage) => DisableAction::Deactivate,
        _ => DisableAction::Remove,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique() {
        let a = AuthorityId::new();
        let b = AuthorityId::new();
        assert_ne!(a, b);
        assert_eq!(AuthorityId::from_uuid(*a.as_uuid()), a);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn disable_policy() {
        let mut cache = EnvironmentCache::new();
        assert_eq!(disable_action(Domain::Sun, &cache), DisableAction::Remove);
        assert_eq!(disable_action(Domain::SkyLight, &cache), DisableAction::Remove);
        assert_eq!(disable_action(Domain::Fog, &cache), DisableAction::Remove);

        cache.sun.light_source = LightSource::SceneLight;
        cache.set_enabled(Domain::SkyImage, true);
        assert_eq!(disable_action(Domain::Sun, &cache), DisableAction::Deactivate);
        assert_eq!(disable_action(Domain::SkyLight, &cache), DisableAction::Deactivate);
        assert_eq!(disable_action(Domain::SkyImage, &cache), DisableAction::Remove);
    }
}
