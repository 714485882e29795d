//! In-memory authority for tests and tools.

use crate::authority::{Authority, AuthorityId, ObjectHandle};
use crate::error::{SyncError, SyncResult};
use envsync_core::{authority_field, to_authority, Domain, DomainMask, DomainState, FieldValue};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Operation counts recorded by a [`MemoryAuthority`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorityCounters {
    /// Successful `set_field` calls.
    pub field_writes: u64,
    /// Objects created.
    pub creates: u64,
    /// Objects removed.
    pub removes: u64,
    /// Objects deactivated.
    pub deactivations: u64,
    /// Objects refreshed after a domain they depend on changed.
    pub refreshes: u64,
}

#[derive(Debug)]
struct MemoryObject {
    handle: ObjectHandle,
    active: bool,
    fields: BTreeMap<String, FieldValue>,
    writes: u64,
    refreshes: u64,
}

#[derive(Debug, Default)]
struct MemoryScene {
    objects: BTreeMap<Domain, MemoryObject>,
    next_handle: u64,
    counters: AuthorityCounters,
    failing: DomainMask,
}

impl MemoryScene {
    fn spawn(&mut self, domain: Domain) -> ObjectHandle {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        self.objects.insert(
            domain,
            MemoryObject {
                handle,
                active: true,
                fields: BTreeMap::new(),
                writes: 0,
                refreshes: 0,
            },
        );
        handle
    }

    fn find(&self, handle: ObjectHandle) -> Option<(Domain, &MemoryObject)> {
        self.objects
            .iter()
            .find(|(_, object)| object.handle == handle)
            .map(|(domain, object)| (*domain, object))
    }

    fn find_mut(&mut self, handle: ObjectHandle) -> Option<(Domain, &mut MemoryObject)> {
        self.objects
            .iter_mut()
            .find(|(_, object)| object.handle == handle)
            .map(|(domain, object)| (*domain, object))
    }

    fn try_handle(&self, domain: Domain) -> Option<ObjectHandle> {
        self.objects.get(&domain).map(|object| object.handle)
    }

    fn check(&self, domain: Domain) -> SyncResult<()> {
        if self.failing.contains(domain) {
            Err(SyncError::authority(domain, "injected failure"))
        } else {
            Ok(())
        }
    }
}

/// A scene held in memory.
///
/// Clones share the same scene, so a test can keep one clone to observe and
/// mutate the graph out-of-band while the synchronizer owns another.
///
/// # Example
///
/// ```
/// use envsync_engine::{Authority, MemoryAuthority};
/// use envsync_core::{Domain, FieldValue};
///
/// let scene = MemoryAuthority::new();
/// let mut owned = scene.clone();
/// let handle = owned.create(Domain::Fog).unwrap();
/// owned.set_field(handle, "density", FieldValue::Float(0.1)).unwrap();
/// assert_eq!(scene.field(Domain::Fog, "density"), Some(FieldValue::Float(0.1)));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryAuthority {
    identity: AuthorityId,
    scene: Arc<RwLock<MemoryScene>>,
}

impl MemoryAuthority {
    /// Creates an empty scene with a fresh identity.
    pub fn new() -> Self {
        Self::with_identity(AuthorityId::new())
    }

    /// Creates an empty scene with the given identity.
    pub fn with_identity(identity: AuthorityId) -> Self {
        Self {
            identity,
            scene: Arc::new(RwLock::new(MemoryScene::default())),
        }
    }

    /// Adds an active object holding `state`, converted to authority units.
    ///
    /// Replaces any existing object for the domain and does not count as a
    /// write.
    pub fn insert_state(&self, state: &DomainState) -> ObjectHandle {
        let domain = state.domain();
        let mut scene = self.scene.write();
        let handle = scene.spawn(domain);
        if let Some(object) = scene.objects.get_mut(&domain) {
            for (name, value) in state.fields() {
                let (authority_name, conversion) = authority_field(domain, name);
                object
                    .fields
                    .insert(authority_name.to_string(), to_authority(conversion, value));
            }
        }
        handle
    }

    /// Changes a field behind the synchronizer's back.
    ///
    /// Returns false if the domain has no object.
    pub fn set_external(&self, domain: Domain, name: &str, value: FieldValue) -> bool {
        match self.scene.write().objects.get_mut(&domain) {
            Some(object) => {
                object.fields.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Activates or deactivates a domain's object out-of-band.
    pub fn set_active(&self, domain: Domain, active: bool) -> bool {
        match self.scene.write().objects.get_mut(&domain) {
            Some(object) => {
                object.active = active;
                true
            }
            None => false,
        }
    }

    /// Removes a domain's object out-of-band.
    pub fn remove_external(&self, domain: Domain) -> bool {
        self.scene.write().objects.remove(&domain).is_some()
    }

    /// Makes every operation on a domain fail, or stop failing.
    pub fn fail_domain(&self, domain: Domain, failing: bool) {
        let mut scene = self.scene.write();
        if failing {
            scene.failing.insert(domain);
        } else {
            scene.failing.remove(domain);
        }
    }

    /// Reads a field of a domain's object, in authority units.
    pub fn field(&self, domain: Domain, name: &str) -> Option<FieldValue> {
        self.scene
            .read()
            .objects
            .get(&domain)
            .and_then(|object| object.fields.get(name).cloned())
    }

    /// Whether the domain has an object.
    pub fn has_object(&self, domain: Domain) -> bool {
        self.scene.read().objects.contains_key(&domain)
    }

    /// Whether the domain has an active object.
    pub fn is_domain_active(&self, domain: Domain) -> bool {
        self.scene
            .read()
            .objects
            .get(&domain)
            .is_some_and(|object| object.active)
    }

    /// Number of objects in the scene.
    pub fn object_count(&self) -> usize {
        self.scene.read().objects.len()
    }

    /// Field writes made to a domain's current object.
    pub fn writes_to(&self, domain: Domain) -> u64 {
        self.scene
            .read()
            .objects
            .get(&domain)
            .map_or(0, |object| object.writes)
    }

    /// Refreshes of a domain's current object.
    pub fn refreshes_of(&self, domain: Domain) -> u64 {
        self.scene
            .read()
            .objects
            .get(&domain)
            .map_or(0, |object| object.refreshes)
    }

    /// Operation counts since creation or the last reset.
    pub fn counters(&self) -> AuthorityCounters {
        self.scene.read().counters
    }

    /// Zeroes the operation counts.
    pub fn reset_counters(&self) {
        let mut scene = self.scene.write();
        scene.counters = AuthorityCounters::default();
        for object in scene.objects.values_mut() {
            object.writes = 0;
            object.refreshes = 0;
        }
    }
}

impl Default for MemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl Authority for MemoryAuthority {
    fn identity(&self) -> AuthorityId {
        self.identity
    }

    fn try_get(&self, domain: Domain) -> Option<ObjectHandle> {
        self.scene.read().try_handle(domain)
    }

    fn is_active(&self, handle: ObjectHandle) -> bool {
        self.scene
            .read()
            .find(handle)
            .is_some_and(|(_, object)| object.active)
    }

    fn create(&mut self, domain: Domain) -> SyncResult<ObjectHandle> {
        let mut scene = self.scene.write();
        scene.check(domain)?;
        scene.counters.creates += 1;
        Ok(scene.spawn(domain))
    }

    fn remove(&mut self, domain: Domain, handle: ObjectHandle) -> SyncResult<()> {
        let mut scene = self.scene.write();
        scene.check(domain)?;
        if scene.try_handle(domain) != Some(handle) {
            return Err(SyncError::StaleHandle(handle));
        }
        scene.objects.remove(&domain);
        scene.counters.removes += 1;
        Ok(())
    }

    fn deactivate(&mut self, domain: Domain, handle: ObjectHandle) -> SyncResult<()> {
        let mut scene = self.scene.write();
        scene.check(domain)?;
        if scene.try_handle(domain) != Some(handle) {
            return Err(SyncError::StaleHandle(handle));
        }
        if let Some(object) = scene.objects.get_mut(&domain) {
            object.active = false;
        }
        scene.counters.deactivations += 1;
        Ok(())
    }

    fn get_field(&self, handle: ObjectHandle, name: &str) -> Option<FieldValue> {
        self.scene
            .read()
            .find(handle)
            .and_then(|(_, object)| object.fields.get(name).cloned())
    }

    fn set_field(&mut self, handle: ObjectHandle, name: &str, value: FieldValue) -> SyncResult<()> {
        let mut scene = self.scene.write();
        let domain = scene
            .find(handle)
            .map(|(domain, _)| domain)
            .ok_or(SyncError::StaleHandle(handle))?;
        scene.check(domain)?;
        if let Some((_, object)) = scene.find_mut(handle) {
            object.fields.insert(name.to_string(), value);
            object.writes += 1;
        }
        scene.counters.field_writes += 1;
        Ok(())
    }

    fn refresh(&mut self, domain: Domain, handle: ObjectHandle) -> SyncResult<()> {
        let mut scene = self.scene.write();
        scene.check(domain)?;
        match scene.objects.get_mut(&domain) {
            Some(object) if object.handle == handle => object.refreshes += 1,
            _ => return Err(SyncError::StaleHandle(handle)),
        }
        scene.counters.refreshes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_replaces_inactive_object() {
        let mut scene = MemoryAuthority::new();
        let first = scene.create(Domain::Sun).unwrap();
        scene.deactivate(Domain::Sun, first).unwrap();
        assert!(!scene.is_active(first));

        let second = scene.create(Domain::Sun).unwrap();
        assert_ne!(first, second);
        assert!(scene.is_active(second));
        assert!(!scene.is_active(first));
        assert_eq!(scene.object_count(), 1);
        assert_eq!(scene.counters().creates, 2);
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut scene = MemoryAuthority::new();
        let handle = scene.create(Domain::Fog).unwrap();
        scene.remove(Domain::Fog, handle).unwrap();

        assert!(matches!(
            scene.set_field(handle, "density", FieldValue::Float(0.1)),
            Err(SyncError::StaleHandle(_))
        ));
        assert!(scene.get_field(handle, "density").is_none());
        assert!(scene.try_get(Domain::Fog).is_none());
    }

    #[test]
    fn insert_state_converts_units() {
        let scene = MemoryAuthority::new();
        scene.insert_state(&DomainState::default_for(Domain::Sun));

        let elevation = scene.field(Domain::Sun, "elevation").unwrap();
        assert!(elevation.approx_eq(&FieldValue::Float(45f32.to_radians()), 1e-6));
        assert!(scene.field(Domain::Sun, "elevation_deg").is_none());
        assert_eq!(scene.counters(), AuthorityCounters::default());
    }

    #[test]
    fn injected_failures() {
        let mut scene = MemoryAuthority::new();
        scene.fail_domain(Domain::Fog, true);
        assert!(matches!(
            scene.create(Domain::Fog),
            Err(SyncError::Authority { domain: Domain::Fog, .. })
        ));

        scene.fail_domain(Domain::Fog, false);
        assert!(scene.create(Domain::Fog).is_ok());
    }

    #[test]
    fn refresh_counts_per_object() {
        let mut scene = MemoryAuthority::new();
        let handle = scene.create(Domain::Atmosphere).unwrap();
        scene.refresh(Domain::Atmosphere, handle).unwrap();

        assert_eq!(scene.refreshes_of(Domain::Atmosphere), 1);
        assert_eq!(scene.counters().refreshes, 1);
        assert_eq!(scene.counters().field_writes, 0);
        assert!(matches!(
            scene.refresh(Domain::Atmosphere, ObjectHandle(99)),
            Err(SyncError::StaleHandle(_))
        ));
    }

    #[test]
    fn clones_share_the_scene() {
        let observer = MemoryAuthority::new();
        let mut owner = observer.clone();
        let handle = owner.create(Domain::SkyDisc).unwrap();
        owner.set_field(handle, "intensity", FieldValue::Float(2.0)).unwrap();

        assert_eq!(observer.writes_to(Domain::SkyDisc), 1);
        assert!(observer.set_external(Domain::SkyDisc, "intensity", FieldValue::Float(3.0)));
        assert_eq!(owner.get_field(handle, "intensity"), Some(FieldValue::Float(3.0)));
        assert_eq!(owner.identity(), observer.identity());
    }
}
