//! The frame-driven synchronizer.
//!
//! Every frame, [`Synchronizer::on_frame_start`] runs, in order:
//!
//! 1. a lazy `load_settings` if the host never called it
//!
//! The lazy load also runs before the first edit, attach, detach or save,
//! so nothing is written over a stored snapshot that was never read.
//!
//! 2. resolution of a pending custom-snapshot binding
//! 3. consumption of resync requests
//! 4. a pull, if one is pending and no edits are in flight
//! 5. a push of dirty domains whose retry wait has elapsed
//! 6. a persist, if the revision moved and the debounce window elapsed

use crate::authority::{disable_action, Authority, DisableAction, ObjectHandle};
use crate::backoff::RetrySchedule;
use crate::binding::{AuthorityBinding, BindingState, SyncPolicy};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::resource::{LoadRequest, LoadResult, ResourceLoader, ResyncHandle};
use crate::stats::SyncStats;
use envsync_core::{
    authority_field, diff_and_log, diff_within, from_authority, to_authority, validate,
    CacheSlot, Domain, DomainMask, DomainState, DirtyTracker, EnvironmentCache, FieldValue,
    LoadReport, SettingsPersistence, SkyImageState,
};
use envsync_store::SettingsStore;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tolerance when reading authority values into the cache. Keeps
/// degree/radian round trips from churning the cache.
const PULL_EPSILON: f32 = 1e-4;

/// Tolerance when deciding whether an authority field needs a write.
const WRITE_EPSILON: f32 = 1e-6;

/// What a pull did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The authority was read. `changed` lists domains whose cached values
    /// or enabled flag changed.
    Applied {
        /// Domains that changed.
        changed: DomainMask,
    },
    /// Edits are in flight; the pull stays pending.
    Deferred,
    /// Nothing is attached.
    NoAuthority,
}

/// What a push did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Domains that changed the authority.
    pub written: DomainMask,
    /// Domains that failed and stay dirty.
    pub failed: DomainMask,
    /// Authority operations performed.
    pub operations: usize,
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame: u64,
    /// Whether a pull was applied.
    pub pulled: bool,
    /// Domains pushed into the authority.
    pub pushed: DomainMask,
    /// Whether the settings were persisted.
    pub persisted: bool,
}

/// Keeps an [`EnvironmentCache`] and an attached [`Authority`] consistent.
///
/// The synchronizer owns the authority while it is attached and is its only
/// writer. It is single-threaded; the only cross-thread entry point is the
/// [`ResyncHandle`].
pub struct Synchronizer {
    config: SyncConfig,
    store: Arc<dyn SettingsStore>,
    persistence: SettingsPersistence,
    loader: Option<Box<dyn ResourceLoader>>,
    authority: Option<Box<dyn Authority>>,
    binding: AuthorityBinding,
    cache: EnvironmentCache,
    tracker: DirtyTracker,
    handles: [Option<ObjectHandle>; Domain::COUNT],
    baselines: [Option<DomainState>; Domain::COUNT],
    retry: RetrySchedule,
    resync: ResyncHandle,
    pending_image: Option<SkyImageState>,
    refresh_due: DomainMask,
    pull_pending: bool,
    loaded: bool,
    frame: u64,
    epoch: u64,
    seen_revision: u64,
    last_change_frame: u64,
    last_persisted_revision: u64,
    stats: SyncStats,
}

impl Synchronizer {
    /// Creates a synchronizer over a settings store.
    pub fn new(config: SyncConfig, store: Arc<dyn SettingsStore>) -> Self {
        let persistence = SettingsPersistence::new(config.key_namespace.clone());
        let binding = AuthorityBinding::new(config.policy);
        Self {
            config,
            store,
            persistence,
            loader: None,
            authority: None,
            binding,
            cache: EnvironmentCache::new(),
            tracker: DirtyTracker::new(),
            handles: [None; Domain::COUNT],
            baselines: Default::default(),
            retry: RetrySchedule::default(),
            resync: ResyncHandle::new(),
            pending_image: None,
            refresh_due: DomainMask::EMPTY,
            pull_pending: false,
            loaded: false,
            frame: 0,
            epoch: 0,
            seen_revision: 0,
            last_change_frame: 0,
            last_persisted_revision: 0,
            stats: SyncStats::default(),
        }
    }

    /// Sets the image loader.
    pub fn with_loader(mut self, loader: Box<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Replaces the image loader.
    pub fn set_loader(&mut self, loader: Option<Box<dyn ResourceLoader>>) {
        self.loader = loader;
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The parameter cache.
    pub fn cache(&self) -> &EnvironmentCache {
        &self.cache
    }

    /// Reads one cached field.
    pub fn field(&self, domain: Domain, name: &str) -> Option<FieldValue> {
        self.cache.field(domain, name)
    }

    /// Read-only access to the attached authority.
    pub fn authority(&self) -> Option<&dyn Authority> {
        self.authority.as_deref()
    }

    /// The handle last used for a domain's object.
    pub fn object_handle(&self, domain: Domain) -> Option<ObjectHandle> {
        self.handles[domain.index()]
    }

    /// The binding state.
    pub fn binding_state(&self) -> BindingState {
        self.binding.state()
    }

    /// The binding.
    pub fn binding(&self) -> &AuthorityBinding {
        &self.binding
    }

    /// The policy applied on the next attach.
    pub fn policy(&self) -> SyncPolicy {
        self.binding.policy()
    }

    /// Changes the policy applied on the next attach.
    pub fn set_policy(&mut self, policy: SyncPolicy) {
        self.config.policy = policy;
        self.binding.set_policy(policy);
    }

    /// Bumped once per applied pull and once per push that wrote something.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Settings revision.
    pub fn revision(&self) -> u64 {
        self.tracker.revision()
    }

    /// Frames started so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// True if edits are waiting to be pushed, committed or batched.
    pub fn has_pending_changes(&self) -> bool {
        self.tracker.has_pending()
    }

    /// Domains with committed, unpushed edits.
    pub fn dirty_mask(&self) -> DomainMask {
        self.tracker.dirty()
    }

    /// True if a pull is waiting to run.
    pub fn is_pull_pending(&self) -> bool {
        self.pull_pending
    }

    /// Activity counters.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// A handle other threads can use to request a resync.
    pub fn resync_handle(&self) -> ResyncHandle {
        self.resync.clone()
    }

    /// Requests a pull at the next frame start.
    pub fn request_resync(&self) {
        self.resync.request();
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Writes one cached field.
    ///
    /// Returns whether the value changed. A change marks the domain, and
    /// its enabled dependents, dirty.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown field or a value of the wrong type.
    pub fn set_field(
        &mut self,
        domain: Domain,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> SyncResult<bool> {
        self.ensure_loaded();
        let changed = self.cache.set_field(domain, name, value.into())?;
        if changed {
            self.note_edit(DomainMask::only(domain));
        }
        Ok(changed)
    }

    /// Edits one domain's state in place through its typed struct.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use envsync_engine::{Synchronizer, SyncConfig};
    /// # use envsync_core::FogState;
    /// # use envsync_store::InMemoryStore;
    /// let mut sync = Synchronizer::new(SyncConfig::default(), Arc::new(InMemoryStore::new()));
    /// assert!(sync.edit(|fog: &mut FogState| fog.density = 0.3));
    /// assert!(sync.has_pending_changes());
    /// ```
    pub fn edit<S, F>(&mut self, f: F) -> bool
    where
        S: CacheSlot,
        F: FnOnce(&mut S),
    {
        self.ensure_loaded();
        let before = S::slot(&self.cache).clone();
        f(S::slot_mut(&mut self.cache));
        let changed = *S::slot(&self.cache) != before;
        if changed {
            self.note_edit(DomainMask::only(S::DOMAIN));
        }
        changed
    }

    /// Enables or disables a domain. Returns whether the flag changed.
    pub fn set_enabled(&mut self, domain: Domain, enabled: bool) -> bool {
        self.ensure_loaded();
        let changed = self.cache.set_enabled(domain, enabled);
        if changed {
            self.note_edit(DomainMask::only(domain));
        }
        changed
    }

    fn note_edit(&mut self, mask: DomainMask) {
        self.cache.set_customized(true);
        let expanded = self.tracker.mark_dirty(mask, self.cache.enabled_mask());
        debug!(
            domains = ?expanded,
            depth = self.tracker.depth(),
            revision = self.tracker.revision(),
            "marked dirty"
        );
    }

    /// Opens a transaction. Edits are batched until the matching
    /// [`end_update`](Self::end_update).
    pub fn begin_update(&mut self) {
        self.ensure_loaded();
        self.tracker.begin_update();
    }

    /// Closes a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    pub fn end_update(&mut self) -> SyncResult<()> {
        self.tracker.end_update(self.cache.enabled_mask())?;
        Ok(())
    }

    /// Opens a transaction that closes when the guard is dropped.
    pub fn update(&mut self) -> UpdateGuard<'_> {
        self.begin_update();
        UpdateGuard { sync: self }
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    /// Attaches an authority and applies the current policy.
    ///
    /// Attaching the authority that is already attached changes nothing.
    /// Attaching a different one detaches the current one first.
    pub fn attach(&mut self, authority: Box<dyn Authority>) -> BindingState {
        self.ensure_loaded();
        let identity = authority.identity();
        if self.binding.is_bound_to(identity) {
            debug!(%identity, "authority already attached");
            return self.binding.state();
        }
        if self.authority.is_some() {
            self.detach();
        }

        self.authority = Some(authority);
        self.forget_authority_state();
        self.resync.bind(Some(identity));
        let state = self.binding.attach(identity);
        self.stats.attaches += 1;
        info!(%identity, policy = %self.binding.policy(), ?state, "attached authority");
        self.enter(state);
        state
    }

    /// Detaches the authority, returning it.
    ///
    /// Unpersisted edits are saved first, bypassing the debounce. Dirty and
    /// batched edits, the pending pull and every handle and baseline tied
    /// to the authority are then dropped.
    pub fn detach(&mut self) -> Option<Box<dyn Authority>> {
        let authority = self.authority.take()?;
        self.ensure_loaded();
        if self.tracker.has_pending() || self.tracker.revision() != self.last_persisted_revision {
            if let Err(err) = self.save_settings() {
                warn!(error = %err, "failed to persist settings on detach");
            }
        }
        self.tracker.clear();
        self.pull_pending = false;
        self.forget_authority_state();
        self.resync.bind(None);
        let identity = self.binding.detach();
        self.stats.detaches += 1;
        info!(identity = ?identity, "detached authority");
        Some(authority)
    }

    /// Settles a pending custom-snapshot binding now instead of at the next
    /// frame start. Returns the new state if one was pending.
    pub fn resolve_policy(&mut self) -> Option<BindingState> {
        if self.binding.state() != BindingState::BoundCustomPending {
            return None;
        }
        self.ensure_loaded();
        let has_custom = self.cache.is_customized()
            || self.persistence.has_custom_snapshot(self.store.as_ref());
        let state = self.binding.resolve(has_custom)?;
        info!(?state, has_custom, "resolved custom snapshot policy");
        self.enter(state);
        Some(state)
    }

    fn enter(&mut self, state: BindingState) {
        match state {
            BindingState::BoundOverride => {
                self.pull_pending = false;
                self.tracker
                    .mark_dirty(DomainMask::ALL, self.cache.enabled_mask());
            }
            BindingState::BoundFollow => self.pull_pending = true,
            BindingState::BoundCustomPending | BindingState::NoAuthority => {}
        }
    }

    fn forget_authority_state(&mut self) {
        self.handles = [None; Domain::COUNT];
        self.baselines = Default::default();
        self.retry.reset();
        self.pending_image = None;
        self.refresh_due = DomainMask::EMPTY;
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    /// Runs one frame of synchronization.
    pub fn on_frame_start(&mut self) -> FrameReport {
        self.frame += 1;
        self.stats.frames += 1;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };

        self.ensure_loaded();

        if self.binding.state() == BindingState::BoundCustomPending {
            self.resolve_policy();
        }

        if self.resync.take() && self.authority.is_some() {
            self.pull_pending = true;
            self.stats.resyncs += 1;
            debug!(frame = self.frame, "resync requested");
        }

        if self.pull_pending && self.authority.is_some() {
            report.pulled = matches!(self.try_pull(), PullOutcome::Applied { .. });
        }

        if self.authority.is_some() && !self.tracker.dirty().is_empty() {
            // fresh edits get a fresh attempt
            for domain in self.tracker.take_scheduled().iter() {
                self.retry.record_success(domain);
            }
            let due = self.retry.due(self.tracker.dirty(), self.frame);
            if !due.is_empty() {
                report.pushed = self.push_domains(due).written;
            }
        }

        report.persisted = self.persist_if_dirty();
        report
    }

    // ------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------

    /// Reads the authority into the cache.
    ///
    /// Deferred while a transaction is open or any domain has unpushed
    /// edits; the pull then stays pending for a later frame.
    pub fn pull_from_authority(&mut self) -> PullOutcome {
        if self.authority.is_none() {
            return PullOutcome::NoAuthority;
        }
        self.pull_pending = true;
        self.try_pull()
    }

    fn try_pull(&mut self) -> PullOutcome {
        let Some(authority) = self.authority.as_deref() else {
            return PullOutcome::NoAuthority;
        };
        if self.tracker.in_transaction() || self.tracker.has_pending() {
            self.stats.deferred_pulls += 1;
            debug!(dirty = ?self.tracker.dirty(), "pull deferred, edits in flight");
            return PullOutcome::Deferred;
        }

        let mut changed = DomainMask::EMPTY;
        for domain in Domain::ALL {
            let i = domain.index();
            let handle = authority
                .try_get(domain)
                .filter(|handle| authority.is_active(*handle));
            match handle {
                Some(handle) => {
                    let before = self.cache.state(domain);
                    let read = read_state(authority, handle, &before);
                    let mut state = read.clone();
                    let validation = validate(&mut state, true);
                    if let Some(reason) = &validation.rejection {
                        debug!(%domain, %reason, "authority holds a state that cannot be pushed back");
                    }
                    diff_and_log(domain, "pull", &before, &state);
                    let values_changed = self.cache.replace(state);
                    let enabled_changed = self.cache.set_enabled(domain, true);
                    if values_changed || enabled_changed {
                        changed.insert(domain);
                    }
                    self.handles[i] = Some(handle);
                    // the authority still holds the unclamped values
                    self.baselines[i] = Some(read);
                }
                None => {
                    if self.cache.set_enabled(domain, false) {
                        changed.insert(domain);
                    }
                    self.handles[i] = None;
                    self.baselines[i] = None;
                }
            }
        }

        self.pull_pending = false;
        self.epoch += 1;
        self.stats.pulls += 1;
        if !changed.is_empty() {
            self.tracker.bump_revision();
        }
        debug!(changed = ?changed, epoch = self.epoch, "pulled authority state");
        PullOutcome::Applied { changed }
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Writes every dirty domain into the authority, then persists if due.
    ///
    /// Domains that fail stay dirty; everything else is cleared.
    pub fn push_pending_changes(&mut self) -> PushReport {
        self.tracker.take_scheduled();
        let report = self.push_domains(self.tracker.dirty());
        self.persist_if_dirty();
        report
    }

    fn push_domains(&mut self, mask: DomainMask) -> PushReport {
        let mut report = PushReport::default();
        if self.authority.is_none() || mask.is_empty() {
            return report;
        }

        let mut retry = self.tracker.dirty().difference(mask);
        // domains with dependents go first so their dependents see the write
        let (sources, rest): (Vec<Domain>, Vec<Domain>) =
            mask.iter().partition(|d| !d.dependents().is_empty());
        for domain in sources.into_iter().chain(rest) {
            let outcome = self.push_domain(domain);
            if let Some(image) = self.pending_image.take() {
                self.request_image_load(image);
            }
            match outcome {
                Ok(operations) => {
                    self.retry.record_success(domain);
                    if operations > 0 {
                        report.written.insert(domain);
                        report.operations += operations;
                        let dependents = domain.dependents() & self.tracker.dirty();
                        self.refresh_due |= dependents;
                    }
                }
                Err(err) => {
                    retry.insert(domain);
                    report.failed.insert(domain);
                    self.stats.push_failures += 1;
                    let next = self
                        .retry
                        .record_failure(domain, self.frame, &self.config.retry);
                    warn!(
                        %domain,
                        error = %err,
                        failures = self.retry.failures(domain),
                        retry_frame = next,
                        "push failed, domain stays dirty"
                    );
                }
            }
        }

        self.tracker.set_dirty(retry);
        self.stats.pushes += 1;
        if !report.written.is_empty() {
            self.epoch += 1;
            self.stats.domains_written += report.written.len() as u64;
        }
        debug!(
            written = ?report.written,
            failed = ?report.failed,
            operations = report.operations,
            "pushed pending changes"
        );
        report
    }

    /// Pushes one domain, returning the number of authority operations.
    fn push_domain(&mut self, domain: Domain) -> SyncResult<usize> {
        let i = domain.index();
        let enabled = self.cache.is_enabled(domain);
        let mut state = self.cache.state(domain);
        let validation = validate(&mut state, enabled);
        if !validation.corrections.is_empty() {
            self.stats.corrections += validation.corrections.len() as u64;
            self.cache.replace(state.clone());
        }
        if let Some(reason) = validation.rejection {
            return Err(SyncError::rejected(domain, reason));
        }
        let action = disable_action(domain, &self.cache);

        let authority = self.authority.as_deref_mut().ok_or(SyncError::NoAuthority)?;
        let present = authority
            .try_get(domain)
            .filter(|handle| authority.is_active(*handle));

        if !enabled {
            self.handles[i] = None;
            self.baselines[i] = None;
            self.refresh_due.remove(domain);
            let Some(handle) = present else {
                return Ok(0);
            };
            match action {
                DisableAction::Remove => {
                    authority.remove(domain, handle)?;
                    self.stats.objects_removed += 1;
                }
                DisableAction::Deactivate => {
                    authority.deactivate(domain, handle)?;
                    self.stats.objects_deactivated += 1;
                }
            }
            debug!(%domain, ?action, "retired authority object");
            return Ok(1);
        }

        let mut operations = 0;
        let handle = match present {
            Some(handle) => {
                let template = self.baselines[i].as_ref().unwrap_or(&state);
                let current = read_state(&*authority, handle, template);
                if let Some(baseline) = &self.baselines[i] {
                    let changes = diff_within(baseline, &current, PULL_EPSILON);
                    if !changes.is_empty() {
                        self.stats.divergences += 1;
                        let fields: Vec<_> = changes.iter().map(|c| c.field).collect();
                        warn!(%domain, ?fields, "authority diverged from last synchronized state");
                    }
                }
                diff_and_log(domain, "push", &current, &state);
                handle
            }
            None => {
                let handle = authority.create(domain)?;
                self.stats.objects_created += 1;
                operations += 1;
                handle
            }
        };
        self.handles[i] = Some(handle);

        for (name, value) in state.fields() {
            let (authority_name, conversion) = authority_field(domain, name);
            let target = to_authority(conversion, value);
            let unchanged = authority
                .get_field(handle, authority_name)
                .is_some_and(|current| current.approx_eq(&target, WRITE_EPSILON));
            if unchanged {
                continue;
            }
            authority.set_field(handle, authority_name, target)?;
            self.stats.field_writes += 1;
            operations += 1;
            if let ("path", DomainState::SkyImage(image)) = (name, &state) {
                if !image.path.is_empty() {
                    self.pending_image = Some(image.clone());
                }
            }
        }

        if operations == 0 && self.refresh_due.contains(domain) {
            authority.refresh(domain, handle)?;
            self.stats.objects_refreshed += 1;
            operations += 1;
            debug!(%domain, "refreshed dependent object");
        }
        self.refresh_due.remove(domain);

        self.baselines[i] = Some(state);
        Ok(operations)
    }

    fn request_image_load(&mut self, image: SkyImageState) {
        let Some(identity) = self.binding.identity() else {
            return;
        };
        let Some(loader) = self.loader.as_mut() else {
            debug!(path = %image.path, "no resource loader, sky image not loaded");
            return;
        };
        let path = image.path.clone();
        let request = LoadRequest {
            path: path.clone(),
            options: self.config.load_options.clone(),
            snapshot: image,
            identity,
        };
        let resync = self.resync.clone();
        self.stats.image_loads += 1;
        info!(%path, %identity, "requesting sky image load");
        loader.load_and_equip(
            request,
            Box::new(move |result| match result {
                LoadResult::Equipped { path } => {
                    if resync.request_for(identity) {
                        debug!(%path, "sky image equipped");
                    }
                }
                LoadResult::Failed { path, message } => {
                    warn!(%path, %message, "sky image load failed");
                }
            }),
        );
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Loads persisted settings into the cache.
    ///
    /// Runs lazily before the first edit, attach, save or frame if the host
    /// never calls it. Domains holding unpushed edits keep their cached
    /// values and enabled flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema migration fails; the cache keeps its
    /// current values.
    pub fn load_settings(&mut self) -> SyncResult<LoadReport> {
        self.loaded = true;
        let pending = self.tracker.dirty() | self.tracker.batched();
        let kept: Vec<(DomainState, bool)> = pending
            .iter()
            .map(|domain| (self.cache.state(domain), self.cache.is_enabled(domain)))
            .collect();
        let report = self
            .persistence
            .load(self.store.as_ref(), &mut self.cache)?;
        for (state, enabled) in kept {
            let domain = state.domain();
            self.cache.replace(state);
            self.cache.set_enabled(domain, enabled);
        }
        if !pending.is_empty() {
            debug!(domains = ?pending, "kept unpushed edits over stored settings");
        }
        self.stats.loads += 1;
        if report.custom_snapshot {
            if self.binding.state() == BindingState::BoundOverride {
                self.tracker
                    .mark_dirty(DomainMask::ALL, self.cache.enabled_mask());
            }
            if report.needs_rewrite {
                self.tracker.bump_revision();
            } else if pending.is_empty() {
                self.last_persisted_revision = self.tracker.revision();
            }
        }
        Ok(report)
    }

    /// Saves the cache now, bypassing the debounce.
    ///
    /// # Errors
    ///
    /// Returns the store error; the revision then stays unpersisted.
    pub fn save_settings(&mut self) -> SyncResult<()> {
        self.ensure_loaded();
        if let Err(err) = self.persistence.save(self.store.as_ref(), &self.cache) {
            self.stats.persist_failures += 1;
            return Err(err.into());
        }
        self.last_persisted_revision = self.tracker.revision();
        self.stats.persists += 1;
        debug!(revision = self.last_persisted_revision, "persisted settings");
        Ok(())
    }

    /// Saves the cache if the revision moved, no transaction is open and
    /// the debounce window has elapsed. Returns whether it saved.
    ///
    /// A failed save is logged and retried on a later call.
    pub fn persist_if_dirty(&mut self) -> bool {
        self.ensure_loaded();
        let revision = self.tracker.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.last_change_frame = self.frame;
        }
        if revision == self.last_persisted_revision || self.tracker.in_transaction() {
            return false;
        }
        if self.frame.saturating_sub(self.last_change_frame) < self.config.persist_debounce_frames {
            return false;
        }
        match self.save_settings() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, revision, "failed to persist settings, will retry");
                false
            }
        }
    }

    fn ensure_loaded(&mut self) {
        if self.loaded {
            return;
        }
        if let Err(err) = self.load_settings() {
            warn!(error = %err, "failed to load settings, keeping defaults");
        }
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("binding", &self.binding)
            .field("dirty", &self.tracker.dirty())
            .field("revision", &self.tracker.revision())
            .field("epoch", &self.epoch)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

/// Reads an authority object into a copy of `template`.
///
/// Fields the object lacks, and fields within [`PULL_EPSILON`] of the
/// template, keep the template's value.
fn read_state(authority: &dyn Authority, handle: ObjectHandle, template: &DomainState) -> DomainState {
    let domain = template.domain();
    let mut state = template.clone();
    for (name, current) in template.fields() {
        let (authority_name, conversion) = authority_field(domain, name);
        let Some(value) = authority.get_field(handle, authority_name) else {
            continue;
        };
        let value = from_authority(conversion, value);
        if value.approx_eq(&current, PULL_EPSILON) {
            continue;
        }
        if let Err(err) = state.set_field(name, value) {
            warn!(%domain, field = name, error = %err, "authority value does not fit field");
        }
    }
    state
}

/// An open transaction on a [`Synchronizer`], closed on drop.
///
/// Dereferences to the synchronizer so edits go through the guard:
///
/// ```
/// # use std::sync::Arc;
/// # use envsync_engine::{Synchronizer, SyncConfig};
/// # use envsync_core::Domain;
/// # use envsync_store::InMemoryStore;
/// let mut sync = Synchronizer::new(SyncConfig::default(), Arc::new(InMemoryStore::new()));
/// {
///     let mut update = sync.update();
///     update.set_field(Domain::Sun, "intensity", 20.0).unwrap();
///     update.set_field(Domain::Sun, "elevation_deg", 10.0).unwrap();
///     assert!(update.dirty_mask().is_empty());
/// }
/// assert_eq!(sync.revision(), 1);
/// ```
pub struct UpdateGuard<'a> {
    sync: &'a mut Synchronizer,
}

impl Deref for UpdateGuard<'_> {
    type Target = Synchronizer;

    fn deref(&self) -> &Synchronizer {
        self.sync
    }
}

impl DerefMut for UpdateGuard<'_> {
    fn deref_mut(&mut self) -> &mut Synchronizer {
        self.sync
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.sync.end_update() {
            warn!(error = %err, "update guard found its transaction already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAuthority;
    use envsync_core::FogState;
    use envsync_store::InMemoryStore;

    fn synchronizer(config: SyncConfig) -> (Synchronizer, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let sync = Synchronizer::new(config, store.clone());
        (sync, store)
    }

    #[test]
    fn initial_state() {
        let (sync, _) = synchronizer(SyncConfig::default());
        assert_eq!(sync.binding_state(), BindingState::NoAuthority);
        assert_eq!(sync.epoch(), 0);
        assert_eq!(sync.revision(), 0);
        assert!(!sync.has_pending_changes());
        assert!(sync.authority().is_none());
    }

    #[test]
    fn set_field_marks_dirty_and_customizes() {
        let (mut sync, _) = synchronizer(SyncConfig::default());
        assert!(sync.set_field(Domain::Fog, "density", 0.5).unwrap());
        assert!(!sync.set_field(Domain::Fog, "density", 0.5).unwrap());

        assert!(sync.dirty_mask().contains(Domain::Fog));
        assert!(sync.cache().is_customized());
        assert_eq!(sync.revision(), 1);
    }

    #[test]
    fn set_field_errors_are_returned() {
        let (mut sync, _) = synchronizer(SyncConfig::default());
        assert!(matches!(
            sync.set_field(Domain::Fog, "thickness", 1.0),
            Err(SyncError::Core(_))
        ));
        assert!(matches!(
            sync.set_field(Domain::Fog, "volumetric", 1.0),
            Err(SyncError::Core(_))
        ));
        assert!(!sync.has_pending_changes());
    }

    #[test]
    fn typed_edit() {
        let (mut sync, _) = synchronizer(SyncConfig::default());
        assert!(!sync.edit(|_: &mut FogState| {}));
        assert!(sync.edit(|fog: &mut FogState| fog.volumetric = true));
        assert!(sync.dirty_mask().contains(Domain::Fog));
    }

    #[test]
    fn guard_closes_transaction() {
        let (mut sync, _) = synchronizer(SyncConfig::default());
        {
            let mut update = sync.update();
            update.set_field(Domain::Fog, "density", 0.1).unwrap();
            update.set_field(Domain::Fog, "density", 0.2).unwrap();
            assert!(update.dirty_mask().is_empty());
            assert!(update.has_pending_changes());
        }
        assert_eq!(sync.dirty_mask(), DomainMask::only(Domain::Fog));
        assert_eq!(sync.revision(), 1);
        assert!(sync.end_update().is_err());
    }

    #[test]
    fn pull_without_authority() {
        let (mut sync, _) = synchronizer(SyncConfig::default());
        assert_eq!(sync.pull_from_authority(), PullOutcome::NoAuthority);
        assert!(!sync.is_pull_pending());
    }

    #[test]
    fn follow_attach_pulls_on_next_frame() {
        let (mut sync, _) = synchronizer(SyncConfig::default());
        let scene = MemoryAuthority::new();
        scene.insert_state(&DomainState::Fog(FogState {
            density: 0.25,
            ..FogState::default()
        }));

        assert_eq!(sync.attach(Box::new(scene.clone())), BindingState::BoundFollow);
        assert!(sync.is_pull_pending());

        let report = sync.on_frame_start();
        assert!(report.pulled);
        assert!(sync.cache().is_enabled(Domain::Fog));
        assert!(!sync.cache().is_enabled(Domain::Atmosphere));
        assert_eq!(sync.cache().fog.density, 0.25);
        assert_eq!(sync.epoch(), 1);
        assert!(sync.object_handle(Domain::Fog).is_some());
    }

    #[test]
    fn reattaching_same_identity_is_a_no_op() {
        let (mut sync, _) = synchronizer(SyncConfig::default());
        let scene = MemoryAuthority::new();
        sync.attach(Box::new(scene.clone()));
        sync.on_frame_start();

        sync.attach(Box::new(scene.clone()));
        assert!(!sync.is_pull_pending());
        assert_eq!(sync.stats().attaches, 1);
    }

    #[test]
    fn sky_image_path_change_requests_load() {
        use crate::resource::RecordingLoader;

        let loader = RecordingLoader::new();
        let (sync, _) = synchronizer(
            SyncConfig::default()
                .with_policy(SyncPolicy::ForceOverride)
                .with_persist_debounce_frames(0),
        );
        let mut sync = sync.with_loader(Box::new(loader.clone()));
        let scene = MemoryAuthority::new();
        sync.attach(Box::new(scene.clone()));
        sync.on_frame_start();
        assert!(loader.requests().is_empty());

        sync.set_field(Domain::SkyImage, "path", "sky/noon.hdr").unwrap();
        sync.set_enabled(Domain::SkyImage, true);
        sync.on_frame_start();

        let requests = loader.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "sky/noon.hdr");
        assert_eq!(requests[0].snapshot.path, "sky/noon.hdr");
        assert_eq!(Some(requests[0].identity), sync.binding().identity());

        // an unchanged path is not reloaded
        sync.set_field(Domain::SkyImage, "exposure_ev", 1.0).unwrap();
        sync.on_frame_start();
        assert_eq!(loader.requests().len(), 1);

        assert!(loader.complete_next(true));
        assert!(sync.resync_handle().is_requested());
    }
}
