//! Counters for observing a synchronizer.

/// Statistics about synchronizer activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Frames started.
    pub frames: u64,
    /// Successful settings loads.
    pub loads: u64,
    /// Pulls applied.
    pub pulls: u64,
    /// Pulls postponed because edits were in flight.
    pub deferred_pulls: u64,
    /// Push passes run.
    pub pushes: u64,
    /// Domains written by pushes.
    pub domains_written: u64,
    /// Individual authority field writes.
    pub field_writes: u64,
    /// Authority objects created.
    pub objects_created: u64,
    /// Authority objects removed.
    pub objects_removed: u64,
    /// Authority objects deactivated.
    pub objects_deactivated: u64,
    /// Dependent objects refreshed after a domain they depend on changed.
    pub objects_refreshed: u64,
    /// Domains whose push failed.
    pub push_failures: u64,
    /// Values repaired by validation before a push.
    pub corrections: u64,
    /// Times the authority was found changed behind the synchronizer.
    pub divergences: u64,
    /// Snapshots persisted.
    pub persists: u64,
    /// Failed persist attempts.
    pub persist_failures: u64,
    /// Resync requests honoured.
    pub resyncs: u64,
    /// Image loads requested.
    pub image_loads: u64,
    /// Authorities attached.
    pub attaches: u64,
    /// Authorities detached.
    pub detaches: u64,
}
