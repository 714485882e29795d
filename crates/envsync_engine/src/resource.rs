//! Asynchronous image loading and resync requests.

use crate::authority::AuthorityId;
use envsync_core::SkyImageState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// How the loader should prepare an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Generate a mip chain.
    pub generate_mips: bool,
    /// Downscale images larger than this many pixels on a side.
    pub max_dimension: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            generate_mips: true,
            max_dimension: 8192,
        }
    }
}

/// A request to load an image and equip it on the sky image object.
///
/// Everything is carried by value; the loader never reads the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    /// Image path.
    pub path: String,
    /// Preparation options.
    pub options: LoadOptions,
    /// The sky image parameters at the time of the request.
    pub snapshot: SkyImageState,
    /// The authority the image is meant for.
    pub identity: AuthorityId,
}

/// How a load ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    /// The image is loaded and equipped.
    Equipped {
        /// Image path.
        path: String,
    },
    /// The image could not be loaded.
    Failed {
        /// Image path.
        path: String,
        /// What went wrong.
        message: String,
    },
}

/// Completion callback handed to a [`ResourceLoader`].
pub type LoadCallback = Box<dyn FnOnce(LoadResult) + Send>;

/// Loads images off the frame loop.
///
/// # Implementors
///
/// - [`RecordingLoader`] - Queues requests until a test completes them
pub trait ResourceLoader: Send {
    /// Starts a load. `on_complete` may run on any thread, once.
    fn load_and_equip(&mut self, request: LoadRequest, on_complete: LoadCallback);
}

#[derive(Debug, Default)]
struct ResyncShared {
    requested: AtomicBool,
    identity: Mutex<Option<AuthorityId>>,
    ignored: AtomicU64,
}

/// A thread-safe way to ask the synchronizer to re-read the authority.
///
/// Requests only set a flag; the pull happens at the next frame start.
/// Requests tagged with an identity other than the attached one are
/// dropped, so a callback for a scene that has since been swapped out is
/// harmless.
#[derive(Debug, Clone, Default)]
pub struct ResyncHandle {
    shared: Arc<ResyncShared>,
}

impl ResyncHandle {
    /// Creates a handle bound to nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a resync of whatever is attached.
    pub fn request(&self) {
        self.shared.requested.store(true, Ordering::SeqCst);
    }

    /// Requests a resync if `identity` is still attached.
    ///
    /// Returns false if the request was dropped as stale.
    pub fn request_for(&self, identity: AuthorityId) -> bool {
        let current = self.shared.identity.lock();
        if *current != Some(identity) {
            self.shared.ignored.fetch_add(1, Ordering::SeqCst);
            debug!(%identity, "ignoring resync request for a detached authority");
            return false;
        }
        self.shared.requested.store(true, Ordering::SeqCst);
        true
    }

    /// Whether a request is waiting.
    pub fn is_requested(&self) -> bool {
        self.shared.requested.load(Ordering::SeqCst)
    }

    /// Number of stale requests dropped.
    pub fn ignored(&self) -> u64 {
        self.shared.ignored.load(Ordering::SeqCst)
    }

    /// Identity requests must carry to be honoured.
    pub fn identity(&self) -> Option<AuthorityId> {
        *self.shared.identity.lock()
    }

    pub(crate) fn take(&self) -> bool {
        self.shared.requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn bind(&self, identity: Option<AuthorityId>) {
        let mut current = self.shared.identity.lock();
        *current = identity;
        self.shared.requested.store(false, Ordering::SeqCst);
    }
}

struct PendingLoad {
    request: LoadRequest,
    on_complete: LoadCallback,
}

/// A loader that queues requests until the test completes them.
///
/// Clones share the queue.
#[derive(Clone, Default)]
pub struct RecordingLoader {
    pending: Arc<Mutex<Vec<PendingLoad>>>,
    requested: Arc<Mutex<Vec<LoadRequest>>>,
}

impl RecordingLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received, completed or not.
    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requested.lock().clone()
    }

    /// Number of loads not yet completed.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Completes the oldest pending load. Returns false if none was pending.
    pub fn complete_next(&self, success: bool) -> bool {
        let next = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };
        let Some(load) = next else {
            return false;
        };
        let path = load.request.path.clone();
        let result = if success {
            LoadResult::Equipped { path }
        } else {
            LoadResult::Failed {
                path,
                message: "load failed".to_string(),
            }
        };
        (load.on_complete)(result);
        true
    }

    /// Completes every pending load.
    pub fn complete_all(&self, success: bool) -> usize {
        let mut completed = 0;
        while self.complete_next(success) {
            completed += 1;
        }
        completed
    }
}

impl std::fmt::Debug for RecordingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingLoader")
            .field("pending", &self.pending_count())
            .field("requested", &self.requested.lock().len())
            .finish()
    }
}

impl ResourceLoader for RecordingLoader {
    fn load_and_equip(&mut self, request: LoadRequest, on_complete: LoadCallback) {
        self.requested.lock().push(request.clone());
        self.pending.lock().push(PendingLoad {
            request,
            on_complete,
        });
    }
}
