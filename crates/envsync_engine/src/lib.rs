//! # envsync Engine
//!
//! Keeps an environment settings cache, a live scene and a persistent
//! settings store consistent.
//!
//! This crate provides:
//! - The [`Authority`] abstraction over the live scene, with an in-memory
//!   implementation ([`MemoryAuthority`])
//! - Binding policy: follow the scene, override it, or use the saved snapshot
//! - The frame-driven [`Synchronizer`]: pull, push, debounced persistence
//! - Per-domain retry with frame-based backoff
//! - Asynchronous sky image loading with stale-completion filtering
//!
//! ## Frame model
//!
//! Everything runs on the host's frame thread:
//! 1. Edits mark domains dirty (batched inside transactions)
//! 2. At frame start, a pending pull runs if nothing is dirty
//! 3. Dirty domains are pushed into the scene
//! 4. The settings are persisted once edits settle
//!
//! ## Key Invariants
//!
//! - A pull never overwrites an unpushed edit
//! - Pushing unchanged state writes nothing
//! - Edits inside a transaction produce one dirty notification
//! - Completions for a detached scene are ignored

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authority;
mod backoff;
mod binding;
mod config;
mod error;
mod memory;
mod resource;
mod stats;
mod synchronizer;

pub use authority::{disable_action, Authority, AuthorityId, DisableAction, ObjectHandle};
pub use binding::{AuthorityBinding, BindingState, SyncPolicy};
pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use memory::{AuthorityCounters, MemoryAuthority};
pub use resource::{
    LoadCallback, LoadOptions, LoadRequest, LoadResult, RecordingLoader, ResourceLoader,
    ResyncHandle,
};
pub use stats::SyncStats;
pub use synchronizer::{FrameReport, PullOutcome, PushReport, Synchronizer, UpdateGuard};
