//! Authority binding and swap-policy resolution.
//!
//! ```text
//!                 attach(ForceOverride)
//!  NoAuthority ─────────────────────────▶ BoundOverride
//!      │  attach(FollowExternal)                ▲
//!      ├─────────────────────────▶ BoundFollow  │ custom snapshot
//!      │  attach(UseCustomSnapshot)      ▲      │
//!      └────────────────────▶ BoundCustomPending┘
//!                                  no snapshot
//! ```
//!
//! Any bound state returns to `NoAuthority` on detach.

use crate::authority::AuthorityId;
use std::fmt;
use std::str::FromStr;

/// Who wins after an authority is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncPolicy {
    /// The authority wins: pull its state into the cache.
    #[default]
    FollowExternal,
    /// The cache wins: push every domain into the authority.
    ForceOverride,
    /// The cache wins if it holds a persisted custom snapshot, otherwise
    /// the authority does.
    UseCustomSnapshot,
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncPolicy::FollowExternal => "follow",
            SyncPolicy::ForceOverride => "override",
            SyncPolicy::UseCustomSnapshot => "custom",
        })
    }
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "follow" | "follow-external" | "followexternal" => Ok(SyncPolicy::FollowExternal),
            "override" | "force-override" | "forceoverride" => Ok(SyncPolicy::ForceOverride),
            "custom" | "use-custom-snapshot" | "usecustomsnapshot" => {
                Ok(SyncPolicy::UseCustomSnapshot)
            }
            other => Err(format!("unknown sync policy: {other}")),
        }
    }
}

/// Where the binding stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingState {
    /// No authority attached.
    NoAuthority,
    /// Attached; the authority's state is pulled into the cache.
    BoundFollow,
    /// Attached; the cache is pushed into the authority.
    BoundOverride,
    /// Attached under `UseCustomSnapshot`; waiting to learn whether a
    /// custom snapshot exists.
    BoundCustomPending,
}

impl BindingState {
    /// True if an authority is attached.
    pub fn is_bound(&self) -> bool {
        !matches!(self, BindingState::NoAuthority)
    }
}

/// The binding between the synchronizer and at most one authority.
#[derive(Debug, Clone)]
pub struct AuthorityBinding {
    identity: Option<AuthorityId>,
    state: BindingState,
    policy: SyncPolicy,
}

impl AuthorityBinding {
    /// Creates an unbound binding.
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            identity: None,
            state: BindingState::NoAuthority,
            policy,
        }
    }

    /// The attached identity.
    pub fn identity(&self) -> Option<AuthorityId> {
        self.identity
    }

    /// The current state.
    pub fn state(&self) -> BindingState {
        self.state
    }

    /// The policy applied on the next attach.
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Changes the policy. The current binding is unaffected.
    pub fn set_policy(&mut self, policy: SyncPolicy) {
        self.policy = policy;
    }

    /// True if `identity` is the attached one.
    pub fn is_bound_to(&self, identity: AuthorityId) -> bool {
        self.identity == Some(identity)
    }

    /// Binds to an identity, entering the state the policy selects.
    ///
    /// The caller detaches any previous authority first.
    pub fn attach(&mut self, identity: AuthorityId) -> BindingState {
        self.identity = Some(identity);
        self.state = match self.policy {
            SyncPolicy::FollowExternal => BindingState::BoundFollow,
            SyncPolicy::ForceOverride => BindingState::BoundOverride,
            SyncPolicy::UseCustomSnapshot => BindingState::BoundCustomPending,
        };
        self.state
    }

    /// Unbinds, returning the identity that was attached.
    pub fn detach(&mut self) -> Option<AuthorityId> {
        self.state = BindingState::NoAuthority;
        self.identity.take()
    }

    /// Settles a pending custom-snapshot binding.
    ///
    /// Returns the new state, or `None` if nothing was pending.
    pub fn resolve(&mut self, has_custom_snapshot: bool) -> Option<BindingState> {
        if self.state != BindingState::BoundCustomPending {
            return None;
        }
        self.state = if has_custom_snapshot {
            BindingState::BoundOverride
        } else {
            BindingState::BoundFollow
        };
        Some(self.state)
    }
}

impl Default for AuthorityBinding {
    fn default() -> Self {
        Self::new(SyncPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_follows_policy() {
        let id = AuthorityId::new();
        let mut binding = AuthorityBinding::default();
        assert_eq!(binding.state(), BindingState::NoAuthority);
        assert_eq!(binding.attach(id), BindingState::BoundFollow);
        assert!(binding.is_bound_to(id));

        binding.set_policy(SyncPolicy::ForceOverride);
        assert_eq!(binding.state(), BindingState::BoundFollow);
        assert_eq!(binding.attach(id), BindingState::BoundOverride);
    }

    #[test]
    fn detach_clears_identity() {
        let id = AuthorityId::new();
        let mut binding = AuthorityBinding::new(SyncPolicy::ForceOverride);
        binding.attach(id);
        assert_eq!(binding.detach(), Some(id));
        assert_eq!(binding.state(), BindingState::NoAuthority);
        assert!(!binding.state().is_bound());
        assert_eq!(binding.detach(), None);
    }

    #[test]
    fn custom_pending_resolves_both_ways() {
        let mut binding = AuthorityBinding::new(SyncPolicy::UseCustomSnapshot);
        binding.attach(AuthorityId::new());
        assert_eq!(binding.state(), BindingState::BoundCustomPending);
        assert_eq!(binding.resolve(true), Some(BindingState::BoundOverride));
        assert_eq!(binding.resolve(false), None);

        binding.attach(AuthorityId::new());
        assert_eq!(binding.resolve(false), Some(BindingState::BoundFollow));
    }

    #[test]
    fn policy_parses_from_cli_names() {
        assert_eq!("follow".parse::<SyncPolicy>().unwrap(), SyncPolicy::FollowExternal);
        assert_eq!("Override".parse::<SyncPolicy>().unwrap(), SyncPolicy::ForceOverride);
        assert_eq!("custom".parse::<SyncPolicy>().unwrap(), SyncPolicy::UseCustomSnapshot);
        assert!("latest".parse::<SyncPolicy>().is_err());
        assert_eq!(SyncPolicy::UseCustomSnapshot.to_string(), "custom");
    }
}
