//! Configuration for the synchronizer.

use crate::binding::SyncPolicy;
use crate::resource::LoadOptions;
use envsync_core::DEFAULT_NAMESPACE;

/// Configuration for a [`crate::Synchronizer`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Policy applied when an authority is attached.
    pub policy: SyncPolicy,
    /// Frames to wait after the last change before persisting.
    pub persist_debounce_frames: u64,
    /// Backoff for domains whose push failed.
    pub retry: RetryConfig,
    /// Settings key namespace.
    pub key_namespace: String,
    /// Options passed with every image load.
    pub load_options: LoadOptions,
}

impl SyncConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            policy: SyncPolicy::default(),
            persist_debounce_frames: 30,
            retry: RetryConfig::default(),
            key_namespace: DEFAULT_NAMESPACE.to_string(),
            load_options: LoadOptions::default(),
        }
    }

    /// Sets the attach policy.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the persist debounce.
    pub fn with_persist_debounce_frames(mut self, frames: u64) -> Self {
        self.persist_debounce_frames = frames;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the settings key namespace.
    pub fn with_key_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.key_namespace = namespace.into();
        self
    }

    /// Sets the image load options.
    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame-based exponential backoff for failed pushes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Frames to wait after the first failure.
    pub initial_delay_frames: u64,
    /// Upper bound on the wait.
    pub max_delay_frames: u64,
    /// Growth factor per consecutive failure.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a configuration starting at `initial_delay_frames`.
    pub fn new(initial_delay_frames: u64) -> Self {
        Self {
            initial_delay_frames,
            max_delay_frames: 240,
            backoff_multiplier: 2.0,
        }
    }

    /// Retries on the very next frame, forever.
    pub fn immediate() -> Self {
        Self {
            initial_delay_frames: 0,
            max_delay_frames: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay_frames(mut self, frames: u64) -> Self {
        self.max_delay_frames = frames;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Frames to wait after `failures` consecutive failures.
    pub fn delay_for_attempt(&self, failures: u32) -> u64 {
        if failures == 0 {
            return 0;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let delay = self.initial_delay_frames as f64 * self.backoff_multiplier.powi(exponent);
        if delay.is_finite() {
            (delay.round() as u64).min(self.max_delay_frames)
        } else {
            self.max_delay_frames
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_policy(SyncPolicy::ForceOverride)
            .with_persist_debounce_frames(0)
            .with_key_namespace("scene");

        assert_eq!(config.policy, SyncPolicy::ForceOverride);
        assert_eq!(config.persist_debounce_frames, 0);
        assert_eq!(config.key_namespace, "scene");
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.policy, SyncPolicy::FollowExternal);
        assert_eq!(config.key_namespace, "env");
        assert!(config.load_options.generate_mips);
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let config = RetryConfig::new(2).with_max_delay_frames(20);
        assert_eq!(config.delay_for_attempt(0), 0);
        assert_eq!(config.delay_for_attempt(1), 2);
        assert_eq!(config.delay_for_attempt(2), 4);
        assert_eq!(config.delay_for_attempt(3), 8);
        assert_eq!(config.delay_for_attempt(10), 20);
        assert_eq!(config.delay_for_attempt(u32::MAX), 20);
    }

    #[test]
    fn immediate_retry_never_waits() {
        let config = RetryConfig::immediate();
        assert_eq!(config.delay_for_attempt(1), 0);
        assert_eq!(config.delay_for_attempt(50), 0);
    }
}
