//! Registry of per-endpoint rate limiters
//!
//! The application builds one [`LimiterRegistry`] at startup and hands it
//! (or clones of it) to every component that calls upstream APIs. Limiters
//! are created lazily, one per endpoint name, and shared by all callers
//! that ask for the same name.

use crate::config::{RateLimitConfig, ThrottleConfig};
use crate::ratelimit::{LimiterStatus, RateLimitError, RateLimiter};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Owned map from endpoint name to its rate limiter
#[derive(Debug, Clone)]
pub struct LimiterRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    default_provider: String,
    settings: HashMap<String, RateLimitConfig>,
    limiters: DashMap<String, RateLimiter>,
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new(&ThrottleConfig::default())
    }
}

impl LimiterRegistry {
    /// Create a registry from loaded configuration
    pub fn new(config: &ThrottleConfig) -> Self {
        let settings = config
            .providers
            .iter()
            .map(|(name, limits)| (name.to_lowercase(), limits.clone()))
            .collect();

        Self {
            inner: Arc::new(RegistryInner {
                default_provider: config.default_provider.to_lowercase(),
                settings,
                limiters: DashMap::new(),
            }),
        }
    }

    /// Name of the endpoint used when callers do not specify one
    pub fn default_provider(&self) -> &str {
        &self.inner.default_provider
    }

    /// Limiter for the default endpoint
    pub fn default_limiter(&self) -> Result<RateLimiter, RateLimitError> {
        self.get_or_create(&self.inner.default_provider)
    }

    /// Configured settings for an endpoint, else its built-in preset
    pub fn settings_for(&self, name: &str) -> RateLimitConfig {
        let key = name.to_lowercase();
        self.inner
            .settings
            .get(&key)
            .cloned()
            .unwrap_or_else(|| RateLimitConfig::for_provider(&key))
    }

    /// Get or create the limiter for an endpoint
    ///
    /// Every call with the same (case-insensitive) name returns a handle to
    /// the same bucket.
    pub fn get_or_create(&self, name: &str) -> Result<RateLimiter, RateLimitError> {
        let key = name.to_lowercase();
        if let Some(limiter) = self.inner.limiters.get(&key) {
            return Ok(limiter.value().clone());
        }

        match self.inner.limiters.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let limits = self.settings_for(entry.key());
                let limiter = RateLimiter::from_config(entry.key().clone(), &limits)?;
                tracing::debug!(
                    limiter = %entry.key(),
                    requests_per_minute = limits.requests_per_minute,
                    burst_size = limits.burst_size,
                    enabled = limits.enabled,
                    "Created rate limiter"
                );
                entry.insert(limiter.clone());
                Ok(limiter)
            }
        }
    }

    /// Replace the limiter for an endpoint with one built from `config`
    ///
    /// Callers already queued on the old limiter finish against it.
    pub fn insert(&self, name: &str, config: &RateLimitConfig) -> Result<RateLimiter, RateLimitError> {
        let key = name.to_lowercase();
        let limiter = RateLimiter::from_config(key.clone(), config)?;
        self.inner.limiters.insert(key, limiter.clone());
        Ok(limiter)
    }

    /// Replace the limiter for an endpoint with a pass-through one
    pub fn disable(&self, name: &str) -> RateLimiter {
        let key = name.to_lowercase();
        let limiter = RateLimiter::disabled(key.clone());
        self.inner.limiters.insert(key, limiter.clone());
        limiter
    }

    /// Forget an endpoint's limiter; the next lookup starts with a full bucket
    pub fn remove(&self, name: &str) -> Option<RateLimiter> {
        self.inner
            .limiters
            .remove(&name.to_lowercase())
            .map(|(_, limiter)| limiter)
    }

    /// Names of the limiters created so far, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .limiters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Status of every limiter created so far, sorted by name
    pub fn statuses(&self) -> BTreeMap<String, LimiterStatus> {
        self.inner
            .limiters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }
}
