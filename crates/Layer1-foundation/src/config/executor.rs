//! Executor Configuration - eviction and shutdown timing
//!
//! Loaded from `executor.json` in a [`JsonStore`]; every field is optional
//! in the file and falls back to its default.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Executor settings file name
pub const EXECUTOR_FILE: &str = "executor.json";

/// Default eviction sweep interval: one hour
pub const DEFAULT_EVICTION_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Default grace period granted to in-flight tasks on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 7_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How often terminal tasks are evicted from the registry (must be > 0)
    pub eviction_interval_ms: u64,
    /// How long `close()` waits for in-flight bodies before aborting them
    pub shutdown_grace_ms: u64,
    /// Name of the OS thread hosting the timeout monitor and eviction sweep
    pub monitor_thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            eviction_interval_ms: DEFAULT_EVICTION_INTERVAL_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            monitor_thread_name: "errand-monitor".to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval_ms = interval.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = grace.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.eviction_interval_ms == 0 {
            return Err(Error::Config(
                "eviction_interval_ms must be strictly positive".to_string(),
            ));
        }
        if self.monitor_thread_name.is_empty() {
            return Err(Error::Config(
                "monitor_thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from `store`, defaults when the file is absent
    pub fn load(store: &JsonStore) -> Result<Self> {
        let config = match store.load_optional::<Self>(EXECUTOR_FILE)? {
            Some(config) => {
                debug!("Loaded {}", store.file_path(EXECUTOR_FILE).display());
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, store: &JsonStore) -> Result<()> {
        self.validate()?;
        store.save(EXECUTOR_FILE, self)
    }
}
