//! Config - settings management
//!
//! - `executor.rs` - task executor timing

mod executor;

pub use executor::{
    ExecutorConfig, DEFAULT_EVICTION_INTERVAL_MS, DEFAULT_SHUTDOWN_GRACE_MS, EXECUTOR_FILE,
};
