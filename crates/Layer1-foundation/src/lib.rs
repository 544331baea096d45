//! # errand-foundation
//!
//! Foundation layer for Errand:
//! - Error: the error taxonomy shared by every layer
//! - Config: executor timing (eviction interval, shutdown grace)
//! - Storage: JsonStore for settings files

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result, TaskFailure};

// ============================================================================
// Config & Storage
// ============================================================================
pub use config::{ExecutorConfig, EXECUTOR_FILE};
pub use storage::JsonStore;
