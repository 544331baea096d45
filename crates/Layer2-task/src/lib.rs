//! # errand-task
//!
//! Typed asynchronous tasks and the executor that runs them.
//!
//! ## Features
//!
//! - Tasks with a single authoritative result, set once by compare-and-set
//! - Exactly-once dispatch, one tokio task per submitted task
//! - Timeouts enforced by a monitor thread independent of the dispatch runtime
//! - Periodic eviction of terminal tasks
//! - Graceful `close()` with forced abort after a grace period
//! - Non-blocking line output through a pump task

pub mod demo;
pub mod exec;
pub mod executor;
pub mod io;
mod monitor;
mod registry;
mod slot;
pub mod state;
pub mod task;
mod wrapper;

pub use demo::{CountInput, CountOutput, CountingTask};
pub use exec::{ExecInput, ExecOutput, ExecTask};
pub use executor::{TaskExecutor, TaskExecutorBuilder};
pub use io::{LinePump, LineWriter, PumpWriter};
pub use state::Status;
pub use task::{AnyTask, Execute, FnTask, Task, TaskId};

pub use errand_foundation::{Error, ExecutorConfig, Result, TaskFailure};
