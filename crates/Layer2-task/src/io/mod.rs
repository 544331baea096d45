//! Line-oriented output for task bodies
//!
//! - [`LineWriter`]: anything that accepts whole lines
//! - [`LinePump`]: a task draining a bounded queue into another writer, so
//!   producers never block on slow output

mod pump;
mod writer;

pub use pump::{LinePump, PumpWriter, TRUNCATION_MARKER};
pub use writer::{AppendLineWriter, LineWriter, NoopLineWriter, StderrLineWriter, StdoutLineWriter};
