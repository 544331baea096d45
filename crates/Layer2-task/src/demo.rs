//! Demo task: counting with progress output

use crate::io::LineWriter;
use crate::task::Execute;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountInput {
    pub max: u64,
    /// Pause between increments; zero only yields
    pub pause: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountOutput {
    pub result: u64,
}

/// Counts from 0 to `max`, reporting each step to an optional writer
#[derive(Default)]
pub struct CountingTask {
    progress: Option<Arc<dyn LineWriter>>,
}

impl CountingTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(progress: Arc<dyn LineWriter>) -> Self {
        Self {
            progress: Some(progress),
        }
    }
}

#[async_trait]
impl Execute for CountingTask {
    type Input = CountInput;
    type Output = CountOutput;

    async fn execute(&self, input: &CountInput) -> anyhow::Result<CountOutput> {
        for i in 0..input.max {
            if let Some(progress) = &self.progress {
                progress.write_line(&i.to_string())?;
            }
            tokio::task::yield_now().await;
            if !input.pause.is_zero() {
                tokio::time::sleep(input.pause).await;
            }
        }
        Ok(CountOutput { result: input.max })
    }
}
