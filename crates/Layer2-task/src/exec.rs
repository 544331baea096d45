//! Process task - runs an external program to completion

use crate::task::Execute;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecInput {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; inherited when unset
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Added to the inherited environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ExecInput {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs [`ExecInput`]; the child is killed if the task is cancelled.
///
/// A non-zero exit code is an ordinary output, not a failure; only a
/// process that cannot be spawned or waited on fails the task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecTask;

#[async_trait]
impl Execute for ExecTask {
    type Input = ExecInput;
    type Output = ExecOutput;

    async fn execute(&self, input: &ExecInput) -> anyhow::Result<ExecOutput> {
        let mut cmd = Command::new(&input.program);
        cmd.args(&input.args)
            .envs(&input.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &input.cwd {
            cmd.current_dir(cwd);
        }

        debug!("Spawning {} {:?}", input.program.display(), input.args);
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", input.program.display()))?;
        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for {}", input.program.display()))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let input = ExecInput::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3");
        let output = ExecTask.execute(&input).await.unwrap();

        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_env_and_cwd() {
        let dir = std::env::temp_dir();
        let input = ExecInput::new("sh")
            .arg("-c")
            .arg("echo $ERRAND_TEST_VAR; pwd")
            .env("ERRAND_TEST_VAR", "hello")
            .cwd(&dir);
        let output = ExecTask.execute(&input).await.unwrap();

        assert!(output.success());
        assert!(output.stdout.starts_with("hello\n"));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let input = ExecInput::new("/nonexistent/errand-no-such-program");
        let err = ExecTask.execute(&input).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
