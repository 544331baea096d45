//! Subcommand implementations

use errand_task::io::StdoutLineWriter;
use errand_task::{
    CountInput, CountingTask, ExecInput, ExecTask, LinePump, Task, TaskExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Count to `max` with progress on stdout; returns the exit code
pub async fn count(
    executor: &TaskExecutor,
    max: u64,
    pause: Duration,
    queue: usize,
    timeout: Duration,
) -> anyhow::Result<i32> {
    let (pump, progress) = LinePump::new(queue, Arc::new(StdoutLineWriter));
    let pump = Arc::new(Task::new((), pump));
    executor.submit(Arc::clone(&pump))?;

    let task = Arc::new(
        Task::new(
            CountInput { max, pause },
            CountingTask::with_progress(Arc::new(progress)),
        )
        .with_timeout(timeout),
    );

    let result = executor.run(Arc::clone(&task)).await;
    println!("{}", task);

    match result {
        Ok(output) => {
            info!(
                "{} Counted to {} in {:?}",
                task.status().symbol(),
                output.result,
                task.duration()
            );
            Ok(0)
        }
        Err(e) if e.is_await_error() => {
            eprintln!("{} Error: {}", task.status().symbol(), e);
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}

/// Run a program, forwarding its output; returns its exit code
pub async fn exec(
    executor: &TaskExecutor,
    input: ExecInput,
    timeout: Duration,
    json: bool,
) -> anyhow::Result<i32> {
    let task = Arc::new(Task::new(input, ExecTask).with_timeout(timeout));
    let output = executor.run(Arc::clone(&task)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", output.stdout);
        eprint!("{}", output.stderr);
    }

    debug!("{}", task);
    Ok(output.exit_code)
}
