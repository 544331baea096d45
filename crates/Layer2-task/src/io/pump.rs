//! Line pump - non-blocking front end for a slow [`LineWriter`]

use super::LineWriter;
use crate::task::Execute;
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, MutexGuard};

/// Written in place of the lines dropped while the queue was full
pub const TRUNCATION_MARKER: &str = "[… output truncated …]";

/// Task body forwarding queued lines to a delegate writer.
///
/// Runs until cancelled or until every [`PumpWriter`] is dropped and the
/// queue is drained.
pub struct LinePump {
    queue: Mutex<mpsc::Receiver<String>>,
    delegate: Arc<dyn LineWriter>,
    overflow: Arc<AtomicBool>,
}

impl LinePump {
    /// A pump holding at most `capacity` lines, and the handle feeding it
    pub fn new(capacity: usize, delegate: Arc<dyn LineWriter>) -> (Self, PumpWriter) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let overflow = Arc::new(AtomicBool::new(false));
        let pump = Self {
            queue: Mutex::new(receiver),
            delegate,
            overflow: Arc::clone(&overflow),
        };
        (pump, PumpWriter { sender, overflow })
    }
}

#[async_trait]
impl Execute for LinePump {
    type Input = ();
    type Output = ();

    async fn execute(&self, _: &()) -> anyhow::Result<()> {
        let mut queue = Closing(self.queue.lock().await);
        loop {
            if self.overflow.swap(false, Ordering::AcqRel) {
                self.delegate.write_line(TRUNCATION_MARKER)?;
            }
            match queue.0.recv().await {
                Some(line) => self.delegate.write_line(&line)?,
                None => break,
            }
        }
        Ok(())
    }
}

/// Closes the queue when the pump stops for any reason, cancellation
/// included, so producers see `BrokenPipe` instead of filling it up.
struct Closing<'a>(MutexGuard<'a, mpsc::Receiver<String>>);

impl Drop for Closing<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Producer side of a [`LinePump`]; never blocks
#[derive(Clone)]
pub struct PumpWriter {
    sender: mpsc::Sender<String>,
    overflow: Arc<AtomicBool>,
}

impl PumpWriter {
    /// True once the pump has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl LineWriter for PumpWriter {
    /// Drops the line when the queue is full; fails with `BrokenPipe` once
    /// the pump has stopped.
    fn write_line(&self, line: &str) -> io::Result<()> {
        match self.sender.try_send(line.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.overflow.store(true, Ordering::Release);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "line pump has stopped",
            )),
        }
    }
}
