//! Line writers

use parking_lot::Mutex;
use std::io::{self, Write};

/// Sink for whole lines; the line terminator is added by the writer
pub trait LineWriter: Send + Sync {
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLineWriter;

impl LineWriter for NoopLineWriter {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutLineWriter;

impl LineWriter for StdoutLineWriter {
    fn write_line(&self, line: &str) -> io::Result<()> {
        writeln!(io::stdout().lock(), "{}", line)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLineWriter;

impl LineWriter for StderrLineWriter {
    fn write_line(&self, line: &str) -> io::Result<()> {
        writeln!(io::stderr().lock(), "{}", line)
    }
}

/// Appends lines to any [`Write`], e.g. a file or a `Vec<u8>`
pub struct AppendLineWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> AppendLineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }

    /// Run `f` against the underlying writer
    pub fn with_inner<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl<W: Write + Send> LineWriter for AppendLineWriter<W> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.write_all(line.as_bytes())?;
        inner.write_all(b"\n")
    }
}
