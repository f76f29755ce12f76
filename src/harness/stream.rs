//! Line streams over child output.
//!
//! Every wait races the read (bounded by an optional [`Deadline`]) against the operator [`Interrupt`] in a
//! `tokio::select!`, so a silent child can never pin the harness.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::Instant;

use super::error::HarnessError;
use super::interrupt::Interrupt;

/// An optional point in time after which a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
    budget: Option<Duration>,
}

impl Deadline {
    /// Never expires.
    pub fn none() -> Self {
        Self { at: None, budget: None }
    }

    /// Expires `timeout` from now; `None` never expires.
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
            budget: timeout,
        }
    }

    /// The configured budget, for error messages.
    pub fn budget(&self) -> Duration {
        self.budget.unwrap_or_default()
    }

    /// Await `fut` until the deadline.
    pub async fn bound<F: Future>(&self, fut: F) -> Result<F::Output, WaitError> {
        match self.at {
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| WaitError::TimedOut(self.budget())),
            None => Ok(fut.await),
        }
    }
}

/// Why a wait ended without a result.
#[derive(Debug)]
pub enum WaitError {
    TimedOut(Duration),
    Interrupted,
    Io(io::Error),
}

impl WaitError {
    /// Attach the role and what was being waited for.
    pub fn into_harness(self, role: &str, waiting_for: &str) -> HarnessError {
        match self {
            WaitError::TimedOut(timeout) => HarnessError::TimedOut {
                role: role.to_string(),
                waiting_for: waiting_for.to_string(),
                timeout,
            },
            WaitError::Interrupted => HarnessError::Interrupted { role: role.to_string() },
            WaitError::Io(e) => HarnessError::Io(e),
        }
    }
}

/// Await `fut` until `deadline`, unless `interrupt` is raised first.
pub(crate) async fn wait<F: Future>(fut: F, deadline: Deadline, interrupt: &Interrupt) -> Result<F::Output, WaitError> {
    tokio::select! {
        output = deadline.bound(fut) => output,
        _ = interrupt.triggered() => Err(WaitError::Interrupted),
    }
}

type Source = Box<dyn AsyncRead + Send + Unpin>;

/// Lines of one child output stream, in arrival order.
pub struct LineStream {
    reader: BufReader<Source>,
    /// Bytes of a line whose read was cut short; the next read continues it.
    partial: Vec<u8>,
    interrupt: Interrupt,
}

impl LineStream {
    pub fn new(source: impl AsyncRead + Send + Unpin + 'static, interrupt: Interrupt) -> Self {
        let source: Source = Box::new(source);
        Self {
            reader: BufReader::new(source),
            partial: Vec::new(),
            interrupt,
        }
    }

    /// Stream over an in-memory or otherwise pre-opened reader, with an interrupt nobody raises.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::new(reader, Interrupt::new())
    }

    /// Next line including its terminator, or `None` at end-of-stream. Invalid UTF-8 is replaced, not fatal.
    pub async fn next_line(&mut self, deadline: Deadline) -> Result<Option<String>, WaitError> {
        let read = self.reader.read_until(b'\n', &mut self.partial);
        wait(read, deadline, &self.interrupt).await?.map_err(WaitError::Io)?;
        if self.partial.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Ok(Some(line))
    }

    /// Read everything up to end-of-stream into one string.
    pub async fn read_to_end(&mut self, deadline: Deadline) -> Result<String, WaitError> {
        let mut out = String::new();
        while let Some(line) = self.next_line(deadline).await? {
            out.push_str(&line);
        }
        Ok(out)
    }

    /// Discard everything up to end-of-stream.
    pub async fn drain(&mut self, deadline: Deadline) -> Result<usize, WaitError> {
        let mut count = 0;
        while self.next_line(deadline).await?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}
