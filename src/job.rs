//! Background units of work.
//!
//! A [`Job`] runs one closure on its own thread and streams status text back
//! over a channel.  Jobs cannot be cancelled: once spawned they run to
//! completion and the caller either polls ([`Job::try_finish`]) or blocks
//! ([`Job::wait`]) for the result.
//!
//! ```text
//! caller ── spawn ──► worker thread ── progress ──► mpsc ──► poll()
//!                          │
//!                          └── Result<T> ──► JoinHandle ──► try_finish()/wait()
//! ```
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

use crate::edf::panic_message;
use crate::error::{Error, Result};

/// Worker-side handle for reporting status text.
#[derive(Debug, Clone)]
pub struct Progress {
    sender: Option<Sender<String>>,
}

impl Progress {
    /// A sink that discards everything, for synchronous callers.
    pub fn silent() -> Self {
        Self { sender: None }
    }

    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("progress: {message}");
        if let Some(tx) = &self.sender {
            // The receiver may already be gone; status text is best effort.
            let _ = tx.send(message);
        }
    }
}

/// A running unit of work producing `T`.
pub struct Job<T> {
    label: String,
    progress: Receiver<String>,
    handle: JoinHandle<Result<T>>,
    last_status: Option<String>,
}

impl<T: Send + 'static> Job<T> {
    /// Start `work` on a new thread.
    pub fn spawn<F>(label: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&Progress) -> Result<T> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = channel();
        let handle = std::thread::spawn(move || {
            let progress = Progress { sender: Some(tx) };
            work(&progress)
        });
        log::debug!("job '{label}' started");
        Self { label, progress: rx, handle, last_status: None }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Drain status messages sent since the previous call.
    pub fn poll(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match self.progress.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if let Some(last) = out.last() {
            self.last_status = Some(last.clone());
        }
        out
    }

    /// Most recent status seen by [`poll`](Self::poll).
    pub fn status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// The result if the worker is done, otherwise the job back.
    pub fn try_finish(self) -> std::result::Result<Result<T>, Self> {
        if self.is_finished() {
            Ok(self.wait())
        } else {
            Err(self)
        }
    }

    /// Block until the worker returns.
    ///
    /// # Errors
    ///
    /// The worker's own error, or [`Error::Worker`] if it panicked.
    pub fn wait(self) -> Result<T> {
        let label = self.label;
        match self.handle.join() {
            Ok(result) => {
                log::debug!("job '{label}' finished");
                result
            }
            Err(panic) => Err(Error::Worker { job: label, message: panic_message(&*panic) }),
        }
    }
}

impl<T> std::fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label)
            .field("finished", &self.handle.is_finished())
            .field("last_status", &self.last_status)
            .finish()
    }
}
