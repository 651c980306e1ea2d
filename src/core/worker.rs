//! Purpose: Run blocking capability handlers on one dedicated background thread.
//! Exports: `Worker`, `DEFAULT_WORKER_CAPACITY`.
//! Role: Keeps file I/O off the home thread; owned by the bridge lifecycle.
//! Invariants: Exactly one thread; jobs run one at a time in submission order.
//! Invariants: `submit` never blocks; a full or closed queue is reported as an error.
//! Invariants: `shutdown` runs every job already queued before joining.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, warn};

use super::error::{Error, ErrorKind};

pub const DEFAULT_WORKER_CAPACITY: usize = 256;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Worker {
    name: String,
    sender: Mutex<Option<SyncSender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Worker {
    pub fn spawn(name: impl Into<String>, capacity: usize) -> Result<Self, Error> {
        let name = name.into();
        let (tx, rx) = mpsc::sync_channel::<Job>(capacity.max(1));
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    // Keep the queue alive if a raw job panics.
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!(worker = %thread_name, "worker job panicked");
                    }
                }
                debug!(worker = %thread_name, "worker queue drained");
            })
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to spawn worker thread")
                    .with_source(err)
            })?;
        let thread_id = handle.thread().id();
        Ok(Self {
            name,
            sender: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), Error> {
        let guard = self.sender.lock().map_err(|_| poisoned())?;
        let sender = guard.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Closed).with_message("worker queue is shut down")
        })?;
        sender.try_send(Box::new(job)).map_err(|err| match err {
            TrySendError::Full(_) => {
                Error::new(ErrorKind::Busy).with_message("worker queue is full")
            }
            TrySendError::Disconnected(_) => {
                Error::new(ErrorKind::Closed).with_message("worker thread has exited")
            }
        })
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Stops accepting jobs, drains the queue, and joins the thread.
    pub fn shutdown(&self) -> Result<(), Error> {
        let sender = self.sender.lock().map_err(|_| poisoned())?.take();
        drop(sender);
        let handle = self.thread.lock().map_err(|_| poisoned())?.take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("worker cannot be joined from its own thread"));
            }
            handle.join().map_err(|_| {
                Error::new(ErrorKind::Internal).with_message("worker thread panicked")
            })?;
        }
        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, worker = %self.name, "worker shutdown failed");
        }
    }
}

fn poisoned() -> Error {
    Error::new(ErrorKind::Internal).with_message("worker lock poisoned")
}
