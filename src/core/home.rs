//! Purpose: Serialize outcome delivery onto the thread that owns UI state.
//! Exports: `HomeLoop`, `HomeHandle`.
//! Role: Mutex-guarded task queue plus a wake signal, drained cooperatively.
//! Invariants: Tasks only ever run on the thread that created the `HomeLoop`.
//! Invariants: Tasks run one at a time in post order; none run after `close`.
//! Invariants: Posting after close fails for that task only.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{error, warn};

use super::error::{Error, ErrorKind};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct State {
    queue: VecDeque<Task>,
    open: bool,
    stop_requested: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking task never holds this lock, so poisoning is recoverable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cheap, thread-safe handle used to enqueue work for the home thread.
#[derive(Clone)]
pub struct HomeHandle {
    shared: Arc<Shared>,
    thread_id: ThreadId,
}

impl HomeHandle {
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if !state.open {
            return Err(Error::new(ErrorKind::Closed)
                .with_message("home thread is not accepting work"));
        }
        state.queue.push_back(Box::new(task));
        drop(state);
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn is_home_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Asks `HomeLoop::run` to return once the queue is empty.
    pub fn request_stop(&self) {
        self.shared.lock().stop_requested = true;
        self.shared.wake.notify_all();
    }
}

/// The receiving end, bound to the thread that created it.
pub struct HomeLoop {
    shared: Arc<Shared>,
    thread_id: ThreadId,
    // Not Send: the loop must stay on its home thread.
    _not_send: PhantomData<*const ()>,
}

impl HomeLoop {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    open: true,
                    stop_requested: false,
                }),
                wake: Condvar::new(),
            }),
            thread_id: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    pub fn handle(&self) -> HomeHandle {
        HomeHandle {
            shared: Arc::clone(&self.shared),
            thread_id: self.thread_id,
        }
    }

    /// Runs every task queued right now without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<Task> = self.shared.lock().queue.drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            run_task(task);
        }
        count
    }

    /// Blocks up to `timeout` for work, then drains the queue.
    pub fn wait_and_run(&self, timeout: Duration) -> usize {
        {
            let state = self.shared.lock();
            if state.queue.is_empty() && !state.stop_requested {
                let _ = self
                    .shared
                    .wake
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        }
        self.run_pending()
    }

    /// Drains tasks until `HomeHandle::request_stop` is called and the queue is empty.
    pub fn run(&self) {
        loop {
            let task = {
                let mut state = self.shared.lock();
                loop {
                    if let Some(task) = state.queue.pop_front() {
                        break Some(task);
                    }
                    if state.stop_requested {
                        break None;
                    }
                    state = self
                        .shared
                        .wake
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            };
            match task {
                Some(task) => run_task(task),
                None => break,
            }
        }
        self.shared.lock().stop_requested = false;
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Stops accepting posts and discards anything still queued.
    ///
    /// Discarded tasks are dropped after the lock is released, since dropping
    /// one may try to post again.
    pub fn close(&self) -> usize {
        let discarded: Vec<Task> = {
            let mut state = self.shared.lock();
            state.open = false;
            state.queue.drain(..).collect()
        };
        let dropped = discarded.len();
        if dropped > 0 {
            error!(dropped, "home loop closed with undelivered tasks");
        }
        drop(discarded);
        dropped
    }
}

impl Default for HomeLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HomeLoop {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_task(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        warn!("home task panicked");
    }
}
