//! Purpose: Hand a computed outcome back to the UI callback on the home thread.
//! Exports: `Marshaler`, `to_reply`.
//! Role: Last hop of every call; converts `Outcome` into the `Reply` the UI sees.
//! Invariants: A callback is consumed by value, so it can fire at most once.
//! Invariants: Callbacks fire on the home thread, never on the worker.
//! Invariants: A failed hand-off affects only the call it belongs to.

use tracing::error;

use super::error::Error;
use super::home::HomeHandle;
use super::outcome::{Callback, FAULT_CODE, Outcome, Reply};

pub fn to_reply(outcome: Outcome) -> Reply {
    match outcome {
        Outcome::Success(value) => Reply::Success(value),
        Outcome::NotImplemented => Reply::NotImplemented,
        Outcome::Failure(message) => Reply::Error {
            code: FAULT_CODE.to_string(),
            message,
        },
    }
}

#[derive(Clone)]
pub struct Marshaler {
    home: HomeHandle,
}

impl Marshaler {
    pub fn new(home: HomeHandle) -> Self {
        Self { home }
    }

    pub fn home(&self) -> &HomeHandle {
        &self.home
    }

    pub fn deliver(
        &self,
        call_name: &str,
        callback: Callback,
        outcome: Outcome,
    ) -> Result<(), Error> {
        let reply = to_reply(outcome);
        self.home.post(move || callback(reply)).inspect_err(|err| {
            error!(method = call_name, error = %err, "failed to deliver outcome");
        })
    }
}
