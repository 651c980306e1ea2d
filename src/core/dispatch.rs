//! Purpose: Route incoming calls to registered capabilities and resolve each one.
//! Exports: `Dispatcher`, `execute`.
//! Role: Fault boundary of the bridge; sits between the channel and the handlers.
//! Invariants: Unknown names resolve to `Outcome::NotImplemented`, never to an error.
//! Invariants: Handler errors and panics become `Outcome::Failure` with a message.
//! Invariants: Every dispatched call fires its callback exactly once, on the home thread.
//! Invariants: Callbacks never run re-entrantly inside `dispatch`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::error::Error;
use super::home::HomeHandle;
use super::marshal::Marshaler;
use super::outcome::{Call, Callback, Outcome};
use super::registry::{Capability, Placement, Registry};
use super::value::Value;
use super::worker::Worker;

/// Runs one capability on the current thread and normalizes its result.
pub fn execute(capability: &Capability, argument: Value) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| capability.invoke(argument))) {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(err)) => {
            warn!(method = capability.name(), error = %err, "handler failed");
            Outcome::failure(fault_message(&err))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(method = capability.name(), panic = %message, "handler panicked");
            Outcome::failure(message)
        }
    }
}

fn fault_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Owns a pending callback until the call resolves.
struct Responder {
    name: String,
    callback: Option<Callback>,
    marshaler: Marshaler,
}

impl Responder {
    fn complete(mut self, outcome: Outcome) {
        if let Some(callback) = self.callback.take() {
            let _ = self.marshaler.deliver(&self.name, callback, outcome);
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            let outcome = Outcome::failure("call dropped before completion");
            let _ = self.marshaler.deliver(&self.name, callback, outcome);
        }
    }
}

type ResponderSlot = Arc<Mutex<Option<Responder>>>;

fn take(slot: &ResponderSlot) -> Option<Responder> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    worker: Arc<Worker>,
    marshaler: Marshaler,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, worker: Arc<Worker>, home: HomeHandle) -> Self {
        Self {
            registry,
            worker,
            marshaler: Marshaler::new(home),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn home(&self) -> &HomeHandle {
        self.marshaler.home()
    }

    /// Resolves a call synchronously on the current thread, ignoring placement.
    pub fn resolve(&self, call: Call) -> Outcome {
        match self.registry.lookup(&call.name) {
            Some(capability) => execute(capability, call.argument),
            None => Outcome::NotImplemented,
        }
    }

    /// Starts a call. `callback` later fires exactly once on the home thread.
    pub fn dispatch(&self, call: Call, callback: Callback) {
        let Call { name, argument } = call;
        let capability = self.registry.lookup(&name).cloned();
        let responder = Responder {
            name: name.clone(),
            callback: Some(callback),
            marshaler: self.marshaler.clone(),
        };

        let Some(capability) = capability else {
            debug!(method = %name, "no capability registered");
            responder.complete(Outcome::NotImplemented);
            return;
        };

        let placement = capability.placement();
        debug!(method = %name, placement = placement.as_str(), "dispatch");
        match placement {
            Placement::Inline => responder.complete(execute(&capability, argument)),
            Placement::Home if self.home().is_home_thread() => {
                responder.complete(execute(&capability, argument))
            }
            Placement::Home => {
                let slot: ResponderSlot = Arc::new(Mutex::new(Some(responder)));
                let job_slot = Arc::clone(&slot);
                let posted = self.home().post(move || {
                    let outcome = execute(&capability, argument);
                    if let Some(responder) = take(&job_slot) {
                        responder.complete(outcome);
                    }
                });
                if let Err(err) = posted {
                    fail_slot(&slot, &err);
                }
            }
            Placement::Worker => {
                let slot: ResponderSlot = Arc::new(Mutex::new(Some(responder)));
                let job_slot = Arc::clone(&slot);
                let submitted = self.worker.submit(move || {
                    let outcome = execute(&capability, argument);
                    if let Some(responder) = take(&job_slot) {
                        responder.complete(outcome);
                    }
                });
                if let Err(err) = submitted {
                    fail_slot(&slot, &err);
                }
            }
        }
    }
}

fn fail_slot(slot: &ResponderSlot, err: &Error) {
    if let Some(responder) = take(slot) {
        warn!(method = %responder.name, error = %err, "call could not be scheduled");
        responder.complete(Outcome::failure(fault_message(err)));
    }
}
