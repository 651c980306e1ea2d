//! Purpose: Define the request/response shapes that flow through the bridge.
//! Exports: `Call`, `Outcome`, `Reply`, `Callback`, `FAULT_CODE`.
//! Role: Shared vocabulary between dispatcher, marshaler, and transports.
//! Invariants: Every `Call` resolves to exactly one `Outcome`.
//! Invariants: Failure messages are never empty.

use super::value::Value;

/// Error code attached to every fault reply. Callers only get a generic marker.
pub const FAULT_CODE: &str = "";

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub name: String,
    pub argument: Value,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: Value::Absent,
        }
    }

    pub fn with_argument(mut self, argument: impl Into<Value>) -> Self {
        self.argument = argument.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success(Value),
    NotImplemented,
    Failure(String),
}

impl Outcome {
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Outcome::Failure("handler failed".to_string())
        } else {
            Outcome::Failure(message)
        }
    }
}

/// What the UI side observes once a call completes.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Success(Value),
    NotImplemented,
    Error { code: String, message: String },
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

pub type Callback = Box<dyn FnOnce(Reply) + Send + 'static>;
