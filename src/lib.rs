//! Purpose: Library crate behind the `hostbridge` CLI and embedding hosts.
//! Exports: `core` (routing, threading, values, errors), `bridge`, `channel`, `paths`, `screen`.
//! Role: Host side of the `methods` channel; answers named calls from a UI.
//! Invariants: Every dispatched call answers exactly once, on the home thread.
//! Invariants: Unknown call names answer "not implemented", never an error.
pub mod bridge;
pub mod channel;
pub mod core;
pub mod paths;
pub mod screen;

pub use bridge::{Bridge, BridgeConfig, CHANNEL_NAME};
pub use core::error::{Error, ErrorKind, to_exit_code};
pub use core::home::{HomeHandle, HomeLoop};
pub use core::outcome::{Call, Callback, Outcome, Reply};
pub use core::value::Value;
pub use paths::{PathResolver, RootKind};
