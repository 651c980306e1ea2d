// Core modules implementing call routing, threading, and error modeling.
pub mod dispatch;
pub mod error;
pub mod home;
pub mod marshal;
pub mod outcome;
pub mod registry;
pub mod value;
pub mod worker;
