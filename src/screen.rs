//! Purpose: Abstract the host "keep screen awake" switch.
//! Exports: `ScreenWake`, `WakeFlag`.
//! Role: Opaque boolean getter/setter behind the wake-lock capabilities.
//! Invariants: Writers run on the home thread; readers may run anywhere.

use std::sync::atomic::{AtomicBool, Ordering};

pub trait ScreenWake: Send + Sync {
    fn keep_screen_on(&self) -> bool;
    fn set_keep_screen_on(&self, on: bool);
}

/// In-process flag used when no display integration is attached.
#[derive(Debug, Default)]
pub struct WakeFlag {
    on: AtomicBool,
}

impl WakeFlag {
    pub fn new(on: bool) -> Self {
        Self {
            on: AtomicBool::new(on),
        }
    }
}

impl ScreenWake for WakeFlag {
    fn keep_screen_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    fn set_keep_screen_on(&self, on: bool) {
        self.on.store(on, Ordering::Release);
    }
}
