//! Purpose: Assemble the `methods` channel from its parts and own its lifecycle.
//! Exports: `Bridge`, `BridgeConfig`, `standard_registry`, `CHANNEL_NAME`, `method`.
//! Role: Composition root used by the CLI, transports, and embedding hosts.
//! Invariants: The capability set is fixed once `Bridge::start` returns.
//! Invariants: Path resolution runs on the worker; wake-flag writes run on the home thread.
//! Invariants: `shutdown` drains queued worker calls before returning.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::core::dispatch::Dispatcher;
use crate::core::error::{Error, ErrorKind};
use crate::core::home::HomeLoop;
use crate::core::outcome::{Call, Callback, Reply};
use crate::core::registry::{Placement, Registry};
use crate::core::value::Value;
use crate::core::worker::{DEFAULT_WORKER_CAPACITY, Worker};
use crate::paths::{DesktopDirs, PathResolver, PlatformDirs, RootKind};
use crate::screen::{ScreenWake, WakeFlag};

pub const CHANNEL_NAME: &str = "methods";

const WORKER_THREAD_NAME: &str = "hostbridge-worker";

/// Call names recognized on the `methods` channel.
pub mod method {
    pub const DATA_ROOT: &str = "dataRoot";
    pub const DOCUMENT_ROOT: &str = "documentRoot";
    pub const GET_KEEP_SCREEN_ON: &str = "getKeepScreenOn";
    pub const SET_KEEP_SCREEN_ON: &str = "setKeepScreenOn";
}

#[derive(Clone)]
pub struct BridgeConfig {
    platform: Arc<dyn PlatformDirs>,
    marker: Option<PathBuf>,
    screen: Arc<dyn ScreenWake>,
    worker_capacity: usize,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self {
            platform: Arc::new(DesktopDirs),
            marker: None,
            screen: Arc::new(WakeFlag::default()),
            worker_capacity: DEFAULT_WORKER_CAPACITY,
        }
    }

    pub fn with_platform(mut self, platform: Arc<dyn PlatformDirs>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_marker_path(mut self, marker: impl Into<PathBuf>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_screen(mut self, screen: Arc<dyn ScreenWake>) -> Self {
        self.screen = screen;
        self
    }

    pub fn with_keep_screen_on(self, on: bool) -> Self {
        self.with_screen(Arc::new(WakeFlag::new(on)))
    }

    pub fn with_worker_capacity(mut self, capacity: usize) -> Self {
        self.worker_capacity = capacity;
        self
    }

    pub fn resolver(&self) -> PathResolver {
        let resolver = PathResolver::new(Arc::clone(&self.platform));
        match &self.marker {
            Some(marker) => resolver.with_marker_path(marker),
            None => resolver,
        }
    }

    pub fn screen(&self) -> Arc<dyn ScreenWake> {
        Arc::clone(&self.screen)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("marker", &self.marker)
            .field("worker_capacity", &self.worker_capacity)
            .finish_non_exhaustive()
    }
}

pub fn standard_registry(
    resolver: PathResolver,
    screen: Arc<dyn ScreenWake>,
) -> Result<Registry, Error> {
    let data_resolver = resolver.clone();
    let documents_resolver = resolver;
    let reader = Arc::clone(&screen);
    let writer = screen;

    let registry = Registry::builder()
        .register(method::DATA_ROOT, Placement::Worker, move |_| {
            Ok(Value::Str(data_resolver.resolve_string(RootKind::Data)))
        })?
        .register(method::DOCUMENT_ROOT, Placement::Worker, move |_| {
            Ok(Value::Str(documents_resolver.resolve_string(RootKind::Documents)))
        })?
        .register(method::GET_KEEP_SCREEN_ON, Placement::Inline, move |_| {
            Ok(Value::Bool(reader.keep_screen_on()))
        })?
        .register(method::SET_KEEP_SCREEN_ON, Placement::Home, move |argument| {
            match argument.as_bool() {
                Some(on) => writer.set_keep_screen_on(on),
                None => warn!(
                    argument = argument.type_name(),
                    "setKeepScreenOn ignored non-boolean argument"
                ),
            }
            Ok(Value::Absent)
        })?
        .build();
    Ok(registry)
}

pub struct Bridge {
    dispatcher: Dispatcher,
    worker: Arc<Worker>,
}

impl Bridge {
    /// Builds the registry and spawns the worker. Outcomes are delivered to `home`.
    pub fn start(config: BridgeConfig, home: &HomeLoop) -> Result<Self, Error> {
        let registry = standard_registry(config.resolver(), config.screen())?;
        let worker = Arc::new(Worker::spawn(WORKER_THREAD_NAME, config.worker_capacity)?);
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::clone(&worker), home.handle());
        info!(channel = CHANNEL_NAME, "bridge started");
        Ok(Self { dispatcher, worker })
    }

    pub fn channel_name(&self) -> &'static str {
        CHANNEL_NAME
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    pub fn dispatch(&self, call: Call, callback: Callback) {
        self.dispatcher.dispatch(call, callback);
    }

    /// Dispatches one call and pumps `home` until its reply arrives.
    pub fn call_blocking(
        &self,
        home: &HomeLoop,
        call: Call,
        timeout: Duration,
    ) -> Result<Reply, Error> {
        let name = call.name.clone();
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            call,
            Box::new(move |reply| {
                let _ = tx.send(reply);
            }),
        );

        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(reply) = rx.try_recv() {
                return Ok(reply);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::new(ErrorKind::Busy)
                    .with_message(format!("timed out waiting for {name}")));
            }
            home.wait_and_run((deadline - now).min(Duration::from_millis(10)));
        }
    }

    pub fn shutdown(&self) -> Result<(), Error> {
        self.worker.shutdown()?;
        info!(channel = CHANNEL_NAME, "bridge stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{FixedDirs, MARKER_FILE_NAME};
    use std::fs;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config(temp: &tempfile::TempDir) -> BridgeConfig {
        let data = temp.path().join("data");
        let documents = temp.path().join("documents");
        fs::create_dir_all(&data).expect("data");
        fs::create_dir_all(&documents).expect("documents");
        BridgeConfig::new().with_platform(Arc::new(FixedDirs::new(data, documents)))
    }

    #[test]
    fn standard_registry_has_expected_placements() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config(&temp);
        let registry = standard_registry(config.resolver(), config.screen()).expect("registry");

        let placements: Vec<(&str, Placement)> = registry
            .iter()
            .map(|capability| (capability.name(), capability.placement()))
            .collect();
        assert_eq!(
            placements,
            vec![
                (method::DATA_ROOT, Placement::Worker),
                (method::DOCUMENT_ROOT, Placement::Worker),
                (method::GET_KEEP_SCREEN_ON, Placement::Inline),
                (method::SET_KEEP_SCREEN_ON, Placement::Home),
            ]
        );
    }

    #[test]
    fn data_root_follows_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config(&temp);
        let custom = temp.path().join("customroot");
        fs::create_dir_all(&custom).expect("custom");
        fs::write(
            temp.path().join("data").join(MARKER_FILE_NAME),
            custom.to_str().unwrap(),
        )
        .expect("marker");

        let home = HomeLoop::new();
        let bridge = Bridge::start(config, &home).expect("start");
        let reply = bridge
            .call_blocking(&home, Call::new(method::DATA_ROOT), TIMEOUT)
            .expect("reply");
        assert_eq!(
            reply,
            Reply::Success(Value::Str(custom.to_string_lossy().into_owned()))
        );
        bridge.shutdown().expect("shutdown");
    }

    #[test]
    fn documents_root_is_platform_documents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let home = HomeLoop::new();
        let bridge = Bridge::start(config(&temp), &home).expect("start");
        let reply = bridge
            .call_blocking(&home, Call::new(method::DOCUMENT_ROOT), TIMEOUT)
            .expect("reply");
        let expected = temp.path().join("documents");
        assert_eq!(
            reply,
            Reply::Success(Value::Str(expected.to_string_lossy().into_owned()))
        );
    }

    #[test]
    fn keep_screen_on_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let home = HomeLoop::new();
        let bridge = Bridge::start(config(&temp), &home).expect("start");

        for on in [true, false, true] {
            let set = bridge
                .call_blocking(
                    &home,
                    Call::new(method::SET_KEEP_SCREEN_ON).with_argument(on),
                    TIMEOUT,
                )
                .expect("set");
            assert_eq!(set, Reply::Success(Value::Absent));

            let get = bridge
                .call_blocking(&home, Call::new(method::GET_KEEP_SCREEN_ON), TIMEOUT)
                .expect("get");
            assert_eq!(get, Reply::Success(Value::Bool(on)));
        }
    }

    #[test]
    fn non_boolean_set_is_acknowledged_without_change() {
        let temp = tempfile::tempdir().expect("tempdir");
        let home = HomeLoop::new();
        let bridge =
            Bridge::start(config(&temp).with_keep_screen_on(true), &home).expect("start");

        let set = bridge
            .call_blocking(
                &home,
                Call::new(method::SET_KEEP_SCREEN_ON).with_argument("yes"),
                TIMEOUT,
            )
            .expect("set");
        assert_eq!(set, Reply::Success(Value::Absent));

        let get = bridge
            .call_blocking(&home, Call::new(method::GET_KEEP_SCREEN_ON), TIMEOUT)
            .expect("get");
        assert_eq!(get, Reply::Success(Value::Bool(true)));
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let temp = tempfile::tempdir().expect("tempdir");
        let home = HomeLoop::new();
        let bridge = Bridge::start(config(&temp), &home).expect("start");
        let reply = bridge
            .call_blocking(&home, Call::new("vibrate").with_argument(3i64), TIMEOUT)
            .expect("reply");
        assert_eq!(reply, Reply::NotImplemented);
        assert_eq!(bridge.channel_name(), "methods");
    }

    #[test]
    fn calls_after_shutdown_fail_instead_of_hanging() {
        let temp = tempfile::tempdir().expect("tempdir");
        let home = HomeLoop::new();
        let bridge = Bridge::start(config(&temp), &home).expect("start");
        bridge.shutdown().expect("shutdown");

        let reply = bridge
            .call_blocking(&home, Call::new(method::DATA_ROOT), TIMEOUT)
            .expect("reply");
        assert!(reply.is_error());

        let reply = bridge
            .call_blocking(&home, Call::new(method::GET_KEEP_SCREEN_ON), TIMEOUT)
            .expect("reply");
        assert_eq!(reply, Reply::Success(Value::Bool(false)));
    }
}
