//! Purpose: Resolve the data and documents roots handed to the UI.
//! Exports: `RootKind`, `PlatformDirs`, `DesktopDirs`, `FixedDirs`, `PathResolver`.
//! Role: Leaf of the bridge; the only code that touches the override marker file.
//! Invariants: Resolution never fails; marker read errors mean "no marker".
//! Invariants: A marker wins only when its trimmed content names an existing directory.
//! Invariants: Default data root is `~/.opensource/wild` on Linux.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

/// File inside the standard data root whose content redirects the data root.
pub const MARKER_FILE_NAME: &str = "data.local";

const ORGANIZATION: &str = "opensource";
const APPLICATION: &str = "wild";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RootKind {
    Data,
    Documents,
}

impl RootKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RootKind::Data => "data-root",
            RootKind::Documents => "documents-root",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform-provided directory constants.
pub trait PlatformDirs: Send + Sync {
    fn standard_data_root(&self) -> PathBuf;
    fn standard_documents_root(&self) -> PathBuf;
}

/// Per-user directories for desktop targets.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopDirs;

impl DesktopDirs {
    fn home() -> PathBuf {
        dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_default()
    }
}

impl PlatformDirs for DesktopDirs {
    #[cfg(target_os = "macos")]
    fn standard_data_root(&self) -> PathBuf {
        Self::home()
            .join("Library")
            .join("Application Support")
            .join(ORGANIZATION)
            .join(APPLICATION)
    }

    #[cfg(target_os = "windows")]
    fn standard_data_root(&self) -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default()
            .join("data")
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn standard_data_root(&self) -> PathBuf {
        Self::home()
            .join(format!(".{ORGANIZATION}"))
            .join(APPLICATION)
    }

    fn standard_documents_root(&self) -> PathBuf {
        dirs::document_dir().unwrap_or_else(|| Self::home().join("Documents"))
    }
}

/// Explicit roots, used for configuration overrides and tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FixedDirs {
    data: PathBuf,
    documents: PathBuf,
}

impl FixedDirs {
    pub fn new(data: impl Into<PathBuf>, documents: impl Into<PathBuf>) -> Self {
        Self {
            data: data.into(),
            documents: documents.into(),
        }
    }
}

impl PlatformDirs for FixedDirs {
    fn standard_data_root(&self) -> PathBuf {
        self.data.clone()
    }

    fn standard_documents_root(&self) -> PathBuf {
        self.documents.clone()
    }
}

#[derive(Clone)]
pub struct PathResolver {
    platform: Arc<dyn PlatformDirs>,
    marker: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(platform: Arc<dyn PlatformDirs>) -> Self {
        Self {
            platform,
            marker: None,
        }
    }

    pub fn with_marker_path(mut self, marker: impl Into<PathBuf>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn marker_path(&self) -> PathBuf {
        self.marker
            .clone()
            .unwrap_or_else(|| self.platform.standard_data_root().join(MARKER_FILE_NAME))
    }

    pub fn resolve(&self, kind: RootKind) -> PathBuf {
        match kind {
            RootKind::Documents => self.platform.standard_documents_root(),
            RootKind::Data => self
                .read_override()
                .unwrap_or_else(|| self.platform.standard_data_root()),
        }
    }

    pub fn resolve_string(&self, kind: RootKind) -> String {
        self.resolve(kind).to_string_lossy().into_owned()
    }

    fn read_override(&self) -> Option<PathBuf> {
        let marker = self.marker_path();
        let bytes = match fs::read(&marker) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(marker = %marker.display(), error = %err, "ignoring unreadable marker");
                return None;
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        let candidate = content.trim();
        if candidate.is_empty() {
            return None;
        }
        let candidate = Path::new(candidate);
        if candidate.is_dir() {
            debug!(root = %candidate.display(), "data root overridden by marker");
            Some(candidate.to_path_buf())
        } else {
            warn!(
                marker = %marker.display(),
                candidate = %candidate.display(),
                "marker does not name a directory"
            );
            None
        }
    }
}

impl fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathResolver")
            .field("marker", &self.marker_path())
            .finish_non_exhaustive()
    }
}
