//! Per-item configuration and download-root selection.
//!
//! A [`Config`] is a plain value: the process-wide default is built once at
//! startup and every queue item clones its own copy, so an item that narrows
//! its download folder after metadata resolves never affects its siblings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Name of the default download folder under the user's home directory.
pub const DOWNLOADS_DIR_NAME: &str = "Downloads";

/// Errors produced while establishing the download root.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `HOME` nor `USERPROFILE` is set.
    #[error("cannot determine home directory (HOME/USERPROFILE unset)")]
    NoHomeDirectory,

    /// The default download root could not be created.
    #[error("cannot create download folder {path}: {source}")]
    CreateRoot {
        /// Folder that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration carried by each queue item and copied into each task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    /// Folder downloads are written under.
    ///
    /// Starts as the process-wide root; narrowed to `<root>/<title>` once an
    /// item's metadata resolves.
    pub download_root: PathBuf,
    /// Raw extra engine flags supplied by the user.
    pub extra_engine_args: Option<Vec<String>>,
    /// Sidecar metadata record, known once metadata resolves.
    pub info_record_path: Option<PathBuf>,
}

impl Config {
    /// Creates a configuration rooted at `download_root` with no extra flags.
    #[must_use]
    pub fn new(download_root: impl Into<PathBuf>) -> Self {
        Self {
            download_root: download_root.into(),
            extra_engine_args: None,
            info_record_path: None,
        }
    }

    /// Sets the extra engine flags. An empty list is stored as `None`.
    #[must_use]
    pub fn with_extra_engine_args(mut self, args: Vec<String>) -> Self {
        self.extra_engine_args = if args.is_empty() { None } else { Some(args) };
        self
    }
}

/// Returns the user's home directory from the environment.
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .filter(|value| !value.is_empty())
        .or_else(|| env::var_os("USERPROFILE").filter(|value| !value.is_empty()))
        .map(PathBuf::from)
}

/// Returns `~/Downloads`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDirectory`] if the home directory is unknown.
pub fn default_download_root() -> Result<PathBuf, ConfigError> {
    home_dir()
        .map(|home| home.join(DOWNLOADS_DIR_NAME))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// Creates `root` if it does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::CreateRoot`] when the folder cannot be created.
pub fn ensure_download_root(root: &Path) -> Result<(), ConfigError> {
    if root.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(root).map_err(|source| ConfigError::CreateRoot {
        path: root.to_path_buf(),
        source,
    })?;
    debug!(path = %root.display(), "Created download folder");
    Ok(())
}

/// Picks the download root for this run.
///
/// A user-requested folder is honoured only when it already exists as a
/// directory. Anything else falls back to `default_root`, which is only
/// consulted in that case.
///
/// # Errors
///
/// Returns the error of `default_root` when the fallback is needed and
/// cannot be determined.
pub fn resolve_download_root<F>(
    requested: Option<&Path>,
    default_root: F,
) -> Result<PathBuf, ConfigError>
where
    F: FnOnce() -> Result<PathBuf, ConfigError>,
{
    match requested {
        Some(path) if path.is_dir() => Ok(path.to_path_buf()),
        Some(path) => {
            let fallback = default_root()?;
            warn!(
                requested = %path.display(),
                fallback = %fallback.display(),
                "Download folder does not exist; using default"
            );
            Ok(fallback)
        }
        None => default_root(),
    }
}
