use std::path::{Path, PathBuf};

use thiserror::Error;

const APP_DIR: &str = "pypack";

/// Environment variable that relocates every pypack directory under one
/// root, for portable or throwaway installs.
pub const HOME_ENV: &str = "PYPACK_HOME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine the {0} directory; set PYPACK_HOME instead")]
    Unavailable(&'static str),
}

/// Where pypack keeps its settings, its log and in-flight installer
/// downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Resolve directories from [`HOME_ENV`] when set, otherwise from the
    /// platform's conventional locations.
    ///
    /// # Errors
    /// Returns an error when a platform base directory cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        match std::env::var_os(HOME_ENV) {
            Some(root) if !root.is_empty() => Ok(Self::under(Path::new(&root))),
            _ => Self::platform_default(),
        }
    }

    /// Every directory nested under `root`.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            log_dir: root.join("logs"),
        }
    }

    fn platform_default() -> Result<Self, AppPathsError> {
        let base = |dir: Option<PathBuf>, kind: &'static str| {
            dir.map(|dir| dir.join(APP_DIR))
                .ok_or(AppPathsError::Unavailable(kind))
        };

        Ok(Self {
            config_dir: base(dirs::config_dir(), "config")?,
            cache_dir: base(dirs::cache_dir(), "cache")?,
            log_dir: base(log_base(), "log")?,
        })
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Root under which update tasks create their private download
    /// directories.
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("pypack.log")
    }

    /// Create the settings, log and download directories.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(self.downloads_dir())
    }
}

#[cfg(target_os = "macos")]
fn log_base() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("Library").join("Logs"))
}

#[cfg(target_os = "windows")]
fn log_base() -> Option<PathBuf> {
    dirs::data_local_dir()
}

#[cfg(all(unix, not(target_os = "macos")))]
fn log_base() -> Option<PathBuf> {
    dirs::state_dir().or_else(dirs::data_local_dir)
}
