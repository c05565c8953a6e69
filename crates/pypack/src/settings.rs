use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pypack_core::auto_update::{DEFAULT_INSTALLER_BASE_URL, DEFAULT_MIN_INSTALLER_BYTES};
use pypack_core::{DEFAULT_FEED_URL, DEFAULT_REGISTRY_URL};
use pypack_platform::AppPaths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    #[serde(default = "default_version_feed_url")]
    pub version_feed_url: String,

    #[serde(default = "default_installer_base_url")]
    pub installer_base_url: String,

    /// Interpreter to inspect instead of the first `python3`/`python` on
    /// `PATH`.
    #[serde(default)]
    pub python_executable: Option<PathBuf>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,

    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    #[serde(default = "default_min_installer_bytes")]
    pub min_installer_bytes: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_version_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_installer_base_url() -> String {
    DEFAULT_INSTALLER_BASE_URL.to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

fn default_install_timeout() -> u64 {
    600
}

fn default_batch_limit() -> usize {
    10
}

fn default_min_installer_bytes() -> u64 {
    DEFAULT_MIN_INSTALLER_BYTES
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            version_feed_url: default_version_feed_url(),
            installer_base_url: default_installer_base_url(),
            python_executable: None,
            http_timeout_secs: default_http_timeout(),
            command_timeout_secs: default_command_timeout(),
            install_timeout_secs: default_install_timeout(),
            batch_limit: default_batch_limit(),
            min_installer_bytes: default_min_installer_bytes(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    pub fn load() -> Self {
        let Ok(paths) = AppPaths::new() else {
            return Self::default();
        };
        Self::load_from(&paths.settings_file())
    }

    /// Read settings from `path`, falling back to defaults when the file is
    /// missing or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                log::warn!("Ignoring invalid settings file {}: {error}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}
