use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Facts about the interpreter itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub version: String,
    pub implementation: String,
    pub executable: PathBuf,
}

impl RuntimeInfo {
    /// Directory holding the interpreter executable.
    #[must_use]
    pub fn install_dir(&self) -> PathBuf {
        self.executable
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

impl InstalledPackage {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Sort packages by name, ignoring case.
pub fn sort_by_name(packages: &mut [InstalledPackage]) {
    packages.sort_by_cached_key(|package| package.name.to_lowercase());
}
