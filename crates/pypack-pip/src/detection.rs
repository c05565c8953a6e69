use std::path::{Path, PathBuf};

use log::debug;
use which::which;

const CANDIDATES: [&str; 2] = ["python3", "python"];

/// Locate the interpreter to inspect: an explicit override if it exists,
/// otherwise the first `python3`/`python` on `PATH`.
#[must_use]
pub fn detect_interpreter(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        debug!(
            "Configured interpreter {} does not exist, searching PATH",
            path.display()
        );
    }

    CANDIDATES.iter().find_map(|name| which(name).ok())
}
