//! Platform helpers for pypack: application directories, command window
//! handling, host detection, and the per-OS installer capability.

mod commands;
mod host;
pub mod installer;
mod paths;

pub use commands::{HideWindow, background_command};
pub use host::{HostPlatform, OsFamily};
pub use installer::{InstallerPlatform, LaunchOutcome, installer_for};
pub use paths::{AppPaths, AppPathsError, HOME_ENV};
