//! Per-OS installer capability for runtime self-updates.
//!
//! The update pipeline resolves one [`InstallerPlatform`] up front and then
//! only talks to it for the artifact URL and the hand-off to the native
//! installer, so no step has to branch on the operating system itself.

use std::path::Path;

use log::info;

use crate::host::{HostPlatform, OsFamily};

#[cfg(windows)]
use crate::HideWindow;

/// How the native installer was handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The installer process was spawned directly.
    Started,
    /// The installer was re-invoked through an elevation prompt.
    ElevationRequested,
}

pub trait InstallerPlatform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Download URL of the installer for `version` under `base_url`.
    fn installer_url(&self, base_url: &str, version: &str) -> String;

    /// Whether launching will go through an elevation prompt first.
    fn needs_elevation(&self) -> bool {
        false
    }

    /// Hand the downloaded installer off to the operating system without
    /// waiting for the installation to finish.
    ///
    /// # Errors
    /// Returns an error when the installer process cannot be spawned.
    fn launch(&self, installer: &Path) -> std::io::Result<LaunchOutcome>;
}

/// Windows `.exe` installer, run quietly for all users.
#[derive(Debug, Clone)]
pub struct WindowsInstaller {
    arch: &'static str,
}

const WINDOWS_INSTALLER_ARGS: [&str; 6] = [
    "/quiet",
    "InstallAllUsers=1",
    "PrependPath=1",
    "Include_test=0",
    "Include_doc=0",
    "Include_launcher=1",
];

impl WindowsInstaller {
    #[must_use]
    pub fn for_arch(arch: &str) -> Self {
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            _ => "win32",
        };
        Self { arch }
    }

    #[must_use]
    pub fn arch_suffix(&self) -> &'static str {
        self.arch
    }
}

impl InstallerPlatform for WindowsInstaller {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn installer_url(&self, base_url: &str, version: &str) -> String {
        format!(
            "{}/{version}/python-{version}-{}.exe",
            base_url.trim_end_matches('/'),
            self.arch
        )
    }

    #[cfg(windows)]
    fn needs_elevation(&self) -> bool {
        !elevation::is_elevated()
    }

    #[cfg(windows)]
    fn launch(&self, installer: &Path) -> std::io::Result<LaunchOutcome> {
        if elevation::is_elevated() {
            info!("Launching installer: {}", installer.display());
            std::process::Command::new(installer)
                .args(WINDOWS_INSTALLER_ARGS)
                .hide_window()
                .spawn()?;
            Ok(LaunchOutcome::Started)
        } else {
            info!(
                "Requesting elevation for installer: {}",
                installer.display()
            );
            elevation::run_elevated(installer, &WINDOWS_INSTALLER_ARGS.join(" "))?;
            Ok(LaunchOutcome::ElevationRequested)
        }
    }

    #[cfg(not(windows))]
    fn launch(&self, installer: &Path) -> std::io::Result<LaunchOutcome> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!(
                "cannot run Windows installer {} with {} on this system",
                installer.display(),
                WINDOWS_INSTALLER_ARGS.join(" ")
            ),
        ))
    }
}

/// macOS `.pkg` installer, opened with the system Installer app.
#[derive(Debug, Clone, Default)]
pub struct MacInstaller;

impl InstallerPlatform for MacInstaller {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn installer_url(&self, base_url: &str, version: &str) -> String {
        format!(
            "{}/{version}/python-{version}-macosx10.9.pkg",
            base_url.trim_end_matches('/')
        )
    }

    fn launch(&self, installer: &Path) -> std::io::Result<LaunchOutcome> {
        info!("Opening installer package: {}", installer.display());
        open::that_detached(installer)?;
        Ok(LaunchOutcome::Started)
    }
}

/// Installer capability for `host`, or `None` when the platform has no
/// known installer scheme.
#[must_use]
pub fn installer_for(host: &HostPlatform) -> Option<Box<dyn InstallerPlatform>> {
    match host.os {
        OsFamily::Windows => Some(Box::new(WindowsInstaller::for_arch(&host.arch))),
        OsFamily::MacOs => Some(Box::new(MacInstaller)),
        OsFamily::Linux | OsFamily::Other => None,
    }
}

#[cfg(windows)]
mod elevation {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use windows_sys::Win32::UI::Shell::{IsUserAnAdmin, ShellExecuteW};
    use windows_sys::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

    fn wide(value: &OsStr) -> Vec<u16> {
        value.encode_wide().chain(Some(0)).collect()
    }

    pub(super) fn is_elevated() -> bool {
        // SAFETY: IsUserAnAdmin takes no arguments and only queries the token.
        unsafe { IsUserAnAdmin() != 0 }
    }

    pub(super) fn run_elevated(program: &Path, parameters: &str) -> std::io::Result<()> {
        let verb = wide(OsStr::new("runas"));
        let file = wide(program.as_os_str());
        let parameters = wide(OsStr::new(parameters));

        // SAFETY: every string is NUL-terminated and outlives the call.
        let result = unsafe {
            ShellExecuteW(
                std::ptr::null_mut(),
                verb.as_ptr(),
                file.as_ptr(),
                parameters.as_ptr(),
                std::ptr::null(),
                SW_SHOWNORMAL,
            )
        };

        // ShellExecuteW reports success with a value greater than 32.
        if result as isize > 32 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}
