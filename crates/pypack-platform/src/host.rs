use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl OsFamily {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "windows" => Self::Windows,
            "macos" => Self::MacOs,
            "linux" => Self::Linux,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
            Self::Other => "Unknown OS",
        }
    }
}

/// Operating system family and CPU architecture of a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: OsFamily,
    pub arch: String,
}

impl HostPlatform {
    #[must_use]
    pub fn new(os: OsFamily, arch: impl Into<String>) -> Self {
        Self {
            os,
            arch: arch.into(),
        }
    }

    #[must_use]
    pub fn current() -> Self {
        Self::new(
            OsFamily::from_name(std::env::consts::OS),
            std::env::consts::ARCH,
        )
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.os.display_name(), self.arch)
    }
}
