use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use pypack_platform::background_command;
use tokio::process::Command;

use crate::error::PipError;
use crate::parse::{
    RUNTIME_INFO_SCRIPT, clean_output, parse_pip_list, parse_pip_version, parse_runtime_info,
};
use crate::types::{InstalledPackage, RuntimeInfo};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Local runtime facts needed by the environment view.
#[async_trait]
pub trait RuntimeProbe: Send + Sync {
    async fn runtime_info(&self) -> Result<RuntimeInfo, PipError>;

    async fn pip_version(&self) -> Result<String, PipError>;

    async fn list_installed(&self) -> Result<Vec<InstalledPackage>, PipError>;
}

/// Delegated package installation.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install_package(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<String, PipError>;
}

/// Runs an interpreter and its `pip` module as child processes.
#[derive(Debug, Clone)]
pub struct PipClient {
    python: PathBuf,
    timeout: Duration,
}

impl PipClient {
    #[must_use]
    pub fn new(python: PathBuf) -> Self {
        Self {
            python,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn python(&self) -> &Path {
        &self.python
    }

    fn build_command(&self, args: &[&str]) -> Command {
        let mut cmd = background_command(&self.python);
        cmd.args(args);
        cmd
    }

    async fn execute(&self, label: &'static str, args: &[&str]) -> Result<String, PipError> {
        debug!("Running {} {}", self.python.display(), args.join(" "));
        let output = tokio::time::timeout(self.timeout, self.build_command(args).output())
            .await
            .map_err(|_| PipError::Timeout {
                command: label,
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|error| {
                if error.kind() == std::io::ErrorKind::NotFound {
                    PipError::InterpreterNotFound
                } else {
                    PipError::from(error)
                }
            })?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            Ok(clean_output(&stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(PipError::CommandFailed { stderr })
        }
    }

    /// Query version, implementation and executable path of the interpreter.
    ///
    /// # Errors
    /// Returns an error if the interpreter cannot be run or prints
    /// unexpected output.
    pub async fn runtime_info(&self) -> Result<RuntimeInfo, PipError> {
        let output = self
            .execute("runtime info", &["-c", RUNTIME_INFO_SCRIPT])
            .await?;
        parse_runtime_info(&output)
    }

    /// Return the `pip --version` line.
    ///
    /// # Errors
    /// Returns an error if `pip` is unavailable for this interpreter.
    pub async fn pip_version(&self) -> Result<String, PipError> {
        let output = self.execute("pip --version", &["-m", "pip", "--version"]).await?;
        parse_pip_version(&output)
    }

    /// List installed distributions.
    ///
    /// # Errors
    /// Returns an error if invoking `pip list` fails.
    pub async fn list_installed(&self) -> Result<Vec<InstalledPackage>, PipError> {
        let output = self
            .execute("pip list", &["-m", "pip", "list", "--format=json"])
            .await?;
        Ok(parse_pip_list(&output))
    }

    /// Install a package, optionally pinned to `version`, and return pip's
    /// output.
    ///
    /// # Errors
    /// Returns an error if `pip install` fails or times out.
    pub async fn install_package(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<String, PipError> {
        let requirement = match version {
            Some(version) => format!("{name}=={version}"),
            None => name.to_string(),
        };
        info!("Installing {requirement}");
        self.execute(
            "pip install",
            &["-m", "pip", "install", "--disable-pip-version-check", &requirement],
        )
        .await
    }
}

#[async_trait]
impl RuntimeProbe for PipClient {
    async fn runtime_info(&self) -> Result<RuntimeInfo, PipError> {
        PipClient::runtime_info(self).await
    }

    async fn pip_version(&self) -> Result<String, PipError> {
        PipClient::pip_version(self).await
    }

    async fn list_installed(&self) -> Result<Vec<InstalledPackage>, PipError> {
        PipClient::list_installed(self).await
    }
}

#[async_trait]
impl PackageInstaller for PipClient {
    async fn install_package(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<String, PipError> {
        PipClient::install_package(self, name, version).await
    }
}
