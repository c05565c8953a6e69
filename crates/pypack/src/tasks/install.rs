use std::sync::Arc;

use async_trait::async_trait;
use pypack_pip::PackageInstaller;

use super::{BackgroundTask, TaskContext, TaskKind};
use crate::error::AppError;

const OPERATION: &str = "Package install";

/// Hands one package off to pip. Cancelling drops the child process.
pub struct PackageInstallTask {
    installer: Arc<dyn PackageInstaller>,
    name: String,
    version: Option<String>,
}

impl PackageInstallTask {
    pub fn new(
        installer: Arc<dyn PackageInstaller>,
        name: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            installer,
            name: name.into(),
            version,
        }
    }
}

#[async_trait]
impl BackgroundTask for PackageInstallTask {
    type Output = String;

    fn kind(&self) -> TaskKind {
        TaskKind::PackageInstall
    }

    async fn run(self, ctx: &TaskContext<String>) -> Result<String, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::message("A package name is required"));
        }
        let version = self
            .version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty());

        let target = match version {
            Some(version) => format!("{name} {version}"),
            None => name.to_string(),
        };
        ctx.progress(10, format!("Installing {target}..."));

        let output = ctx
            .until_cancelled(OPERATION, self.installer.install_package(name, version))
            .await?
            .map_err(|error| AppError::operation_failed(OPERATION, error))?;

        ctx.progress(100, format!("Installed {target}"));
        Ok(output)
    }
}
