use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use pypack_core::check_for_update;
use pypack_pip::{InstalledPackage, RuntimeProbe, sort_by_name};

use super::{BackgroundTask, TaskContext, TaskKind};
use crate::async_helpers::run_with_timeout;
use crate::error::AppError;

const OPERATION: &str = "Environment scan";

/// Snapshot of the local runtime, delivered in one piece when the scan
/// completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    pub runtime_version: String,
    pub runtime_implementation: String,
    pub executable_path: PathBuf,
    pub install_path: PathBuf,
    /// pip's version, or a note explaining why it is unknown.
    pub package_manager_version: String,
    pub installed_packages: Vec<InstalledPackage>,
    pub packages_error: Option<String>,
    pub update_available: bool,
    pub latest_version: Option<String>,
    pub release_notes: Option<String>,
    pub update_error: Option<String>,
}

pub struct EnvironmentInfoTask {
    probe: Arc<dyn RuntimeProbe>,
    http_client: reqwest::Client,
    feed_url: String,
    feed_timeout: Duration,
}

impl EnvironmentInfoTask {
    pub fn new(
        probe: Arc<dyn RuntimeProbe>,
        http_client: reqwest::Client,
        feed_url: impl Into<String>,
        feed_timeout: Duration,
    ) -> Self {
        Self {
            probe,
            http_client,
            feed_url: feed_url.into(),
            feed_timeout,
        }
    }
}

#[async_trait]
impl BackgroundTask for EnvironmentInfoTask {
    type Output = EnvironmentInfo;

    fn kind(&self) -> TaskKind {
        TaskKind::EnvironmentInfo
    }

    async fn run(self, ctx: &TaskContext<EnvironmentInfo>) -> Result<EnvironmentInfo, AppError> {
        ctx.progress(10, "Reading runtime information");
        let runtime = ctx
            .until_cancelled(OPERATION, self.probe.runtime_info())
            .await?
            .map_err(AppError::environment_unavailable)?;
        info!(
            "Found {} {} at {}",
            runtime.implementation,
            runtime.version,
            runtime.executable.display()
        );

        ctx.progress(30, "Checking pip version");
        let package_manager_version = match ctx
            .until_cancelled(OPERATION, self.probe.pip_version())
            .await?
        {
            Ok(version) => version,
            Err(error) => {
                debug!("pip version unavailable: {error}");
                format!("Unknown ({error})")
            }
        };

        ctx.progress(50, "Listing installed packages");
        let (installed_packages, packages_error) = match ctx
            .until_cancelled(OPERATION, self.probe.list_installed())
            .await?
        {
            Ok(mut packages) => {
                sort_by_name(&mut packages);
                (packages, None)
            }
            Err(error) => {
                debug!("Package listing failed: {error}");
                (Vec::new(), Some(error.to_string()))
            }
        };

        ctx.progress(75, "Checking for runtime updates");
        let check = run_with_timeout(
            self.feed_timeout,
            "Runtime update check",
            check_for_update(&self.http_client, &self.feed_url, &runtime.version),
            |error| AppError::update_check_failed("Runtime", error),
        );
        let (update_available, latest_version, release_notes, update_error) =
            match ctx.until_cancelled(OPERATION, check).await? {
                Ok(Some(update)) => (
                    true,
                    Some(update.latest_version),
                    Some(update.release_notes),
                    None,
                ),
                Ok(None) => (false, None, None, None),
                Err(error) => {
                    debug!("{error}");
                    (false, None, None, Some(error.to_string()))
                }
            };

        ctx.progress(100, "Environment ready");
        Ok(EnvironmentInfo {
            runtime_version: runtime.version.clone(),
            runtime_implementation: runtime.implementation.clone(),
            install_path: runtime.install_dir(),
            executable_path: runtime.executable,
            package_manager_version,
            installed_packages,
            packages_error,
            update_available,
            latest_version,
            release_notes,
            update_error,
        })
    }
}
