use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use pypack_core::{LaunchReport, PackageRecord, RegistryClient, UpdateRequest, UpdateTaskState};
use pypack_pip::{PipClient, detect_interpreter};
use pypack_platform::{HostPlatform, InstallerPlatform, installer_for};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::error::AppError;
use crate::settings::AppSettings;
use crate::tasks::{
    CatalogSources, EnvironmentInfo, EnvironmentInfoTask, PackageInstallTask, RecentTask,
    RuntimeUpdateTask, SearchTask, StartOutcome, TaskRunner, TrendingTask,
};

/// Builds tasks from the current settings and starts them on one runner.
pub struct App {
    settings: AppSettings,
    downloads_dir: PathBuf,
    http_client: reqwest::Client,
    runner: TaskRunner,
}

impl App {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built, for example
    /// when no TLS backend is available.
    pub fn new(
        settings: AppSettings,
        downloads_dir: PathBuf,
        runtime: Handle,
    ) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .user_agent(format!("pypack/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| AppError::operation_failed("HTTP client setup", error))?;

        Ok(Self {
            settings,
            downloads_dir,
            http_client,
            runner: TaskRunner::new(runtime),
        })
    }

    pub fn catalog(&self) -> CatalogSources {
        let registry = RegistryClient::new(
            self.http_client.clone(),
            self.settings.registry_url.clone(),
        );
        CatalogSources::new(Arc::new(registry), self.settings.batch_limit)
    }

    fn pip_client(&self) -> PipClient {
        let python = detect_interpreter(self.settings.python_executable.as_deref())
            .unwrap_or_else(|| PathBuf::from("python3"));
        debug!("Using interpreter {}", python.display());
        PipClient::new(python)
    }

    pub fn start_search(&self, query: &str) -> StartOutcome<Vec<PackageRecord>> {
        self.runner.try_start(SearchTask::new(query, self.catalog()))
    }

    pub fn start_recent(&self) -> StartOutcome<Vec<PackageRecord>> {
        self.runner.try_start(RecentTask::new(self.catalog()))
    }

    pub fn start_trending(&self) -> StartOutcome<Vec<PackageRecord>> {
        self.runner.try_start(TrendingTask::new(self.catalog()))
    }

    pub fn start_environment_scan(&self) -> StartOutcome<EnvironmentInfo> {
        let probe = self.pip_client().with_timeout(self.settings.command_timeout());
        self.runner.try_start(EnvironmentInfoTask::new(
            Arc::new(probe),
            self.http_client.clone(),
            self.settings.version_feed_url.clone(),
            self.settings.http_timeout(),
        ))
    }

    pub fn start_install(&self, name: &str, version: Option<String>) -> StartOutcome<String> {
        let pip = self.pip_client().with_timeout(self.settings.install_timeout());
        self.runner.try_start(PackageInstallTask::new(Arc::new(pip), name, version))
    }

    /// Start downloading and launching the installer for `version` on this
    /// host. The receiver follows the update state machine.
    pub fn start_runtime_update(
        &self,
        version: &str,
        expected_sha256: Option<String>,
    ) -> (StartOutcome<LaunchReport>, watch::Receiver<UpdateTaskState>) {
        let mut request = UpdateRequest::new(version);
        request.base_url.clone_from(&self.settings.installer_base_url);
        request.min_installer_bytes = self.settings.min_installer_bytes;
        request.expected_sha256 = expected_sha256;

        let platform: Option<Arc<dyn InstallerPlatform>> =
            installer_for(&HostPlatform::current()).map(Arc::from);
        let (task, state) = RuntimeUpdateTask::new(
            self.http_client.clone(),
            request,
            platform,
            self.downloads_dir.clone(),
        );
        (self.runner.try_start(task), state)
    }
}
