use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use pypack_core::{LaunchReport, UpdateError, UpdateRequest, UpdateTaskState, download_and_launch};
use pypack_platform::InstallerPlatform;
use tokio::sync::{mpsc, watch};

use super::{BackgroundTask, TaskContext, TaskKind};
use crate::error::AppError;

/// Download, verify and hand off a runtime installer.
///
/// The pipeline's state machine is published on a `watch` channel alongside
/// the usual task events.
pub struct RuntimeUpdateTask {
    http_client: reqwest::Client,
    request: UpdateRequest,
    platform: Option<Arc<dyn InstallerPlatform>>,
    temp_root: PathBuf,
    state: watch::Sender<UpdateTaskState>,
}

impl RuntimeUpdateTask {
    /// `platform` is `None` on systems without a supported installer; the
    /// task then fails before downloading anything.
    pub fn new(
        http_client: reqwest::Client,
        request: UpdateRequest,
        platform: Option<Arc<dyn InstallerPlatform>>,
        temp_root: PathBuf,
    ) -> (Self, watch::Receiver<UpdateTaskState>) {
        let (state, receiver) = watch::channel(UpdateTaskState::Idle);
        (
            Self {
                http_client,
                request,
                platform,
                temp_root,
                state,
            },
            receiver,
        )
    }
}

#[async_trait]
impl BackgroundTask for RuntimeUpdateTask {
    type Output = LaunchReport;

    fn kind(&self) -> TaskKind {
        TaskKind::RuntimeUpdate
    }

    async fn run(self, ctx: &TaskContext<LaunchReport>) -> Result<LaunchReport, AppError> {
        let (progress_tx, mut progress_rx) = mpsc::channel(64);

        let pipeline = download_and_launch(
            &self.http_client,
            &self.request,
            self.platform.clone(),
            &self.temp_root,
            ctx.cancellation(),
            progress_tx,
        );
        // Ends once the pipeline drops its sender, so every progress event is
        // forwarded before the outcome is reported.
        let forward = async {
            while let Some(update) = progress_rx.recv().await {
                self.state.send_replace(update.state);
                ctx.progress(update.percent, update.message);
            }
        };
        let (outcome, ()) = tokio::join!(pipeline, forward);

        match outcome {
            Ok(report) => {
                self.state.send_replace(UpdateTaskState::Completed);
                info!(
                    "Installer for Python {} launched from {}",
                    self.request.version,
                    report.installer_path.display()
                );
                Ok(report)
            }
            Err(UpdateError::Cancelled) => {
                self.state.send_replace(UpdateTaskState::Cancelled);
                Err(AppError::operation_cancelled(TaskKind::RuntimeUpdate.label()))
            }
            Err(error) => {
                self.state.send_replace(UpdateTaskState::Failed);
                Err(AppError::runtime_update_failed(error))
            }
        }
    }
}
