//! Background task model.
//!
//! A task runs on the tokio runtime and talks to its caller only through a
//! [`TaskHandle`]: zero or more [`TaskEvent::Progress`] events followed by
//! exactly one terminal event. The caller polls the handle without needing
//! an async runtime and may request cooperative cancellation at any time.

mod catalog;
mod environment;
mod install;
mod runner;
mod update;

#[cfg(test)]
pub(crate) mod test_support;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

pub use catalog::{
    CandidateSource, CatalogSources, CuratedCandidates, MAX_BATCH_LOOKUPS, RecentTask, SearchTask,
    TrendingTask,
};
pub use environment::{EnvironmentInfo, EnvironmentInfoTask};
pub use install::PackageInstallTask;
pub use runner::{StartOutcome, TaskRunner};
pub use update::RuntimeUpdateTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Search,
    Recent,
    Trending,
    EnvironmentInfo,
    RuntimeUpdate,
    PackageInstall,
}

impl TaskKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Search => "Package search",
            Self::Recent => "Recent packages",
            Self::Trending => "Trending packages",
            Self::EnvironmentInfo => "Environment scan",
            Self::RuntimeUpdate => "Runtime update",
            Self::PackageInstall => "Package install",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent<T> {
    Progress { percent: u8, message: String },
    Result(T),
    Error(String),
    Cancelled,
}

impl<T> TaskEvent<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// What a running task may do: report progress and observe cancellation.
///
/// Owned by the runner; a task only ever borrows it, so nothing can be sent
/// once the terminal event has gone out.
pub struct TaskContext<T> {
    events: Sender<TaskEvent<T>>,
    cancel: CancellationToken,
}

impl<T> TaskContext<T> {
    pub(crate) fn new(events: Sender<TaskEvent<T>>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    pub fn progress(&self, percent: u8, message: impl Into<String>) {
        let _ = self.events.send(TaskEvent::Progress {
            percent: percent.min(100),
            message: message.into(),
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with [`AppError::OperationCancelled`] once cancellation has been
    /// requested.
    pub fn checkpoint(&self, operation: &'static str) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            info!("{operation} cancelled");
            return Err(AppError::operation_cancelled(operation));
        }
        Ok(())
    }

    /// Drives `future` to completion unless cancellation wins first, in which
    /// case the future is dropped.
    pub async fn until_cancelled<F>(
        &self,
        operation: &'static str,
        future: F,
    ) -> Result<F::Output, AppError>
    where
        F: Future + Send,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                info!("{operation} cancelled");
                Err(AppError::operation_cancelled(operation))
            }
            output = future => Ok(output),
        }
    }

    fn finish(self, terminal: TaskEvent<T>) {
        let _ = self.events.send(terminal);
    }
}

#[async_trait]
pub trait BackgroundTask: Send + 'static {
    type Output: Send + 'static;

    fn kind(&self) -> TaskKind;

    /// Returning [`AppError::OperationCancelled`] produces a
    /// [`TaskEvent::Cancelled`] terminal event; any other error produces
    /// [`TaskEvent::Error`].
    async fn run(self, ctx: &TaskContext<Self::Output>) -> Result<Self::Output, AppError>;
}

/// Requests cancellation of a running task. Cloneable so it can be moved
/// into a signal handler.
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

/// The caller's side of a running task.
pub struct TaskHandle<T> {
    kind: TaskKind,
    events: Receiver<TaskEvent<T>>,
    cancel: CancellationToken,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        kind: TaskKind,
        events: Receiver<TaskEvent<T>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind,
            events,
            cancel,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("{} cancellation requested", self.kind.label());
            self.cancel.cancel();
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Waits up to `timeout` for the next event. `None` means nothing
    /// arrived in time or the task has already delivered its terminal event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<TaskEvent<T>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Blocking iterator over the remaining events; ends after the terminal
    /// event.
    pub fn events(&self) -> crossbeam_channel::Iter<'_, TaskEvent<T>> {
        self.events.iter()
    }
}
