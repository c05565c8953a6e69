use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::{BackgroundTask, TaskContext, TaskEvent, TaskHandle, TaskKind};

pub enum StartOutcome<T> {
    Started(TaskHandle<T>),
    AlreadyRunning(TaskKind),
}

impl<T> StartOutcome<T> {
    pub fn started(self) -> Option<TaskHandle<T>> {
        match self {
            Self::Started(handle) => Some(handle),
            Self::AlreadyRunning(_) => None,
        }
    }
}

/// Spawns tasks onto a tokio runtime, allowing at most one in-flight run per
/// [`TaskKind`].
#[derive(Clone)]
pub struct TaskRunner {
    runtime: Handle,
    in_flight: Arc<Mutex<HashSet<TaskKind>>>,
}

struct SlotGuard {
    kind: TaskKind,
    in_flight: Arc<Mutex<HashSet<TaskKind>>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}

impl TaskRunner {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }

    /// Start `task` unless a task of the same kind is still running, in
    /// which case this is a no-op.
    pub fn try_start<J: BackgroundTask>(&self, task: J) -> StartOutcome<J::Output> {
        let kind = task.kind();
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        if !inserted {
            debug!("{} already running, ignoring start", kind.label());
            return StartOutcome::AlreadyRunning(kind);
        }

        let guard = SlotGuard {
            kind,
            in_flight: Arc::clone(&self.in_flight),
        };
        let (sender, receiver) = crossbeam_channel::unbounded();
        let cancel = CancellationToken::new();
        let ctx = TaskContext::new(sender, cancel.clone());

        self.runtime.spawn(async move {
            info!("{} started", kind.label());
            let outcome = AssertUnwindSafe(task.run(&ctx)).catch_unwind().await;
            let terminal = match outcome {
                Ok(Ok(output)) => {
                    info!("{} finished", kind.label());
                    TaskEvent::Result(output)
                }
                Ok(Err(error)) if error.is_cancelled() => {
                    info!("{} cancelled", kind.label());
                    TaskEvent::Cancelled
                }
                Ok(Err(error)) => {
                    warn!("{} failed: {error}", kind.label());
                    TaskEvent::Error(error.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("{} panicked: {message}", kind.label());
                    TaskEvent::Error(format!("{} failed unexpectedly: {message}", kind.label()))
                }
            };

            // A caller reacting to the terminal event may start the next run.
            drop(guard);
            ctx.finish(terminal);
        });

        StartOutcome::Started(TaskHandle::new(kind, receiver, cancel))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{StartOutcome, TaskRunner};
    use crate::error::AppError;
    use crate::tasks::test_support::{drain, test_runtime};
    use crate::tasks::{BackgroundTask, TaskContext, TaskEvent, TaskKind};

    struct Scripted {
        steps: Vec<u8>,
        outcome: Result<&'static str, AppError>,
    }

    #[async_trait]
    impl BackgroundTask for Scripted {
        type Output = &'static str;

        fn kind(&self) -> TaskKind {
            TaskKind::Trending
        }

        async fn run(self, ctx: &TaskContext<&'static str>) -> Result<&'static str, AppError> {
            for step in self.steps {
                ctx.progress(step, format!("step {step}"));
                tokio::task::yield_now().await;
            }
            self.outcome
        }
    }

    struct UntilCancelled;

    #[async_trait]
    impl BackgroundTask for UntilCancelled {
        type Output = ();

        fn kind(&self) -> TaskKind {
            TaskKind::Search
        }

        async fn run(self, ctx: &TaskContext<()>) -> Result<(), AppError> {
            ctx.progress(1, "waiting");
            ctx.until_cancelled("Waiting", std::future::pending::<()>())
                .await
        }
    }

    struct Panicking;

    #[async_trait]
    impl BackgroundTask for Panicking {
        type Output = ();

        fn kind(&self) -> TaskKind {
            TaskKind::Recent
        }

        async fn run(self, _ctx: &TaskContext<()>) -> Result<(), AppError> {
            panic!("registry exploded");
        }
    }

    #[test]
    fn result_is_the_single_terminal_event_after_all_progress() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let handle = runner
            .try_start(Scripted {
                steps: vec![10, 50, 90],
                outcome: Ok("done"),
            })
            .started()
            .expect("idle runner should start the task");
        let events = drain(&handle);

        assert_eq!(events.len(), 4);
        assert!(events[..3].iter().all(|event| !event.is_terminal()));
        assert_eq!(events[3], TaskEvent::Result("done"));
    }

    #[test]
    fn error_outcome_is_reported_once() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let handle = runner
            .try_start(Scripted {
                steps: vec![20],
                outcome: Err(AppError::operation_failed("Trending packages", "boom")),
            })
            .started()
            .expect("idle runner should start the task");
        let events = drain(&handle);

        let terminals: Vec<_> = events.iter().filter(|event| event.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        assert_eq!(
            events.last(),
            Some(&TaskEvent::Error(
                "Trending packages failed: boom".to_string()
            ))
        );
    }

    #[test]
    fn progress_percent_is_clamped() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let handle = runner
            .try_start(Scripted {
                steps: vec![250],
                outcome: Ok("done"),
            })
            .started()
            .expect("idle runner should start the task");
        let events = drain(&handle);

        assert!(matches!(
            events[0],
            TaskEvent::Progress { percent: 100, .. }
        ));
    }

    #[test]
    fn second_start_of_same_kind_is_a_no_op_while_running() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let first = runner
            .try_start(UntilCancelled)
            .started()
            .expect("idle runner should start the task");
        assert!(runner.is_running(TaskKind::Search));
        assert!(matches!(
            runner.try_start(UntilCancelled),
            StartOutcome::AlreadyRunning(TaskKind::Search)
        ));

        first.cancel();
        let events = drain(&first);
        assert_eq!(events.last(), Some(&TaskEvent::Cancelled));
    }

    #[test]
    fn different_kinds_run_concurrently() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let search = runner
            .try_start(UntilCancelled)
            .started()
            .expect("search should start");
        let trending = runner
            .try_start(Scripted {
                steps: vec![],
                outcome: Ok("done"),
            })
            .started()
            .expect("trending should start alongside search");

        assert_eq!(drain(&trending).last(), Some(&TaskEvent::Result("done")));
        search.cancel();
        assert_eq!(drain(&search).last(), Some(&TaskEvent::Cancelled));
    }

    #[test]
    fn slot_is_free_when_terminal_event_arrives() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let handle = runner
            .try_start(UntilCancelled)
            .started()
            .expect("idle runner should start the task");
        handle.cancel();
        let events = drain(&handle);

        assert_eq!(events.last(), Some(&TaskEvent::Cancelled));
        assert!(!runner.is_running(TaskKind::Search));
        let restarted = runner
            .try_start(UntilCancelled)
            .started()
            .expect("a finished kind should start again");
        restarted.cancel();
        drain(&restarted);
    }

    #[test]
    fn cancel_handle_cancels_from_another_thread() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let handle = runner
            .try_start(UntilCancelled)
            .started()
            .expect("idle runner should start the task");
        let cancel = handle.cancel_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });

        assert_eq!(drain(&handle).last(), Some(&TaskEvent::Cancelled));
    }

    #[test]
    fn panicking_task_reports_error_and_frees_slot() {
        let runtime = test_runtime();
        let runner = TaskRunner::new(runtime.handle().clone());

        let handle = runner
            .try_start(Panicking)
            .started()
            .expect("idle runner should start the task");
        let events = drain(&handle);

        assert!(matches!(
            events.last(),
            Some(TaskEvent::Error(message)) if message.contains("registry exploded")
        ));
        assert!(!runner.is_running(TaskKind::Recent));
    }
}
