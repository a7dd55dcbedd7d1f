//! Fan-out executor for independent per-variant sub-tasks.
//!
//! Every worker runs as its own tokio task, so a panicking or failing worker
//! never takes its siblings down. Outcomes are realigned to input order
//! regardless of completion order. On cancellation the executor returns at
//! once with what has resolved; in-flight workers keep running detached and
//! their sub-tasks stay `Running`.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// How sub-tasks are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutPolicy {
    /// All workers at once.
    Parallel,
    /// One worker at a time in index order, pausing `delay` between
    /// completions.
    Serial { delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskState {
    Pending,
    Running,
    Success,
    Failed,
}

/// One fan-out unit and, once resolved, its output or error.
#[derive(Debug, Clone)]
pub struct SubTask<R> {
    pub index: usize,
    pub state: SubTaskState,
    pub output: Option<R>,
    pub error: Option<String>,
}

impl<R> SubTask<R> {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: SubTaskState::Pending,
            output: None,
            error: None,
        }
    }

    fn resolve(&mut self, result: Result<R, String>) {
        match result {
            Ok(output) => {
                self.state = SubTaskState::Success;
                self.output = Some(output);
            }
            Err(error) => {
                self.state = SubTaskState::Failed;
                self.error = Some(error);
            }
        }
    }

    /// Human-readable reason for a sub-task without output.
    pub fn failure_reason(&self) -> Option<String> {
        match self.state {
            SubTaskState::Success => None,
            SubTaskState::Failed => self.error.clone(),
            SubTaskState::Pending => Some("not started before the deadline".into()),
            SubTaskState::Running => Some("did not finish before the deadline".into()),
        }
    }
}

/// Outcome of a fan-out with at least one success.
#[derive(Debug, Clone)]
pub struct FanOutReport<R> {
    /// Every sub-task, in input order.
    pub tasks: Vec<SubTask<R>>,
    pub succeeded: usize,
    pub failed: usize,
    /// Whether the run was cut short by cancellation.
    pub cancelled: bool,
}

/// Fan-out in which no sub-task succeeded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("all {} sub-tasks failed", errors.len())]
pub struct FanOutFailure {
    /// `(index, reason)` for every unsuccessful sub-task.
    pub errors: Vec<(usize, String)>,
    pub cancelled: bool,
}

/// Per-index results of a fan-out over `len` items, successful or not.
pub fn into_results<R>(
    outcome: Result<FanOutReport<R>, FanOutFailure>,
    len: usize,
) -> Vec<Result<R, String>> {
    match outcome {
        Ok(report) => report
            .tasks
            .into_iter()
            .map(|task| {
                let reason = task.failure_reason();
                task.output
                    .ok_or_else(|| reason.unwrap_or_else(|| "no result".into()))
            })
            .collect(),
        Err(failure) => {
            let mut results: Vec<Result<R, String>> =
                (0..len).map(|_| Err("no result".to_string())).collect();
            for (index, reason) in failure.errors {
                if let Some(slot) = results.get_mut(index) {
                    *slot = Err(reason);
                }
            }
            results
        }
    }
}

/// Run `worker` over `items` under `policy`.
///
/// Returns `Err(FanOutFailure)` when no sub-task succeeded, including the
/// empty input.
pub async fn run<I, R, E, F, Fut>(
    items: Vec<I>,
    worker: F,
    policy: FanOutPolicy,
    cancel: &CancellationToken,
) -> Result<FanOutReport<R>, FanOutFailure>
where
    I: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let worker = Arc::new(worker);
    let mut tasks: Vec<SubTask<R>> = (0..items.len()).map(SubTask::new).collect();

    let cancelled = match policy {
        FanOutPolicy::Parallel => run_parallel(items, worker, &mut tasks, cancel).await,
        FanOutPolicy::Serial { delay } => {
            run_serial(items, worker, delay, &mut tasks, cancel).await
        }
    };

    let succeeded = tasks
        .iter()
        .filter(|t| t.state == SubTaskState::Success)
        .count();
    let failed = tasks
        .iter()
        .filter(|t| t.state == SubTaskState::Failed)
        .count();

    tracing::debug!(total = tasks.len(), succeeded, failed, cancelled, "Fan-out finished");

    if succeeded == 0 {
        let errors = tasks
            .iter()
            .filter_map(|t| t.failure_reason().map(|reason| (t.index, reason)))
            .collect();
        return Err(FanOutFailure { errors, cancelled });
    }

    Ok(FanOutReport {
        tasks,
        succeeded,
        failed,
        cancelled,
    })
}

/// Returns whether the run was cancelled.
async fn run_parallel<I, R, E, F, Fut>(
    items: Vec<I>,
    worker: Arc<F>,
    tasks: &mut [SubTask<R>],
    cancel: &CancellationToken,
) -> bool
where
    I: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let mut in_flight = FuturesUnordered::new();
    for (index, item) in items.into_iter().enumerate() {
        tasks[index].state = SubTaskState::Running;
        let handle = tokio::spawn(worker(index, item));
        in_flight.push(handle.map(move |joined| (index, settle(joined))));
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Keep whatever already finished; dropping the set detaches the rest.
                while let Some(Some((index, result))) = in_flight.next().now_or_never() {
                    tasks[index].resolve(result);
                }
                return true;
            }
            next = in_flight.next() => match next {
                Some((index, result)) => tasks[index].resolve(result),
                None => return false,
            },
        }
    }
}

/// Returns whether the run was cancelled.
async fn run_serial<I, R, E, F, Fut>(
    items: Vec<I>,
    worker: Arc<F>,
    delay: Duration,
    tasks: &mut [SubTask<R>],
    cancel: &CancellationToken,
) -> bool
where
    I: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = items.len();
    for (index, item) in items.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return true;
        }

        tasks[index].state = SubTaskState::Running;
        let handle = tokio::spawn(worker(index, item));
        tokio::select! {
            _ = cancel.cancelled() => return true,
            joined = handle => tasks[index].resolve(settle(joined)),
        }

        if index + 1 < total && !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return true,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
    false
}

fn settle<R, E: Display>(joined: Result<Result<R, E>, JoinError>) -> Result<R, String> {
    match joined {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) if e.is_panic() => Err(format!("worker panicked: {}", panic_message(e.into_panic()))),
        Err(e) => Err(format!("worker aborted: {e}")),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
