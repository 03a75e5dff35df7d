use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::config::ExecutorConfig;
use crate::executor::operation::{OperationOutput, OperationTask, TaskState};
use crate::storage::Store;
use crate::types::error::{S3mirrorError, is_interrupted_error};
use crate::types::event_callback::{BatchEvent, CompletedItem, ProgressStatus};
use crate::types::event_manager::EventManager;
use crate::types::progress_watcher::BytesProgressWatcher;
use crate::types::token::PipelineCancellationToken;

pub mod operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchState {
    #[default]
    NotStarted,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Cancelled | BatchState::Error
        )
    }
}

/// The first failure of a batch, with the error as the worker returned it.
#[derive(Debug)]
pub struct BatchFailure {
    pub key: String,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub state: BatchState,
    pub tasks: Vec<OperationTask>,
    /// Items reported through `Progress` events.
    pub completed_count: usize,
    pub bytes_completed: u64,
    pub failure: Option<BatchFailure>,
}

impl BatchResult {
    pub fn is_completed(&self) -> bool {
        self.state == BatchState::Completed
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &OperationOutput)> {
        self.tasks
            .iter()
            .filter_map(|task| task.output().map(|output| (task.key.as_str(), output)))
    }

    /// The error that ended the batch. The worker's error keeps its kind
    /// and is wrapped with the failed key and the number of completed items.
    pub fn into_error(self) -> Option<anyhow::Error> {
        let completed = self.completed_count;
        match self.state {
            BatchState::Error => Some(match self.failure {
                Some(BatchFailure { key, error }) => error.context(format!(
                    "batch aborted at {key} after {completed} completed items"
                )),
                None => anyhow!(S3mirrorError::StoreFailure {
                    key: String::new(),
                    message: format!("batch aborted after {completed} completed items"),
                }),
            }),
            BatchState::Cancelled => Some(
                anyhow!(S3mirrorError::Interrupted)
                    .context(format!("batch cancelled after {completed} completed items")),
            ),
            _ => None,
        }
    }
}

struct WorkerResult {
    task_id: usize,
    result: Result<OperationOutput>,
}

/// Fans a batch of operations out to spawned workers and reports their
/// completion from a polling loop. Any failure aborts the whole batch.
pub struct ConcurrentOperationExecutor {
    store: Store,
    config: ExecutorConfig,
    cancellation_token: PipelineCancellationToken,
}

impl ConcurrentOperationExecutor {
    pub fn new(
        store: Store,
        config: ExecutorConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            store,
            config,
            cancellation_token,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn run_batch(
        &self,
        mut tasks: Vec<OperationTask>,
        event_manager: &EventManager,
    ) -> BatchResult {
        for (index, task) in tasks.iter_mut().enumerate() {
            task.id = index;
            task.state = TaskState::Pending;
        }

        let total = tasks.len();
        let bytes_total: u64 = tasks.iter().filter_map(|task| task.operation.size()).sum();
        let watcher = Arc::new(BytesProgressWatcher::new(bytes_total));
        let worker_token = self.cancellation_token.child_token();

        event_manager
            .trigger_event(BatchEvent::Started { total, bytes_total })
            .await;
        debug!(total = total, bytes_total = bytes_total, "batch started.");

        let mut batch = BatchResult {
            state: BatchState::Running,
            ..Default::default()
        };

        let (sender, receiver) = async_channel::unbounded::<WorkerResult>();
        let semaphore = self
            .config
            .max_concurrency
            .map(|max_concurrency| Arc::new(Semaphore::new(max_concurrency)));

        let mut join_handles: Vec<JoinHandle<()>> = Vec::with_capacity(total);
        for task in tasks.iter_mut() {
            task.state = TaskState::Running;
            join_handles.push(self.spawn_worker(
                task,
                semaphore.clone(),
                sender.clone(),
                worker_token.clone(),
                watcher.clone(),
            ));
        }
        drop(sender);

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut finished = 0;
        let mut newly_completed: Vec<CompletedItem> = Vec::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {},
                _ = self.cancellation_token.cancelled() => {},
            }

            while let Ok(worker_result) = receiver.try_recv() {
                finished += 1;
                record_result(
                    &mut tasks,
                    worker_result,
                    &worker_token,
                    &mut newly_completed,
                    &mut batch,
                );
            }

            if batch.failure.is_none() && self.cancellation_token.is_cancelled() {
                worker_token.cancel();
                warn!(
                    completed = batch.completed_count,
                    total = total,
                    "batch has been cancelled."
                );

                drain_workers(join_handles, &receiver, &mut tasks, &worker_token).await;

                batch.state = BatchState::Cancelled;
                event_manager
                    .trigger_event(BatchEvent::Cancelled {
                        completed: batch.completed_count,
                        status: self.build_status(&batch, total, &watcher),
                    })
                    .await;
                break;
            }

            let failure = batch
                .failure
                .as_ref()
                .map(|failure| (failure.key.clone(), format!("{:#}", failure.error)));
            if let Some((key, message)) = failure {
                self.report_progress(
                    event_manager,
                    &mut newly_completed,
                    &mut batch,
                    total,
                    &watcher,
                )
                .await;

                worker_token.cancel();
                error!(key = key, error = message, "batch has been aborted.");

                drain_workers(join_handles, &receiver, &mut tasks, &worker_token).await;

                batch.state = BatchState::Error;
                event_manager
                    .trigger_event(BatchEvent::Error {
                        key,
                        message,
                        completed: batch.completed_count,
                    })
                    .await;
                break;
            }

            self.report_progress(
                event_manager,
                &mut newly_completed,
                &mut batch,
                total,
                &watcher,
            )
            .await;

            if finished == total {
                for join_handle in join_handles {
                    if let Err(e) = join_handle.await {
                        error!(error = e.to_string(), "worker has panicked.");
                    }
                }

                batch.state = BatchState::Completed;
                event_manager
                    .trigger_event(BatchEvent::Completed {
                        status: self.build_status(&batch, total, &watcher),
                    })
                    .await;
                debug!(total = total, "batch completed.");
                break;
            }
        }

        batch.bytes_completed = watcher.bytes_transferred();
        batch.tasks = tasks;
        batch
    }

    fn spawn_worker(
        &self,
        task: &OperationTask,
        semaphore: Option<Arc<Semaphore>>,
        sender: async_channel::Sender<WorkerResult>,
        worker_token: PipelineCancellationToken,
        watcher: Arc<BytesProgressWatcher>,
    ) -> JoinHandle<()> {
        let store = dyn_clone::clone_box(&*self.store);
        let task_id = task.id;
        let key = task.key.clone();
        let operation = task.operation.clone();

        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => {
                    tokio::select! {
                        permit = semaphore.acquire_owned() => permit.ok(),
                        _ = worker_token.cancelled() => {
                            let _ = sender
                                .send(WorkerResult {
                                    task_id,
                                    result: Err(anyhow!(S3mirrorError::Interrupted)),
                                })
                                .await;
                            return;
                        }
                    }
                }
                None => None,
            };

            trace!(worker_index = task_id, key = key, "worker has started.");

            let execution = AssertUnwindSafe(operation::execute(
                &store,
                &key,
                &operation,
                worker_token.clone(),
                watcher,
            ))
            .catch_unwind();

            let result = tokio::select! {
                result = execution => result.unwrap_or_else(|payload| {
                    Err(anyhow!(S3mirrorError::StoreFailure {
                        key: key.clone(),
                        message: format!("worker has panicked: {}", panic_message(&*payload)),
                    }))
                }),
                _ = worker_token.cancelled() => {
                    info!(worker_index = task_id, key = key, "worker has been cancelled.");
                    Err(anyhow!(S3mirrorError::Interrupted))
                }
            };

            if let Err(e) = &result {
                if !is_interrupted_error(e) {
                    warn!(
                        worker_index = task_id,
                        key = key,
                        error = e.to_string(),
                        source = e.source(),
                        "operation failed."
                    );
                }
            }

            let _ = sender.send(WorkerResult { task_id, result }).await;
        })
    }

    async fn report_progress(
        &self,
        event_manager: &EventManager,
        newly_completed: &mut Vec<CompletedItem>,
        batch: &mut BatchResult,
        total: usize,
        watcher: &BytesProgressWatcher,
    ) {
        batch.completed_count += newly_completed.len();
        let newly_completed = std::mem::take(newly_completed);

        event_manager
            .trigger_event(BatchEvent::Progress {
                status: self.build_status(batch, total, watcher),
                newly_completed,
            })
            .await;
    }

    fn build_status(
        &self,
        batch: &BatchResult,
        total: usize,
        watcher: &BytesProgressWatcher,
    ) -> ProgressStatus {
        ProgressStatus {
            completed_count: batch.completed_count,
            total_count: total,
            bytes_completed: watcher.bytes_transferred(),
            bytes_total: watcher.bytes_total(),
            cancellation_token: self.cancellation_token.clone(),
        }
    }
}

fn record_result(
    tasks: &mut [OperationTask],
    worker_result: WorkerResult,
    worker_token: &PipelineCancellationToken,
    newly_completed: &mut Vec<CompletedItem>,
    batch: &mut BatchResult,
) {
    let task = &mut tasks[worker_result.task_id];

    match worker_result.result {
        Ok(output) => {
            let bytes = match &output {
                OperationOutput::Downloaded { bytes, .. } => *bytes,
                _ => task.operation.size().unwrap_or(0),
            };
            newly_completed.push(CompletedItem {
                task_id: task.id,
                key: task.key.clone(),
                operation: task.operation.kind(),
                bytes,
            });
            task.state = TaskState::Completed(output);
        }
        Err(e) => {
            if is_interrupted_error(&e) && worker_token.is_cancelled() {
                task.state = TaskState::Interrupted;
                return;
            }

            task.state = TaskState::Failed(format!("{e:#}"));
            if batch.failure.is_none() {
                batch.failure = Some(BatchFailure {
                    key: task.key.clone(),
                    error: e,
                });
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// Waits for every worker after the worker token has been cancelled. Results
// that arrive now are never reported.
async fn drain_workers(
    join_handles: Vec<JoinHandle<()>>,
    receiver: &async_channel::Receiver<WorkerResult>,
    tasks: &mut [OperationTask],
    worker_token: &PipelineCancellationToken,
) {
    for join_handle in join_handles {
        if let Err(e) = join_handle.await {
            error!(error = e.to_string(), "worker has panicked.");
        }
    }

    let mut unreported = Vec::new();
    let mut ignored = BatchResult::default();
    while let Ok(worker_result) = receiver.try_recv() {
        record_result(
            tasks,
            worker_result,
            worker_token,
            &mut unreported,
            &mut ignored,
        );
    }
}
