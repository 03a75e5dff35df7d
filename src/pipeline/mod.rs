use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Error, Result, anyhow};
use async_channel::{Receiver, Sender};
use tracing::{debug, error, info, trace, warn};

use crate::Config;
use crate::comparer::walker::LocalFileWalker;
use crate::comparer::{FileComparer, build_local_map, build_remote_map};
use crate::executor::operation::{Operation, OperationTask};
use crate::executor::ConcurrentOperationExecutor;
use crate::planner::action::SyncDirection;
use crate::planner::{SyncSummary, TransferPlanner};
use crate::pipeline::stats_reporter::StatsReporter;
use crate::types::error::{S3mirrorError, is_interrupted_error};
use crate::types::event_callback::EventType;
use crate::types::token::PipelineCancellationToken;
use crate::types::{StoragePath, SyncStatistics};

mod stats_reporter;
mod storage_factory;

/// One mirror run: list both sides, compare, plan, and execute.
pub struct Pipeline {
    config: Config,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<SyncStatistics>,
    stats_receiver: Receiver<SyncStatistics>,
    has_error: Arc<AtomicBool>,
    has_cancelled: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    sync_summary: Option<SyncSummary>,
    ready: bool,
}

impl Pipeline {
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        Self {
            config,
            cancellation_token,
            stats_sender,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            has_cancelled: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::<Error>::new())),
            sync_summary: None,
            ready: true,
        }
    }

    pub async fn run(&mut self) {
        if !self.ready {
            panic!("it can be executed only once.")
        }
        self.ready = false;

        match self.sync().await {
            Ok(summary) => {
                self.sync_summary = Some(summary);
            }
            Err(e) => {
                self.store_error(e);
            }
        }

        self.close_stats_sender();
    }

    async fn sync(&self) -> Result<SyncSummary> {
        let direction = self.config.sync_direction();
        let StoragePath::Local(local_root) = self.config.local_path().clone() else {
            return Err(anyhow!(S3mirrorError::ConfigurationError(
                "one side must be a local directory".to_string()
            )));
        };
        self.check_local_root(direction, &local_root).await?;

        let remote_path = self.config.remote_path().clone();
        let remote_prefix = storage_factory::remote_prefix(&remote_path);
        let store = storage_factory::create_store(
            remote_path,
            self.cancellation_token.clone(),
            self.config.remote_client_config.clone(),
            self.config.max_keys,
        )
        .await?;
        trace!(bucket = store.bucket(), prefix = remote_prefix, "store created.");

        let executor = ConcurrentOperationExecutor::new(
            store,
            self.config.executor_config,
            self.cancellation_token.clone(),
        );

        if self.config.create_bucket && !self.config.sync_policy.dry_run {
            self.create_bucket(&executor).await?;
        }

        let walker = LocalFileWalker::new(
            self.config.walker_config.clone(),
            self.cancellation_token.clone(),
        );
        let local = build_local_map(walker.clone(), vec![local_root.clone()]).await?;
        debug!(count = local.len(), "local tree walked.");

        let mut remote = build_remote_map(
            &executor,
            &remote_prefix,
            &local,
            &self.config.event_manager,
        )
        .await?;
        walker.retain_walkable(&local_root, &local, &mut remote);
        debug!(count = remote.len(), "remote listing loaded.");

        let comparer = FileComparer::new(
            self.config.comparer_config,
            self.cancellation_token.clone(),
        );
        let partition = comparer.compare(&local, &remote).await?;

        let planner = TransferPlanner::new(
            self.config.sync_policy,
            direction,
            local_root,
            &remote_prefix,
        )?
        .with_canned_acl(self.config.canned_acl.clone())
        .with_no_guess_mime_type(self.config.no_guess_mime_type);

        let plan = planner.plan(&partition);
        planner.report(&plan);
        for action in plan.skips() {
            let _ = self
                .stats_sender
                .send(SyncStatistics::SyncSkip {
                    key: action.path.clone(),
                })
                .await;
        }

        let mut event_manager = self.config.event_manager.clone();
        event_manager.register_callback(
            EventType::BATCH_PROGRESS | EventType::BATCH_ERROR,
            StatsReporter::new(self.stats_sender.clone()),
        );

        planner
            .execute(&plan, &local, &remote, &executor, &event_manager)
            .await
    }

    async fn check_local_root(&self, direction: SyncDirection, local_root: &PathBuf) -> Result<()> {
        match direction {
            SyncDirection::Upload => {
                if !local_root.exists() {
                    return Err(anyhow!(S3mirrorError::ConfigurationError(format!(
                        "source does not exist: {}",
                        local_root.display()
                    ))));
                }
            }
            SyncDirection::Download => {
                if !local_root.exists() && !self.config.sync_policy.dry_run {
                    tokio::fs::create_dir_all(local_root).await.map_err(|e| {
                        S3mirrorError::IoFailure {
                            path: local_root.to_string_lossy().to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    info!(
                        path = local_root.to_string_lossy().to_string(),
                        "target directory created."
                    );
                }
            }
        }
        Ok(())
    }

    async fn create_bucket(&self, executor: &ConcurrentOperationExecutor) -> Result<()> {
        let task = OperationTask::new(0, "", Operation::CreateBucket);
        let result = executor
            .run_batch(vec![task], &self.config.event_manager)
            .await;

        match result.into_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn store_error(&self, e: Error) {
        if is_interrupted_error(&e) || self.cancellation_token.is_cancelled() {
            self.has_cancelled.store(true, Ordering::SeqCst);
            warn!("sync has been cancelled.");
        } else {
            let error = format!("{e:#}");
            let source = e.source();
            error!(error = error, source = source, "sync failed.");
        }

        self.has_error.store(true, Ordering::SeqCst);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push_back(e);
        }
    }

    pub fn get_stats_receiver(&self) -> Receiver<SyncStatistics> {
        self.stats_receiver.clone()
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    /// True when the run stopped because cancellation was requested.
    pub fn has_cancelled(&self) -> bool {
        self.has_cancelled.load(Ordering::SeqCst)
    }

    pub fn get_sync_summary(&self) -> Option<SyncSummary> {
        self.sync_summary
    }

    pub fn get_errors_and_consume(&self) -> Option<Vec<Error>> {
        if !self.has_error() {
            return None;
        }

        let mut errors = self.errors.lock().ok()?;
        Some(errors.drain(..).collect())
    }

    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }
}
