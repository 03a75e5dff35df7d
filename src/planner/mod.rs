use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::info;

use crate::comparer::partition::DiscrepancyPartition;
use crate::comparer::{LocalMap, RemoteMap};
use crate::config::SyncPolicy;
use crate::executor::operation::{Operation, OperationTask};
use crate::executor::{BatchResult, ConcurrentOperationExecutor};
use crate::planner::action::{ActionCode, PlannedAction, SyncDirection};
use crate::storage::local::fs_util;
use crate::storage::{join_key, normalize_prefix};
use crate::types::error::S3mirrorError;
use crate::types::event_manager::EventManager;
use crate::types::{
    LocalEntry, ObjectMetadata, S3MIRROR_ORIGINAL_LAST_MODIFIED_METADATA_KEY,
    format_source_last_modified,
};

pub mod action;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    pub actions: Vec<PlannedAction>,
}

impl TransferPlan {
    pub fn transfers(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions.iter().filter(|action| action.code.is_transfer())
    }

    pub fn deletions(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions.iter().filter(|action| action.code.is_delete())
    }

    pub fn skips(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions.iter().filter(|action| action.code.is_skip())
    }

    pub fn count(&self, code: ActionCode) -> usize {
        self.actions
            .iter()
            .filter(|action| action.code == code)
            .count()
    }

    /// `"<code> <path>"` for every action visible at `report_level`.
    pub fn report_lines(&self, report_level: u8) -> Vec<String> {
        self.actions
            .iter()
            .filter(|action| action.code.min_report_level() <= report_level)
            .map(PlannedAction::report_line)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub transferred: usize,
    pub deleted: usize,
    pub moved: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
    pub dry_run: bool,
}

/// Turns a partition into actions according to a `SyncPolicy`, then drives
/// them through the executor.
pub struct TransferPlanner {
    policy: SyncPolicy,
    direction: SyncDirection,
    local_root: PathBuf,
    remote_prefix: String,
    canned_acl: Option<String>,
    no_guess_mime_type: bool,
}

impl TransferPlanner {
    pub fn new(
        policy: SyncPolicy,
        direction: SyncDirection,
        local_root: PathBuf,
        remote_prefix: &str,
    ) -> Result<Self> {
        policy.validate()?;

        Ok(Self {
            policy,
            direction,
            local_root,
            remote_prefix: normalize_prefix(remote_prefix),
            canned_acl: None,
            no_guess_mime_type: false,
        })
    }

    pub fn with_canned_acl(mut self, canned_acl: Option<String>) -> Self {
        self.canned_acl = canned_acl;
        self
    }

    pub fn with_no_guess_mime_type(mut self, no_guess_mime_type: bool) -> Self {
        self.no_guess_mime_type = no_guess_mime_type;
        self
    }

    pub fn plan(&self, partition: &DiscrepancyPartition) -> TransferPlan {
        let (only_source, only_target, newer_source, newer_target) = match self.direction {
            SyncDirection::Upload => (
                &partition.only_local,
                &partition.only_remote,
                &partition.newer_local,
                &partition.newer_remote,
            ),
            SyncDirection::Download => (
                &partition.only_remote,
                &partition.only_local,
                &partition.newer_remote,
                &partition.newer_local,
            ),
        };

        let mut actions: Vec<PlannedAction> = partition
            .all_keys()
            .into_iter()
            .map(|path| {
                let is_directory = path.ends_with('/');
                let code = if only_source.contains(&path) {
                    ActionCode::New
                } else if newer_source.contains(&path) {
                    ActionCode::Updated
                } else if newer_target.contains(&path) {
                    if self.policy.keep_conflicting {
                        ActionCode::KeptConflicting
                    } else {
                        ActionCode::Reverted
                    }
                } else if only_target.contains(&path) {
                    if self.policy.no_delete {
                        ActionCode::KeptDeleted
                    } else {
                        ActionCode::Deleted
                    }
                } else if self.policy.force && !is_directory {
                    ActionCode::Forced
                } else {
                    ActionCode::Unchanged
                };

                PlannedAction {
                    code,
                    path,
                    is_directory,
                }
            })
            .collect();
        actions.sort_by(|a, b| a.path.cmp(&b.path));

        TransferPlan { actions }
    }

    pub fn report(&self, plan: &TransferPlan) {
        for line in plan.report_lines(self.policy.report_level) {
            info!("{line}");
        }
    }

    /// Submits the transfers as one batch and, only when it completed, the
    /// deletions as a second batch. With `move_items`, the source side of
    /// every transferred file is removed afterwards.
    pub async fn execute(
        &self,
        plan: &TransferPlan,
        local: &LocalMap,
        remote: &RemoteMap,
        executor: &ConcurrentOperationExecutor,
        event_manager: &EventManager,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary {
            skipped: plan.skips().count(),
            dry_run: self.policy.dry_run,
            ..Default::default()
        };

        if self.policy.dry_run {
            info!(
                transfers = plan.transfers().count(),
                deletions = plan.deletions().count(),
                "dry run. nothing has been submitted."
            );
            return Ok(summary);
        }

        let transfer_tasks = plan
            .transfers()
            .enumerate()
            .map(|(id, action)| self.build_transfer_task(id, action, local, remote))
            .collect::<Result<Vec<_>>>()?;
        let transferred: Vec<&PlannedAction> = plan.transfers().collect();

        if !transfer_tasks.is_empty() {
            let result = executor.run_batch(transfer_tasks, event_manager).await;
            summary.transferred = result.completed_count;
            summary.bytes_transferred = result.bytes_completed;
            check_batch(result)?;
        }

        let delete_tasks: Vec<OperationTask> = plan
            .deletions()
            .enumerate()
            .map(|(id, action)| self.build_delete_task(id, action, false))
            .collect();
        if !delete_tasks.is_empty() {
            let result = executor.run_batch(delete_tasks, event_manager).await;
            summary.deleted = result.completed_count;
            check_batch(result)?;
        }

        if self.policy.move_items {
            let move_tasks: Vec<OperationTask> = transferred
                .iter()
                .filter(|action| !action.is_directory)
                .enumerate()
                .map(|(id, action)| self.build_delete_task(id, action, true))
                .collect();
            if !move_tasks.is_empty() {
                let result = executor.run_batch(move_tasks, event_manager).await;
                summary.moved = result.completed_count;
                check_batch(result)?;
            }
        }

        info!(
            transferred = summary.transferred,
            deleted = summary.deleted,
            moved = summary.moved,
            skipped = summary.skipped,
            bytes = summary.bytes_transferred,
            "sync summary."
        );

        Ok(summary)
    }

    fn build_transfer_task(
        &self,
        id: usize,
        action: &PlannedAction,
        local: &LocalMap,
        remote: &RemoteMap,
    ) -> Result<OperationTask> {
        let key = join_key(&self.remote_prefix, &action.path);

        let operation = match self.direction {
            SyncDirection::Upload => {
                let entry = local.get(&action.path).ok_or_else(|| missing(&action.path))?;
                Operation::Upload {
                    source: (!entry.is_directory).then(|| entry.absolute_path.clone()),
                    size: entry.size_bytes,
                    metadata: self.build_metadata(entry),
                }
            }
            SyncDirection::Download => {
                let entry = remote
                    .get(&action.path)
                    .ok_or_else(|| missing(&action.path))?;
                Operation::Download {
                    destination: fs_util::key_to_file_path(&self.local_root, &action.path),
                    size: entry.size_bytes,
                    last_modified: entry.authoritative_last_modified(),
                }
            }
        };

        Ok(OperationTask::new(id, &key, operation))
    }

    // `source_side` selects the side that was transferred from, as used by move.
    fn build_delete_task(
        &self,
        id: usize,
        action: &PlannedAction,
        source_side: bool,
    ) -> OperationTask {
        let delete_local = match self.direction {
            SyncDirection::Upload => source_side,
            SyncDirection::Download => !source_side,
        };

        if delete_local {
            OperationTask::new(
                id,
                &action.path,
                Operation::DeleteLocal {
                    path: fs_util::key_to_file_path(&self.local_root, &action.path),
                },
            )
        } else {
            OperationTask::new(
                id,
                &join_key(&self.remote_prefix, &action.path),
                Operation::Delete,
            )
        }
    }

    fn build_metadata(&self, entry: &LocalEntry) -> ObjectMetadata {
        let content_type = if self.no_guess_mime_type || entry.is_directory {
            None
        } else {
            mime_guess::from_path(&entry.absolute_path)
                .first()
                .map(|mime| mime.to_string())
        };

        ObjectMetadata {
            user_metadata: HashMap::from([(
                S3MIRROR_ORIGINAL_LAST_MODIFIED_METADATA_KEY.to_string(),
                format_source_last_modified(&entry.last_modified),
            )]),
            content_type,
            canned_acl: self.canned_acl.clone(),
        }
    }
}

fn check_batch(result: BatchResult) -> Result<()> {
    match result.into_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn missing(path: &str) -> anyhow::Error {
    anyhow!(S3mirrorError::IoFailure {
        path: path.to_string(),
        message: "entry disappeared between comparison and planning".to_string(),
    })
}
