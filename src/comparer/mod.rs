use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{debug, info, trace};

use crate::comparer::hash::{compute_md5, read_sidecar, write_sidecar};
use crate::comparer::partition::DiscrepancyPartition;
use crate::comparer::walker::LocalFileWalker;
use crate::config::{ComparerConfig, ConflictPolicy};
use crate::executor::ConcurrentOperationExecutor;
use crate::executor::operation::{Operation, OperationOutput, OperationTask};
use crate::storage::{join_key, normalize_prefix};
use crate::types::error::S3mirrorError;
use crate::types::event_manager::EventManager;
use crate::types::progress_watcher::BytesProgressWatcher;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ContentHash, LocalEntry, RemoteEntry};

pub mod hash;
pub mod partition;
pub mod walker;

pub type LocalMap = BTreeMap<String, LocalEntry>;
pub type RemoteMap = BTreeMap<String, RemoteEntry>;

/// Classifies every path of a local tree and a remote listing into a
/// `DiscrepancyPartition`.
pub struct FileComparer {
    config: ComparerConfig,
    cancellation_token: PipelineCancellationToken,
    watcher: Arc<BytesProgressWatcher>,
}

impl FileComparer {
    pub fn new(config: ComparerConfig, cancellation_token: PipelineCancellationToken) -> Self {
        Self {
            config,
            cancellation_token,
            watcher: Arc::new(BytesProgressWatcher::default()),
        }
    }

    /// Hashing progress of the comparisons run so far.
    pub fn watcher(&self) -> Arc<BytesProgressWatcher> {
        self.watcher.clone()
    }

    pub async fn compare(
        &self,
        local: &LocalMap,
        remote: &RemoteMap,
    ) -> Result<DiscrepancyPartition> {
        let mut partition = DiscrepancyPartition::default();

        let bytes_to_hash: u64 = remote
            .keys()
            .filter_map(|key| local.get(key))
            .filter(|entry| !entry.is_directory)
            .map(|entry| entry.size_bytes)
            .sum();
        self.watcher.add_total(bytes_to_hash);

        for (key, remote_entry) in remote {
            if self.cancellation_token.is_cancelled() {
                trace!("compare() cancelled.");
                return Err(anyhow!(S3mirrorError::Interrupted));
            }

            let Some(local_entry) = local.get(key) else {
                partition.only_remote.insert(key.clone());
                continue;
            };

            if local_entry.is_directory || remote_entry.is_directory {
                partition.unchanged.insert(key.clone());
                continue;
            }

            let local_hash = self.local_hash(local_entry).await?;
            if remote_entry.authoritative_hash() == Some(&local_hash) {
                trace!(key = key, "content hash matched.");
                partition.unchanged.insert(key.clone());
                continue;
            }

            let local_timestamp = local_entry.last_modified.timestamp();
            // a remote object without any timestamp is treated as the older side
            let remote_timestamp = remote_entry
                .authoritative_last_modified()
                .map(|last_modified| last_modified.timestamp())
                .unwrap_or(i64::MIN);

            if local_timestamp < remote_timestamp {
                partition.newer_remote.insert(key.clone());
            } else if remote_timestamp < local_timestamp {
                partition.newer_local.insert(key.clone());
            } else {
                match self.config.conflict_policy {
                    ConflictPolicy::AssumeLocalNewer => {
                        debug!(key = key, "same timestamp with different content. local wins.");
                        partition.newer_local.insert(key.clone());
                    }
                    ConflictPolicy::Fail => {
                        return Err(anyhow!(S3mirrorError::ComparisonConflict {
                            key: key.clone(),
                        }));
                    }
                }
            }
        }

        for key in local.keys() {
            if !remote.contains_key(key) {
                partition.only_local.insert(key.clone());
            }
        }

        debug!(
            only_local = partition.only_local.len(),
            only_remote = partition.only_remote.len(),
            newer_local = partition.newer_local.len(),
            newer_remote = partition.newer_remote.len(),
            unchanged = partition.unchanged.len(),
            "comparison completed."
        );

        Ok(partition)
    }

    async fn local_hash(&self, entry: &LocalEntry) -> Result<ContentHash> {
        if self.config.use_sidecar_hashes {
            if let Some(hash) = read_sidecar(&entry.absolute_path).await? {
                trace!(path = entry.path, "sidecar hash used.");
                self.watcher.update(entry.size_bytes);
                return Ok(hash);
            }
        }

        let hash = compute_md5(
            &entry.absolute_path,
            self.cancellation_token.clone(),
            Some(self.watcher.clone()),
        )
        .await?;

        if self.config.generate_sidecar_hashes {
            write_sidecar(&entry.absolute_path, &hash).await?;
        }

        Ok(hash)
    }
}

pub async fn build_local_map(walker: LocalFileWalker, roots: Vec<PathBuf>) -> Result<LocalMap> {
    let entries = tokio::task::spawn_blocking(move || walker.walk(&roots)).await??;

    Ok(entries
        .into_iter()
        .map(|entry| (entry.path.clone(), entry))
        .collect())
}

/// Lists `prefix` and keys the result by path relative to it. Parent
/// directories implied by deeper keys are added. Objects that are also present
/// in `local` but were listed without their user metadata are fetched again
/// with a head request batch.
pub async fn build_remote_map(
    executor: &ConcurrentOperationExecutor,
    prefix: &str,
    local: &LocalMap,
    event_manager: &EventManager,
) -> Result<RemoteMap> {
    let prefix = normalize_prefix(prefix);
    let entries = executor.store().list(&prefix).await?;

    let mut remote = RemoteMap::new();
    for entry in entries {
        let Some(relative) = entry.key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }

        for (index, _) in relative.match_indices('/') {
            if index + 1 == relative.len() {
                break;
            }
            let parent = &relative[..=index];
            remote
                .entry(parent.to_string())
                .or_insert_with(|| RemoteEntry::implicit_directory(parent));
        }

        remote.insert(relative.to_string(), entry.with_key(relative));
    }

    let tasks: Vec<OperationTask> = remote
        .values()
        .filter(|entry| !entry.is_directory && !entry.metadata_loaded)
        .filter(|entry| local.contains_key(&entry.key))
        .enumerate()
        .map(|(id, entry)| {
            OperationTask::new(id, &join_key(&prefix, &entry.key), Operation::Head)
        })
        .collect();

    if !tasks.is_empty() {
        info!(count = tasks.len(), "loading object metadata.");

        let result = executor.run_batch(tasks, event_manager).await;
        if !result.is_completed() {
            return Err(result
                .into_error()
                .unwrap_or_else(|| anyhow!(S3mirrorError::Interrupted)));
        }

        for (key, output) in result.outputs() {
            if let OperationOutput::Entry(entry) = output {
                let relative = key.strip_prefix(prefix.as_str()).unwrap_or(key);
                remote.insert(relative.to_string(), entry.with_key(relative));
            }
        }
    }

    Ok(remote)
}
