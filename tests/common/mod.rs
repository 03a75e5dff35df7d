#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_channel::Receiver;
use filetime::{FileTime, set_file_mtime};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use s3mirror::Config;
use s3mirror::comparer::partition::DiscrepancyPartition;
use s3mirror::comparer::walker::LocalFileWalker;
use s3mirror::comparer::{FileComparer, build_local_map, build_remote_map};
use s3mirror::config::args::parse_from_args;
use s3mirror::executor::ConcurrentOperationExecutor;
use s3mirror::pipeline::Pipeline;
use s3mirror::planner::{SyncSummary, TransferPlan, TransferPlanner};
use s3mirror::storage::StoreFactory;
use s3mirror::storage::local::LocalStoreFactory;
use s3mirror::types::token::create_pipeline_cancellation_token;
use s3mirror::types::{StoragePath, SyncStatistics};

pub mod s3;

pub const ONE_HOUR: Duration = Duration::from_secs(3600);

pub static SEMAPHORE: Lazy<Arc<Semaphore>> = Lazy::new(|| Arc::new(Semaphore::new(1)));

/// A source directory and a target directory, mirrored through the local
/// object store.
pub struct TestHelper {
    pub source: TempDir,
    pub target: TempDir,
}

pub struct MirrorResult {
    pub summary: Option<SyncSummary>,
    pub has_error: bool,
    pub has_cancelled: bool,
    pub errors: Vec<anyhow::Error>,
    pub stats: Vec<SyncStatistics>,
}

impl TestHelper {
    pub fn new() -> Self {
        Self {
            source: tempfile::tempdir().unwrap(),
            target: tempfile::tempdir().unwrap(),
        }
    }

    pub fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }

    pub fn source_path(&self) -> String {
        self.source.path().to_string_lossy().to_string()
    }

    pub fn target_path(&self) -> String {
        self.target.path().to_string_lossy().to_string()
    }

    pub fn write_source(&self, relative: &str, content: &str, age: Duration) {
        write_file(self.source.path(), relative, content, age);
    }

    pub fn write_target(&self, relative: &str, content: &str, age: Duration) {
        write_file(self.target.path(), relative, content, age);
    }

    pub fn read_target(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.target.path().join(relative)).ok()
    }

    pub fn source_files(&self) -> Vec<String> {
        list_files(self.source.path())
    }

    pub fn target_files(&self) -> Vec<String> {
        list_files(self.target.path())
    }

    pub fn build_config(&self, options: &[&str]) -> Config {
        let source = self.source_path();
        let target = self.target_path();

        let mut args = vec!["s3mirror", "--allow-both-local-storage", "--no-progress"];
        args.extend_from_slice(options);
        args.push(&source);
        args.push(&target);

        Config::try_from(parse_from_args(args).unwrap()).unwrap()
    }

    pub async fn mirror(&self, options: &[&str]) -> MirrorResult {
        run_pipeline(self.build_config(options)).await
    }

    /// Walks, lists and compares both sides without executing anything.
    pub async fn compare(&self, config: &Config) -> anyhow::Result<DiscrepancyPartition> {
        let cancellation_token = create_pipeline_cancellation_token();

        let store = LocalStoreFactory::create(
            StoragePath::Local(self.target.path().to_path_buf()),
            cancellation_token.clone(),
            None,
            config.max_keys,
        )
        .await?;
        let executor = ConcurrentOperationExecutor::new(
            store,
            config.executor_config,
            cancellation_token.clone(),
        );

        let walker =
            LocalFileWalker::new(config.walker_config.clone(), cancellation_token.clone());
        let local = build_local_map(walker.clone(), vec![self.source.path().to_path_buf()]).await?;
        let mut remote = build_remote_map(&executor, "", &local, &config.event_manager).await?;
        walker.retain_walkable(self.source.path(), &local, &mut remote);

        FileComparer::new(config.comparer_config, cancellation_token)
            .compare(&local, &remote)
            .await
    }

    pub async fn plan(&self, options: &[&str]) -> TransferPlan {
        let config = self.build_config(options);
        let partition = self.compare(&config).await.unwrap();

        TransferPlanner::new(
            config.sync_policy,
            config.sync_direction(),
            self.source.path().to_path_buf(),
            "",
        )
        .unwrap()
        .plan(&partition)
    }
}

pub async fn run_pipeline(config: Config) -> MirrorResult {
    let mut pipeline = Pipeline::new(config, create_pipeline_cancellation_token()).await;
    let stats_receiver = pipeline.get_stats_receiver();

    pipeline.run().await;

    MirrorResult {
        summary: pipeline.get_sync_summary(),
        has_error: pipeline.has_error(),
        has_cancelled: pipeline.has_cancelled(),
        errors: pipeline.get_errors_and_consume().unwrap_or_default(),
        stats: drain(stats_receiver),
    }
}

pub fn drain(stats_receiver: Receiver<SyncStatistics>) -> Vec<SyncStatistics> {
    let mut stats = vec![];
    while let Ok(sync_stats) = stats_receiver.try_recv() {
        stats.push(sync_stats);
    }
    stats
}

pub fn write_file(root: &Path, relative: &str, content: &str, age: Duration) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    set_age(&path, age);
}

pub fn set_age(path: &Path, age: Duration) {
    let mtime = SystemTime::now() - age;
    set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
}

pub fn set_mtime(path: &Path, mtime: SystemTime) {
    set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
}

/// Relative paths of regular files below `root`, sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|relative| relative.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

pub fn absolute(root: &TempDir, relative: &str) -> PathBuf {
    root.path().join(relative)
}
