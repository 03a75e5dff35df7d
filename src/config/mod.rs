use crate::planner::action::SyncDirection;
use crate::types::error::S3mirrorError;
use crate::types::event_manager::EventManager;
use crate::types::{ClientConfigLocation, DEFAULT_IGNORE_FILE_NAME, S3Credentials, StoragePath};
use std::time::Duration;

pub mod args;

pub const DEFAULT_WORKER_SIZE: usize = 16;
pub const DEFAULT_POLL_INTERVAL_MILLISECONDS: u64 = 250;
pub const DEFAULT_REPORT_LEVEL: u8 = 1;

#[derive(Debug, Clone)]
pub struct Config {
    pub source: StoragePath,
    pub target: StoragePath,
    pub remote_client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    pub sync_policy: SyncPolicy,
    pub comparer_config: ComparerConfig,
    pub walker_config: WalkerConfig,
    pub executor_config: ExecutorConfig,
    pub canned_acl: Option<String>,
    pub no_guess_mime_type: bool,
    pub max_keys: i32,
    pub create_bucket: bool,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
    pub event_manager: EventManager,
}

impl Config {
    /// Local to anything is an upload. A remote source is a download.
    pub fn sync_direction(&self) -> SyncDirection {
        if self.source.is_local() {
            SyncDirection::Upload
        } else {
            SyncDirection::Download
        }
    }

    /// The local side of the mirror.
    pub fn local_path(&self) -> &StoragePath {
        match self.sync_direction() {
            SyncDirection::Upload => &self.source,
            SyncDirection::Download => &self.target,
        }
    }

    /// The object store side of the mirror.
    pub fn remote_path(&self) -> &StoragePath {
        match self.sync_direction() {
            SyncDirection::Upload => &self.target,
            SyncDirection::Download => &self.source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncPolicy {
    pub dry_run: bool,
    pub force: bool,
    pub keep_conflicting: bool,
    pub no_delete: bool,
    pub move_items: bool,
    pub report_level: u8,
    pub no_progress: bool,
    pub quiet: bool,
}

impl SyncPolicy {
    pub fn validate(&self) -> Result<(), S3mirrorError> {
        if self.move_items && self.no_delete {
            return Err(S3mirrorError::ConfigurationError(
                "move and no-delete cannot be combined".to_string(),
            ));
        }
        if 3 < self.report_level {
            return Err(S3mirrorError::ConfigurationError(format!(
                "report level must be between 0 and 3: {}",
                self.report_level
            )));
        }
        Ok(())
    }
}

/// How to settle a file whose hash differs while both timestamps are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    AssumeLocalNewer,
    #[default]
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComparerConfig {
    pub conflict_policy: ConflictPolicy,
    pub use_sidecar_hashes: bool,
    pub generate_sidecar_hashes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    pub follow_symlinks: bool,
    pub ignore_file_name: String,
    // `X.md5` next to a regular file `X` is a sidecar, not content
    pub sidecar_hashes: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            ignore_file_name: DEFAULT_IGNORE_FILE_NAME.to_string(),
            sidecar_hashes: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    // None spawns one worker per task.
    pub max_concurrency: Option<usize>,
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: Some(DEFAULT_WORKER_SIZE),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MILLISECONDS),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), S3mirrorError> {
        if self.max_concurrency == Some(0) {
            return Err(S3mirrorError::ConfigurationError(
                "worker size must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(S3mirrorError::ConfigurationError(
                "poll interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
