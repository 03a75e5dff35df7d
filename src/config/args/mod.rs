use crate::Config;
use crate::config::args::value_parser::{canned_acl, storage_path, url};
use crate::config::{
    CLITimeoutConfig, ClientConfig, ComparerConfig, ConflictPolicy, ExecutorConfig, RetryConfig,
    SyncPolicy, TracingConfig, WalkerConfig,
};
use crate::types::event_manager::EventManager;
use crate::types::{
    AccessKeys, ClientConfigLocation, DEFAULT_IGNORE_FILE_NAME, S3Credentials, StoragePath,
};
use clap::Parser;
use clap::builder::{ArgPredicate, NonEmptyStringValueParser};
use clap_verbosity_flag::{Verbosity, WarnLevel};
#[cfg(feature = "version")]
use shadow_rs::shadow;
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod tests;
mod value_parser;

const DEFAULT_WORKER_SIZE: u16 = 16;
const DEFAULT_POLL_INTERVAL_MILLISECONDS: u64 = 250;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_FORCE: bool = false;
const DEFAULT_KEEP: bool = false;
const DEFAULT_NO_DELETE: bool = false;
const DEFAULT_MOVE: bool = false;
const DEFAULT_REPORT_LEVEL: u8 = 1;
const DEFAULT_NO_PROGRESS: bool = false;
const DEFAULT_ASSUME_LOCAL_NEWER: bool = false;
const DEFAULT_USE_MD5_SIDECAR: bool = false;
const DEFAULT_GENERATE_MD5_SIDECAR: bool = false;
const DEFAULT_FOLLOW_SYMLINKS: bool = false;
const DEFAULT_UNBOUNDED_WORKERS: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_NO_GUESS_MIME_TYPE: bool = false;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_CREATE_BUCKET: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;

const NO_S3_STORAGE_SPECIFIED: &str = "either SOURCE or TARGET must be s3://\n";
const BOTH_S3_STORAGE_SPECIFIED: &str = "either SOURCE or TARGET must be a local directory\n";
const SOURCE_LOCAL_STORAGE_NOT_DIRECTORY: &str = "directory must be specified as a source\n";
const TARGET_LOCAL_STORAGE_NOT_DIRECTORY: &str = "directory must be specified as a target\n";
const TARGET_LOCAL_STORAGE_SPECIFIED_WITH_ACL: &str = "with --acl, target storage must be s3://\n";
const TARGET_LOCAL_STORAGE_SPECIFIED_WITH_CREATE_BUCKET: &str =
    "with --create-bucket, target storage must be s3://\n";
const SOURCE_REMOTE_STORAGE_SPECIFIED_WITH_NO_GUESS_MIME_TYPE: &str =
    "with --no-guess-mime-type, source storage must be local storage\n";
const NO_CREDENTIAL_REQUIRED: &str = "no credential required for local storage\n";

#[cfg(feature = "version")]
shadow!(build);

#[derive(Parser, Clone, Debug)]
#[cfg_attr(feature = "version", command(version=format!("{} ({} {}), {}", build::PKG_VERSION, build::SHORT_COMMIT, build::BUILD_TARGET, build::RUST_VERSION)))]
pub struct CLIArgs {
    #[arg(env, help = "s3://<BUCKET_NAME>[/prefix] or local directory", value_parser = storage_path::check_storage_path, default_value_if("auto_complete_shell", ArgPredicate::IsPresent, "s3://ignored"), required = false)]
    source: String,

    #[arg(env, help = "s3://<BUCKET_NAME>[/prefix] or local directory", value_parser = storage_path::check_storage_path, default_value_if("auto_complete_shell", ArgPredicate::IsPresent, "./ignored"), required = false)]
    target: String,

    /// A simulation mode. The plan is printed, nothing is transferred or deleted
    #[arg(long, env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    dry_run: bool,

    /// transfer files that are newer in the target as well (reported as F)
    #[arg(long, env, default_value_t = DEFAULT_FORCE, conflicts_with = "keep", help_heading = "General")]
    force: bool,

    /// keep files that are newer in the target (reported as r)
    #[arg(long, env, default_value_t = DEFAULT_KEEP, help_heading = "General")]
    keep: bool,

    /// do not delete files that exist only in the target (reported as d)
    #[arg(long, env, default_value_t = DEFAULT_NO_DELETE, help_heading = "General")]
    no_delete: bool,

    /// remove the source side of every transferred file after the transfer
    #[arg(long = "move", env = "MOVE", default_value_t = DEFAULT_MOVE, conflicts_with = "no_delete", help_heading = "General")]
    move_items: bool,

    /// 0: nothing, 1: transfers and deletions, 2: also kept files, 3: also unchanged files
    #[arg(long, env, default_value_t = DEFAULT_REPORT_LEVEL, value_parser = clap::value_parser!(u8).range(0..=3), help_heading = "General")]
    report_level: u8,

    /// hide the progress indicator
    #[arg(long, env, default_value_t = DEFAULT_NO_PROGRESS, help_heading = "General")]
    no_progress: bool,

    /// when both sides have the same timestamp but different content, treat the local file as newer instead of failing
    #[arg(long, env, default_value_t = DEFAULT_ASSUME_LOCAL_NEWER, help_heading = "Comparison")]
    assume_local_newer: bool,

    /// read local hashes from <file>.md5 when it is not older than the file
    #[arg(long, env, default_value_t = DEFAULT_USE_MD5_SIDECAR, help_heading = "Comparison")]
    use_md5_sidecar: bool,

    /// write <file>.md5 for every local file hashed during comparison
    #[arg(long, env, default_value_t = DEFAULT_GENERATE_MD5_SIDECAR, help_heading = "Comparison")]
    generate_md5_sidecar: bool,

    /// name of the per-directory ignore file
    #[arg(long, env, default_value = DEFAULT_IGNORE_FILE_NAME, value_parser = NonEmptyStringValueParser::new(), help_heading = "Local Directory")]
    ignore_file_name: String,

    /// follow symbolic links while walking the local directory
    #[arg(long, env, default_value_t = DEFAULT_FOLLOW_SYMLINKS, help_heading = "Local Directory")]
    follow_symlinks: bool,

    /// location of the file that the AWS CLI uses to store configuration profiles
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_config_file: Option<PathBuf>,

    /// location of the file that the AWS CLI uses to store access keys
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_shared_credentials_file: Option<PathBuf>,

    /// AWS CLI profile
    #[arg(long, env, conflicts_with_all = ["access_key", "secret_access_key", "session_token"], help_heading = "AWS Configuration")]
    profile: Option<String>,

    /// access key
    #[arg(long, env, conflicts_with_all = ["profile"], requires = "secret_access_key", help_heading = "AWS Configuration")]
    access_key: Option<String>,

    /// secret access key
    #[arg(long, env, conflicts_with_all = ["profile"], requires = "access_key", help_heading = "AWS Configuration")]
    secret_access_key: Option<String>,

    /// session token
    #[arg(long, env, conflicts_with_all = ["profile"], requires = "access_key", help_heading = "AWS Configuration")]
    session_token: Option<String>,

    /// region
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "S3 Options")]
    region: Option<String>,

    /// endpoint url of S3-compatible storage
    #[arg(long, env, value_parser = url::check_scheme, help_heading = "S3 Options")]
    endpoint_url: Option<String>,

    /// force path-style addressing
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "S3 Options")]
    force_path_style: bool,

    /// trace verbosity(-v: show info, -vv: show debug, -vvv show trace)
    #[clap(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// show trace as json format
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    json_tracing: bool,

    /// enable aws sdk tracing
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Tracing/Logging")]
    aws_sdk_tracing: bool,

    /// show span event tracing
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Tracing/Logging")]
    span_events_tracing: bool,

    /// disable ANSI terminal colors
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    disable_color_tracing: bool,

    /// maximum retry attempts of the AWS SDK retry handler
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, value_name = "max_attempts", help_heading = "Retry Options")]
    aws_max_attempts: u32,

    /// a multiplier value used when calculating backoff times as part of an exponential backoff with jitter strategy.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, value_name = "initial_backoff", help_heading = "Retry Options")]
    initial_backoff_milliseconds: u64,

    /// operation timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_timeout",
        help_heading = "Timeout Options"
    )]
    operation_timeout_milliseconds: Option<u64>,

    /// operation attempt timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_attempt_timeout",
        help_heading = "Timeout Options"
    )]
    operation_attempt_timeout_milliseconds: Option<u64>,

    /// connect timeout (milliseconds).
    /// The default has AWS SDK default timeout (Currently 3100 milliseconds).
    #[arg(
        long,
        env,
        value_name = "connect_timeout",
        help_heading = "Timeout Options"
    )]
    connect_timeout_milliseconds: Option<u64>,

    /// read timeout (milliseconds).
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "read_timeout",
        help_heading = "Timeout Options"
    )]
    read_timeout_milliseconds: Option<u64>,

    /// number of workers running operations concurrently
    #[arg(long, env, default_value_t = DEFAULT_WORKER_SIZE, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    worker_size: u16,

    /// spawn one worker per operation. --worker-size is ignored
    #[arg(long, env, default_value_t = DEFAULT_UNBOUNDED_WORKERS, help_heading = "Performance")]
    unbounded_workers: bool,

    /// interval (milliseconds) at which running operations are polled for completion
    #[arg(long, env, default_value_t = DEFAULT_POLL_INTERVAL_MILLISECONDS, value_parser = clap::value_parser!(u64).range(1..), value_name = "poll_interval", help_heading = "Performance")]
    poll_interval_milliseconds: u64,

    /// ACL for the uploaded objects
    /// valid choices: private | public-read | public-read-write | authenticated-read | aws-exec-read | bucket-owner-read | bucket-owner-full-control
    #[arg(long, env, value_parser = canned_acl::parse_canned_acl, help_heading = "Advanced")]
    acl: Option<String>,

    /// do not try to guess the mime type of local file
    #[arg(long, env, default_value_t = DEFAULT_NO_GUESS_MIME_TYPE, help_heading = "Advanced")]
    no_guess_mime_type: bool,

    /// maximum number of objects returned in a single list object request
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, value_parser = clap::value_parser!(i32).range(1..=32767), help_heading = "Advanced")]
    max_keys: i32,

    /// create the target bucket before the mirror starts
    #[arg(long, env, default_value_t = DEFAULT_CREATE_BUCKET, help_heading = "Advanced")]
    create_bucket: bool,

    /// generate a auto completions script. Valid values: bash, fish, zsh, powershell, elvish.
    #[arg(long, env, value_name = "SHELL", value_parser = clap_complete::shells::Shell::from_str, help_heading = "Advanced")]
    auto_complete_shell: Option<clap_complete::shells::Shell>,

    /// disable stalled stream protection
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "Advanced")]
    disable_stalled_stream_protection: bool,

    /// unit test purpose only
    #[arg(long, hide = true, default_value_t = false, help_heading = "Dangerous")]
    allow_both_local_storage: bool,
}

pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    crate::Config::try_from(config_args)
}

impl CLIArgs {
    fn validate_storage_config(
        &self,
        source: &StoragePath,
        target: &StoragePath,
    ) -> Result<(), String> {
        self.check_storage_conflict(source, target)?;
        self.check_local_storage(source, target)?;
        self.check_storage_credentials_conflict(source, target)?;
        self.check_acl_conflict(target)?;
        self.check_create_bucket_conflict(target)?;
        self.check_no_guess_mime_type_conflict(source)?;

        Ok(())
    }

    fn check_storage_conflict(
        &self,
        source: &StoragePath,
        target: &StoragePath,
    ) -> Result<(), String> {
        if storage_path::is_both_storage_s3(source, target) {
            return Err(BOTH_S3_STORAGE_SPECIFIED.to_string());
        }

        if !self.allow_both_local_storage && storage_path::is_both_storage_local(source, target) {
            return Err(NO_S3_STORAGE_SPECIFIED.to_string());
        }

        Ok(())
    }

    // A missing local directory is reported when the mirror starts.
    fn check_local_storage(
        &self,
        source: &StoragePath,
        target: &StoragePath,
    ) -> Result<(), String> {
        if let StoragePath::Local(path) = source {
            if path.exists() && !path.is_dir() {
                return Err(SOURCE_LOCAL_STORAGE_NOT_DIRECTORY.to_string());
            }
        }

        if let StoragePath::Local(path) = target {
            if path.exists() && !path.is_dir() {
                return Err(TARGET_LOCAL_STORAGE_NOT_DIRECTORY.to_string());
            }
        }

        Ok(())
    }

    fn check_storage_credentials_conflict(
        &self,
        source: &StoragePath,
        target: &StoragePath,
    ) -> Result<(), String> {
        if storage_path::is_both_storage_local(source, target)
            && (self.profile.is_some() || self.access_key.is_some())
        {
            return Err(NO_CREDENTIAL_REQUIRED.to_string());
        }

        Ok(())
    }

    fn check_acl_conflict(&self, target: &StoragePath) -> Result<(), String> {
        if self.acl.is_some() && target.is_local() {
            return Err(TARGET_LOCAL_STORAGE_SPECIFIED_WITH_ACL.to_string());
        }

        Ok(())
    }

    fn check_create_bucket_conflict(&self, target: &StoragePath) -> Result<(), String> {
        if self.create_bucket && target.is_local() {
            return Err(TARGET_LOCAL_STORAGE_SPECIFIED_WITH_CREATE_BUCKET.to_string());
        }

        Ok(())
    }

    fn check_no_guess_mime_type_conflict(&self, source: &StoragePath) -> Result<(), String> {
        if self.no_guess_mime_type && !source.is_local() {
            return Err(SOURCE_REMOTE_STORAGE_SPECIFIED_WITH_NO_GUESS_MIME_TYPE.to_string());
        }

        Ok(())
    }

    fn build_credential(&self) -> S3Credentials {
        if let Some(profile) = self.profile.clone() {
            return S3Credentials::Profile(profile);
        }

        match (self.access_key.clone(), self.secret_access_key.clone()) {
            (Some(access_key), Some(secret_access_key)) => S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key,
                    secret_access_key,
                    session_token: self.session_token.clone(),
                },
            },
            _ => S3Credentials::FromEnvironment,
        }
    }

    fn build_client_config(
        &self,
        source: &StoragePath,
        target: &StoragePath,
    ) -> Option<ClientConfig> {
        if storage_path::is_both_storage_local(source, target) {
            return None;
        }

        Some(ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential: self.build_credential(),
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            force_path_style: self.force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
        })
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let tracing_config = self
            .verbosity
            .log_level()
            .map(|log_level| TracingConfig {
                tracing_level: log_level,
                json_tracing: self.json_tracing,
                aws_sdk_tracing: self.aws_sdk_tracing,
                span_events_tracing: self.span_events_tracing,
                disable_color_tracing: self.disable_color_tracing,
            });

        if !self.dry_run {
            return tracing_config;
        }

        // dry run prints the plan through info level logs
        match tracing_config {
            None => Some(TracingConfig {
                tracing_level: log::Level::Info,
                json_tracing: DEFAULT_JSON_TRACING,
                aws_sdk_tracing: DEFAULT_AWS_SDK_TRACING,
                span_events_tracing: DEFAULT_SPAN_EVENTS_TRACING,
                disable_color_tracing: DEFAULT_DISABLE_COLOR_TRACING,
            }),
            Some(config) if config.tracing_level < log::Level::Info => Some(TracingConfig {
                tracing_level: log::Level::Info,
                ..config
            }),
            Some(config) => Some(config),
        }
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(value: CLIArgs) -> Result<Self, Self::Error> {
        let source = storage_path::parse_storage_path(&value.source)?;
        let target = storage_path::parse_storage_path(&value.target)?;
        value.validate_storage_config(&source, &target)?;

        let sync_policy = SyncPolicy {
            dry_run: value.dry_run,
            force: value.force,
            keep_conflicting: value.keep,
            no_delete: value.no_delete,
            move_items: value.move_items,
            report_level: value.report_level,
            no_progress: value.no_progress,
            quiet: value.verbosity.log_level().is_none(),
        };
        sync_policy.validate().map_err(|e| format!("{e}\n"))?;

        let executor_config = ExecutorConfig {
            max_concurrency: if value.unbounded_workers {
                None
            } else {
                Some(value.worker_size as usize)
            },
            poll_interval: Duration::from_millis(value.poll_interval_milliseconds),
        };
        executor_config.validate().map_err(|e| format!("{e}\n"))?;

        let comparer_config = ComparerConfig {
            conflict_policy: if value.assume_local_newer {
                ConflictPolicy::AssumeLocalNewer
            } else {
                ConflictPolicy::Fail
            },
            use_sidecar_hashes: value.use_md5_sidecar,
            generate_sidecar_hashes: value.generate_md5_sidecar,
        };

        let walker_config = WalkerConfig {
            follow_symlinks: value.follow_symlinks,
            ignore_file_name: value.ignore_file_name.clone(),
            sidecar_hashes: value.use_md5_sidecar || value.generate_md5_sidecar,
        };

        Ok(Config {
            remote_client_config: value.build_client_config(&source, &target),
            tracing_config: value.build_tracing_config(),
            source,
            target,
            sync_policy,
            comparer_config,
            walker_config,
            executor_config,
            canned_acl: value.acl,
            no_guess_mime_type: value.no_guess_mime_type,
            max_keys: value.max_keys,
            create_bucket: value.create_bucket,
            auto_complete_shell: value.auto_complete_shell,
            event_manager: EventManager::default(),
        })
    }
}
