use anyhow::{Result, anyhow};
use tokio::time::Instant;
use tracing::{error, info, trace, warn};

use s3mirror::Config;
use s3mirror::pipeline::Pipeline;
use s3mirror::types::error::is_configuration_error;
use s3mirror::types::token::create_pipeline_cancellation_token;

use ctrl_c_handler::CtrlCHandler;

mod ctrl_c_handler;
mod indicator;
mod ui_config;

pub const EXIT_CODE_SUCCESS: i32 = 0;
#[allow(dead_code)]
pub const EXIT_CODE_ERROR: i32 = 1;
pub const EXIT_CODE_INVALID_ARGS: i32 = 2;
pub const EXIT_CODE_CANCELLED: i32 = 3;

/// Runs one mirror and returns the process exit code. Failures other than
/// cancellation and configuration errors are returned as `Err`, which exits
/// with `EXIT_CODE_ERROR`.
pub async fn run(config: Config) -> Result<i32> {
    let cancellation_token = create_pipeline_cancellation_token();

    let signal_handler = CtrlCHandler::spawn(cancellation_token.clone());

    let start_time = Instant::now();
    trace!("mirror pipeline start.");

    let mut pipeline = Pipeline::new(config.clone(), cancellation_token).await;
    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
        ui_config::is_log_sync_summary_needed(&config),
        config.sync_policy.dry_run,
    );

    pipeline.run().await;
    indicator_join_handle.await?;
    let interrupted_by_user = signal_handler.finish().await;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

    if pipeline.has_cancelled() {
        warn!(
            duration_sec = duration_sec,
            interrupted_by_user = interrupted_by_user,
            "s3mirror has been cancelled."
        );
        return Ok(EXIT_CODE_CANCELLED);
    }

    if pipeline.has_error() {
        let errors = pipeline.get_errors_and_consume().unwrap_or_default();
        if errors.iter().any(is_configuration_error) {
            for e in &errors {
                eprintln!("{e}");
            }
            return Ok(EXIT_CODE_INVALID_ARGS);
        }

        error!(duration_sec = duration_sec, "s3mirror failed.");
        return Err(anyhow!("s3mirror failed."));
    }

    if let Some(summary) = pipeline.get_sync_summary() {
        info!(
            transferred = summary.transferred,
            deleted = summary.deleted,
            moved = summary.moved,
            skipped = summary.skipped,
            bytes_transferred = summary.bytes_transferred,
            dry_run = summary.dry_run,
            duration_sec = duration_sec,
            "s3mirror has been completed."
        );
    }

    Ok(EXIT_CODE_SUCCESS)
}
