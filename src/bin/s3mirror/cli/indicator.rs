use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3mirror::types::SyncStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;
const REFRESH_INTERVAL: f32 = 1.0;

#[derive(Default)]
struct Totals {
    transferred: u64,
    bytes: u64,
    deleted: u64,
    skipped: u64,
    errors: u64,
}

impl Totals {
    fn add(&mut self, sync_stats: SyncStatistics) -> (u64, u64) {
        match sync_stats {
            SyncStatistics::SyncComplete { .. } => {
                self.transferred += 1;
                return (1, 0);
            }
            SyncStatistics::SyncBytes(size) => {
                self.bytes += size;
                return (0, size);
            }
            SyncStatistics::SyncDelete { .. } => self.deleted += 1,
            SyncStatistics::SyncSkip { .. } => self.skipped += 1,
            SyncStatistics::SyncError { .. } => self.errors += 1,
        }
        (0, 0)
    }

    fn message(&self, bytes_per_sec: u64, objects_per_sec: u64) -> String {
        format!(
            "{:>3} | {:>3}/sec,  transferred {:>3} files | {:>3} files/sec,  deleted {} files,  skipped {} files,  error {} files",
            HumanBytes(self.bytes),
            HumanBytes(bytes_per_sec),
            self.transferred,
            HumanCount(objects_per_sec),
            self.deleted,
            self.skipped,
            self.errors,
        )
    }
}

/// Reads the statistics channel until it is closed and renders a one line
/// progress message once per second.
pub fn show_indicator(
    stats_receiver: Receiver<SyncStatistics>,
    show_progress: bool,
    show_result: bool,
    log_sync_summary: bool,
    dry_run: bool,
) -> JoinHandle<()> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_synced_bytes = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut ma_synced_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut totals = Totals::default();

        loop {
            let mut sync_bytes: u64 = 0;
            let mut sync_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(sync_stats) = stats_receiver.try_recv() {
                    let (count, bytes) = totals.add(sync_stats);
                    sync_count += count;
                    sync_bytes += bytes;
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    let elapsed = start_time.elapsed();
                    let elapsed_secs_f64 = elapsed.as_secs_f64();

                    let (objects_per_sec, bytes_per_sec) = if dry_run {
                        (0, 0)
                    } else if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                        (totals.transferred, totals.bytes)
                    } else {
                        (
                            (totals.transferred as f64 / elapsed_secs_f64) as u64,
                            (totals.bytes as f64 / elapsed_secs_f64) as u64,
                        )
                    };

                    if log_sync_summary {
                        info!(
                            message = "mirror summary",
                            transferred_byte = totals.bytes,
                            transferred_byte_per_sec = bytes_per_sec,
                            transferred_file = totals.transferred,
                            transferred_file_per_sec = objects_per_sec,
                            deleted = totals.deleted,
                            skipped = totals.skipped,
                            error = totals.errors,
                            duration_sec = elapsed_secs_f64,
                        );
                    }

                    if show_result {
                        if let Ok(result_style) = ProgressStyle::with_template("{msg}") {
                            progress_text.set_style(result_style);
                        }
                        progress_text.finish_with_message(format!(
                            "{},  duration {}",
                            totals.message(bytes_per_sec, objects_per_sec),
                            HumanDuration(elapsed),
                        ));

                        println!();
                        let _ = io::stdout().flush();
                    }

                    return;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }
            ma_synced_bytes.add_sample(sync_bytes);

            if !dry_run {
                ma_synced_count.add_sample(sync_count);
            }

            if show_progress {
                progress_text.set_message(
                    totals.message(ma_synced_bytes.get_average(), ma_synced_count.get_average()),
                );
            }
        }
    })
}
