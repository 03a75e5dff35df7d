use async_channel::Sender;
use async_trait::async_trait;
use tracing::trace;

use crate::executor::operation::OperationKind;
use crate::types::SyncStatistics;
use crate::types::event_callback::{BatchEvent, EventCallback};

/// Forwards batch events to the statistics channel read by the progress
/// indicator.
pub struct StatsReporter {
    stats_sender: Sender<SyncStatistics>,
}

impl StatsReporter {
    pub fn new(stats_sender: Sender<SyncStatistics>) -> Self {
        Self { stats_sender }
    }

    async fn send_stats(&self, stats: SyncStatistics) {
        // the receiver may already be gone when the indicator is disabled
        let _ = self.stats_sender.send(stats).await;
    }
}

#[async_trait]
impl EventCallback for StatsReporter {
    async fn on_event(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Progress {
                newly_completed, ..
            } => {
                for item in newly_completed {
                    match item.operation {
                        OperationKind::Upload | OperationKind::Download => {
                            self.send_stats(SyncStatistics::SyncBytes(item.bytes)).await;
                            self.send_stats(SyncStatistics::SyncComplete { key: item.key })
                                .await;
                        }
                        OperationKind::Delete | OperationKind::DeleteLocal => {
                            self.send_stats(SyncStatistics::SyncDelete { key: item.key })
                                .await;
                        }
                        _ => {}
                    }
                }
            }
            BatchEvent::Error { key, .. } => {
                self.send_stats(SyncStatistics::SyncError { key }).await;
            }
            _ => {
                trace!(event_type = ?event.event_type(), "batch event.");
            }
        }
    }
}
