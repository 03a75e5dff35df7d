use async_trait::async_trait;
use bitflags::bitflags;

use crate::executor::operation::OperationKind;
use crate::types::token::PipelineCancellationToken;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct EventType: u64 {
        const UNDEFINED = 0u64;
        const BATCH_STARTED = 1u64 << 1;
        const BATCH_PROGRESS = 1u64 << 2;
        const BATCH_COMPLETED = 1u64 << 3;
        const BATCH_CANCELLED = 1u64 << 4;
        const BATCH_ERROR = 1u64 << 5;

        const BATCH_TERMINATED = Self::BATCH_COMPLETED.bits()
            | Self::BATCH_CANCELLED.bits()
            | Self::BATCH_ERROR.bits();
        const ALL_EVENTS  = !0;
    }
}

/// Snapshot of a batch, emitted on every poll tick.
#[derive(Debug, Clone)]
pub struct ProgressStatus {
    pub completed_count: usize,
    pub total_count: usize,
    pub bytes_completed: u64,
    pub bytes_total: u64,
    pub cancellation_token: PipelineCancellationToken,
}

impl ProgressStatus {
    /// Byte based when sizes are known, count based otherwise.
    pub fn percent(&self) -> f64 {
        if 0 < self.bytes_total {
            return self.bytes_completed as f64 * 100.0 / self.bytes_total as f64;
        }
        if 0 < self.total_count {
            return self.completed_count as f64 * 100.0 / self.total_count as f64;
        }
        100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedItem {
    pub task_id: usize,
    pub key: String,
    pub operation: OperationKind,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        total: usize,
        bytes_total: u64,
    },
    Progress {
        status: ProgressStatus,
        newly_completed: Vec<CompletedItem>,
    },
    Completed {
        status: ProgressStatus,
    },
    Cancelled {
        completed: usize,
        status: ProgressStatus,
    },
    Error {
        key: String,
        message: String,
        completed: usize,
    },
}

impl BatchEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            BatchEvent::Started { .. } => EventType::BATCH_STARTED,
            BatchEvent::Progress { .. } => EventType::BATCH_PROGRESS,
            BatchEvent::Completed { .. } => EventType::BATCH_COMPLETED,
            BatchEvent::Cancelled { .. } => EventType::BATCH_CANCELLED,
            BatchEvent::Error { .. } => EventType::BATCH_ERROR,
        }
    }

    pub fn is_terminal(&self) -> bool {
        EventType::BATCH_TERMINATED.contains(self.event_type())
    }
}

#[async_trait]
pub trait EventCallback {
    // Called serially from the polling task. Must return promptly.
    async fn on_event(&mut self, event: BatchEvent);
}

#[cfg(test)]
mod tests {
    use crate::types::token::create_pipeline_cancellation_token;

    use super::*;

    fn status(
        completed_count: usize,
        total_count: usize,
        bytes: u64,
        total: u64,
    ) -> ProgressStatus {
        ProgressStatus {
            completed_count,
            total_count,
            bytes_completed: bytes,
            bytes_total: total,
            cancellation_token: create_pipeline_cancellation_token(),
        }
    }

    #[test]
    fn percent_uses_bytes_when_known() {
        assert_eq!(status(1, 4, 50, 200).percent(), 25.0);
    }

    #[test]
    fn percent_falls_back_to_count() {
        assert_eq!(status(1, 4, 0, 0).percent(), 25.0);
        assert_eq!(status(0, 0, 0, 0).percent(), 100.0);
    }

    #[test]
    fn terminal_events() {
        assert!(!BatchEvent::Started { total: 1, bytes_total: 0 }.is_terminal());
        assert!(
            BatchEvent::Completed {
                status: status(1, 1, 0, 0)
            }
            .is_terminal()
        );
        assert!(
            BatchEvent::Error {
                key: "a".to_string(),
                message: "failed".to_string(),
                completed: 0
            }
            .is_terminal()
        );
        assert_eq!(
            BatchEvent::Cancelled {
                completed: 0,
                status: status(0, 1, 0, 0)
            }
            .event_type(),
            EventType::BATCH_CANCELLED
        );
    }
}
