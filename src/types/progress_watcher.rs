use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Cumulative byte counter against a known total. Shared through `Arc`.
#[derive(Debug)]
pub struct BytesProgressWatcher {
    bytes_transferred: AtomicU64,
    bytes_total: AtomicU64,
    start_time: Instant,
}

impl BytesProgressWatcher {
    pub fn new(bytes_total: u64) -> Self {
        Self {
            bytes_transferred: AtomicU64::new(0),
            bytes_total: AtomicU64::new(bytes_total),
            start_time: Instant::now(),
        }
    }

    pub fn update(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn add_total(&self, bytes: u64) {
        self.bytes_total.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::SeqCst)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_transferred() >= self.bytes_total()
    }

    pub fn transfer_rate_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_transferred() as f64 / elapsed
    }

    pub fn is_eta_available(&self) -> bool {
        self.transfer_rate_per_second() > 0.0
    }

    pub fn eta_seconds(&self) -> Option<u64> {
        let rate = self.transfer_rate_per_second();
        if rate <= 0.0 {
            return None;
        }

        let remaining = self.bytes_total().saturating_sub(self.bytes_transferred());
        Some((remaining as f64 / rate).ceil() as u64)
    }
}

impl Default for BytesProgressWatcher {
    fn default() -> Self {
        Self::new(0)
    }
}
