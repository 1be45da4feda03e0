//! Listener counters shared by the scan and dispatch tasks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`ListenerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ranges_scanned: u64,
    pub logs_fetched: u64,
    pub fetch_retries: u64,
    pub decode_errors: u64,
    pub events_enqueued: u64,
    pub events_dropped: u64,
    pub checkpoint_write_errors: u64,
    pub events_delivered: u64,
    pub sink_errors: u64,
}

/// Lock-free counters for one listener instance.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    ranges_scanned: AtomicU64,
    logs_fetched: AtomicU64,
    fetch_retries: AtomicU64,
    decode_errors: AtomicU64,
    events_enqueued: AtomicU64,
    events_dropped: AtomicU64,
    checkpoint_write_errors: AtomicU64,
    events_delivered: AtomicU64,
    sink_errors: AtomicU64,
}

macro_rules! counter {
    ($($fn:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $fn(&self, n: u64) {
                self.$field.fetch_add(n, Ordering::Relaxed);
            }
        )*
    };
}

impl ListenerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        record_range => ranges_scanned,
        record_logs => logs_fetched,
        record_retry => fetch_retries,
        record_decode_error => decode_errors,
        record_enqueued => events_enqueued,
        record_dropped => events_dropped,
        record_checkpoint_error => checkpoint_write_errors,
        record_delivered => events_delivered,
        record_sink_error => sink_errors,
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ranges_scanned: self.ranges_scanned.load(Ordering::Relaxed),
            logs_fetched: self.logs_fetched.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            events_enqueued: self.events_enqueued.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            checkpoint_write_errors: self.checkpoint_write_errors.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = ListenerMetrics::new();
        m.record_logs(5);
        m.record_logs(2);
        m.record_dropped(1);
        let s = m.snapshot();
        assert_eq!(s.logs_fetched, 7);
        assert_eq!(s.events_dropped, 1);
        assert_eq!(s.sink_errors, 0);
    }
}
