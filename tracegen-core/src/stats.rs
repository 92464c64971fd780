//! Process-lifetime counters for the "log it, count it, move on" failure
//! paths in `spec.md` §4.4/§7. Not a metrics-exporter pipeline -- the spec
//! never mentions the metrics pillar -- just enough visibility for the
//! pool to report its own health, in the spirit of the teacher's own
//! stress-test throughput counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    traces_emitted: AtomicU64,
    traces_aborted_unresolved_template: AtomicU64,
    traces_aborted_exporter_error: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub traces_emitted: u64,
    pub traces_aborted_unresolved_template: u64,
    pub traces_aborted_exporter_error: u64,
}

impl Stats {
    pub fn record_trace_emitted(&self) {
        self.traces_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unresolved_template(&self) {
        self.traces_aborted_unresolved_template
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exporter_error(&self) {
        self.traces_aborted_exporter_error
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            traces_emitted: self.traces_emitted.load(Ordering::Relaxed),
            traces_aborted_unresolved_template: self
                .traces_aborted_unresolved_template
                .load(Ordering::Relaxed),
            traces_aborted_exporter_error: self
                .traces_aborted_exporter_error
                .load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let stats = Stats::default();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        stats.record_trace_emitted();
        stats.record_unresolved_template();
        let snap = stats.snapshot();
        assert_eq!(snap.traces_emitted, 1);
        assert_eq!(snap.traces_aborted_unresolved_template, 1);
    }
}
