//! Persistence contract (`spec.md` §6): consumed, not implemented, by the
//! core. The generator may hand finished trace records to a store behind
//! this three-method interface; an in-process ring buffer and an external
//! analytical database are equally acceptable, and the engine never
//! depends on which one is wired in.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::exporter::SpanRecord;
use crate::ids::TraceId;

/// A trace's full set of spans, as handed to the store once the trace
/// completes (or aborts).
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub trace_id: TraceId,
    pub scenario_name: String,
    pub spans: Vec<SpanRecord>,
}

pub trait TraceStore: Send + Sync {
    fn add(&self, record: TraceRecord);
    fn fetch_recent(&self, limit: usize) -> Vec<TraceRecord>;
    fn health_check(&self) -> bool;
}

/// Bounded in-process ring buffer: the simplest implementation that
/// satisfies the contract, suitable for local dry runs and tests. Oldest
/// records are dropped once `capacity` is reached.
pub struct InMemoryTraceStore {
    inner: Mutex<VecDeque<TraceRecord>>,
    capacity: usize,
}

impl InMemoryTraceStore {
    pub fn new(capacity: usize) -> Self {
        InMemoryTraceStore {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }
}

impl TraceStore for InMemoryTraceStore {
    fn add(&self, record: TraceRecord) {
        let mut inner = self.inner.lock().expect("trace store mutex poisoned");
        if inner.len() >= self.capacity {
            inner.pop_front();
        }
        inner.push_back(record);
    }

    fn fetch_recent(&self, limit: usize) -> Vec<TraceRecord> {
        let inner = self.inner.lock().expect("trace store mutex poisoned");
        inner.iter().rev().take(limit).cloned().collect()
    }

    fn health_check(&self) -> bool {
        true
    }
}
