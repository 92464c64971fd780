//! Worker pool (`spec.md` §5).
//!
//! Mirrors the teacher's own `stress` throughput harness: a fixed number of
//! `std::thread` workers spawned inside a `thread::scope`, each running its
//! own tight loop, with shutdown communicated through a shared
//! `AtomicBool` that is only ever checked between traces -- never
//! mid-trace, so a trace already in flight always finishes and exports in
//! full.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::context_store::ContextStore;
use crate::engine::TraceEngine;
use crate::exporter::SpanExporter;
use crate::model::Scenario;
use crate::rng::worker_rng;
use crate::selector::select_weighted;
use crate::stats::Stats;
use crate::store::TraceStore;

/// Fixed parameters a running worker pool needs for the lifetime of the
/// process; built once from [`crate::config::Config`].
pub struct WorkerPoolConfig {
    pub num_workers: u32,
    pub trace_interval_min_ms: u64,
    pub trace_interval_max_ms: u64,
    pub max_template_iterations: usize,
    pub rng_seed: u64,
}

/// Run the worker pool until `shutdown` is set. Blocks the calling thread
/// for the pool's entire lifetime; intended to be called directly from
/// `main`. `trace_store`, if given, receives every completed trace as one
/// [`crate::store::TraceRecord`] in addition to the span-by-span export.
pub fn run(
    config: &WorkerPoolConfig,
    scenarios: &[Scenario],
    exporter: &(dyn SpanExporter + Sync),
    context_store: &ContextStore,
    trace_store: Option<&(dyn TraceStore + Sync)>,
    stats: &Stats,
    shutdown: &Arc<AtomicBool>,
) {
    thread::scope(|scope| {
        for index in 0..config.num_workers {
            let shutdown = Arc::clone(shutdown);
            scope.spawn(move || {
                worker_loop(
                    index,
                    config,
                    scenarios,
                    exporter,
                    context_store,
                    trace_store,
                    stats,
                    &shutdown,
                );
            });
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    index: u32,
    config: &WorkerPoolConfig,
    scenarios: &[Scenario],
    exporter: &(dyn SpanExporter + Sync),
    context_store: &ContextStore,
    trace_store: Option<&(dyn TraceStore + Sync)>,
    stats: &Stats,
    shutdown: &AtomicBool,
) {
    let mut rng = worker_rng(config.rng_seed, index);
    let mut engine = TraceEngine::new(exporter, context_store, stats, config.max_template_iterations);
    if let Some(store) = trace_store {
        engine = engine.with_trace_store(store);
    }

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let scenario = select_weighted(scenarios, &mut rng);
        if let Err(e) = engine.run_trace(scenario, &mut rng) {
            tracing::warn!(worker = index, scenario = %scenario.name, error = %e, "trace aborted");
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let interval_ms = if config.trace_interval_max_ms > config.trace_interval_min_ms {
            rng.random_range(config.trace_interval_min_ms..=config.trace_interval_max_ms)
        } else {
            config.trace_interval_min_ms
        };
        thread::sleep(Duration::from_millis(interval_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::RecordingExporter;
    use crate::model::SpanKind;
    use crate::model::SpanNode;

    fn scenario() -> Scenario {
        Scenario {
            name: "s".to_string(),
            weight: 1,
            vars: Vec::new(),
            root_span: SpanNode {
                service: "svc".to_string(),
                operation: "op".to_string(),
                kind: SpanKind::Internal,
                delay_ms: (0, 0),
                attributes: Vec::new(),
                events: Vec::new(),
                error_conditions: Vec::new(),
                export_context_as: None,
                link_from_context: None,
                calls: Vec::new(),
            },
        }
    }

    #[test]
    fn pool_stops_promptly_once_shutdown_is_signalled() {
        let exporter = RecordingExporter::default();
        let store = ContextStore::new(10);
        let stats = Stats::default();
        let shutdown = Arc::new(AtomicBool::new(false));
        let scenarios = vec![scenario()];
        let config = WorkerPoolConfig {
            num_workers: 2,
            trace_interval_min_ms: 0,
            trace_interval_max_ms: 0,
            max_template_iterations: 10,
            rng_seed: 1,
        };

        let shutdown_clone = Arc::clone(&shutdown);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            shutdown_clone.store(true, Ordering::Relaxed);
        });

        run(&config, &scenarios, &exporter, &store, None, &stats, &shutdown);

        assert!(!exporter.spans.lock().unwrap().is_empty());
    }

    #[test]
    fn pool_hands_completed_traces_to_the_configured_trace_store() {
        use crate::store::InMemoryTraceStore;

        let exporter = RecordingExporter::default();
        let context_store = ContextStore::new(10);
        let trace_store = InMemoryTraceStore::new(10);
        let stats = Stats::default();
        let shutdown = Arc::new(AtomicBool::new(false));
        let scenarios = vec![scenario()];
        let config = WorkerPoolConfig {
            num_workers: 1,
            trace_interval_min_ms: 0,
            trace_interval_max_ms: 0,
            max_template_iterations: 10,
            rng_seed: 1,
        };

        let shutdown_clone = Arc::clone(&shutdown);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            shutdown_clone.store(true, Ordering::Relaxed);
        });

        run(
            &config,
            &scenarios,
            &exporter,
            &context_store,
            Some(&trace_store),
            &stats,
            &shutdown,
        );

        assert!(!trace_store.fetch_recent(10).is_empty());
    }
}
