//! `tracegen`: bootstrap binary for the synthetic distributed trace
//! generator. Reads configuration and a scenario directory from the
//! environment, wires up an exporter, and runs the worker pool until
//! interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracegen_core::{
    load_scenario_dir, Config, ContextStore, InMemoryTraceStore, Stats, WorkerPoolConfig,
};
use tracing_subscriber::prelude::*;

mod exporter_select;

/// Capacity of the default in-process [`InMemoryTraceStore`]. `spec.md` §6
/// leaves the store's own sizing to the implementer; this is independent of
/// `CONTEXT_STORE_MAX_SIZE`, which bounds the unrelated cross-trace link
/// registry.
const DEFAULT_TRACE_STORE_CAPACITY: usize = 1000;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("tracegen: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let scenario_set = match load_scenario_dir(&config.scenarios_dir) {
        Ok(set) => set,
        Err(errors) => {
            eprintln!(
                "tracegen: {} problem(s) found in {}:",
                errors.len(),
                config.scenarios_dir
            );
            for error in &errors {
                eprintln!("  - {error}");
            }
            std::process::exit(1);
        }
    };

    tracing::info!(
        scenarios = scenario_set.scenarios.len(),
        rng_seed = config.rng_seed,
        workers = config.trace_num_workers,
        "starting trace generator"
    );

    let exporter = match exporter_select::build_exporter() {
        Ok(e) => e,
        Err(msg) => {
            eprintln!("tracegen: {msg}");
            std::process::exit(1);
        }
    };

    let context_store = ContextStore::new(config.context_store_max_size);
    let trace_store = InMemoryTraceStore::new(DEFAULT_TRACE_STORE_CAPACITY);
    let stats = Stats::default();
    let shutdown = Arc::new(AtomicBool::new(false));

    let shutdown_handle = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested, finishing in-flight traces");
        shutdown_handle.store(true, Ordering::Relaxed);
    })
    .expect("failed to install Ctrl-C handler");

    let pool_config = WorkerPoolConfig {
        num_workers: config.trace_num_workers,
        trace_interval_min_ms: config.trace_interval_min_ms,
        trace_interval_max_ms: config.trace_interval_max_ms,
        max_template_iterations: config.max_template_iterations,
        rng_seed: config.rng_seed,
    };

    tracegen_core::run_worker_pool(
        &pool_config,
        &scenario_set.scenarios,
        exporter.as_ref(),
        &context_store,
        Some(&trace_store),
        &stats,
        &shutdown,
    );

    let snapshot = stats.snapshot();
    tracing::info!(
        traces_emitted = snapshot.traces_emitted,
        traces_aborted_unresolved_template = snapshot.traces_aborted_unresolved_template,
        traces_aborted_exporter_error = snapshot.traces_aborted_exporter_error,
        "trace generator stopped"
    );
}
