//! Scenario-driven synthetic distributed trace generator.
//!
//! This crate is the wire-agnostic core: it validates declarative scenario
//! trees, resolves their `{{ ... }}` templates, walks them into
//! [`exporter::SpanRecord`]s with realistic nesting and timing, and runs a
//! pool of workers that keep doing this until told to stop. It never
//! touches a network socket -- that's `tracegen-otlp`'s job, through the
//! [`exporter::SpanExporter`] trait defined here.

pub mod clock;
pub mod config;
pub mod context_store;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod ids;
pub mod model;
pub mod rng;
pub mod selector;
pub mod stats;
pub mod store;
pub mod template;
pub mod validator;
pub mod worker;

pub use config::{Config, ConfigError};
pub use context_store::ContextStore;
pub use engine::TraceEngine;
pub use error::{ExporterError, TraceError, UnresolvedTemplate, ValidationError};
pub use exporter::{AttributeValue, SpanEvent, SpanExporter, SpanLink, SpanRecord, SpanStatus};
pub use ids::{SpanId, TraceId};
pub use model::{Scenario, ScenarioSet, SpanKind, SpanNode};
pub use stats::{Stats, StatsSnapshot};
pub use store::{InMemoryTraceStore, TraceRecord, TraceStore};
pub use validator::load_scenario_dir;
pub use worker::{WorkerPoolConfig, run as run_worker_pool};
