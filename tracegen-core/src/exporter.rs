//! The emission sink: the engine's only view of the outside world.
//!
//! `spec.md` §6 treats the exporter as an opaque function accepting a
//! structured span record; the core never knows whether the wire format is
//! OTLP, stdout, or something else. `tracegen-otlp` provides the real OTLP
//! binding; [`StdoutSpanExporter`] here is the reference implementation
//! used for local dry runs and in the engine's own tests.

use std::collections::HashMap;
use std::fmt;

use crate::error::ExporterError;
use crate::ids::{SpanId, TraceId};
use crate::model::SpanKind;

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp_ns: u128,
    pub attributes: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone)]
pub struct SpanLink {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error { message: String },
}

/// The wire-agnostic span record handed to the exporter, matching the
/// schema in `spec.md` §6 exactly.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: SpanId,
    pub name: String,
    pub kind: SpanKind,
    pub service: String,
    pub start_time_ns: u128,
    pub end_time_ns: u128,
    pub attributes: HashMap<String, AttributeValue>,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
    pub status: SpanStatus,
}

/// Accepts completed spans. Implementations are expected to translate to
/// OTLP or an equivalent wire format; the core does not know or care which.
pub trait SpanExporter: Send + Sync {
    fn export(&self, span: SpanRecord) -> Result<(), ExporterError>;
}

/// Reference exporter: logs one line per span via `tracing`. Useful for
/// dry runs and as the default in tests that only care about the engine's
/// own behaviour, not the wire format.
#[derive(Debug, Default)]
pub struct StdoutSpanExporter;

impl SpanExporter for StdoutSpanExporter {
    fn export(&self, span: SpanRecord) -> Result<(), ExporterError> {
        tracing::info!(
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = %span.parent_span_id,
            service = %span.service,
            name = %span.name,
            kind = ?span.kind,
            duration_ms = (span.end_time_ns - span.start_time_ns) / 1_000_000,
            status = ?span.status,
            "span exported"
        );
        Ok(())
    }
}

/// Collects every span it receives, in arrival order. Used by the engine's
/// own end-to-end tests to assert on temporal nesting, identifier
/// discipline, and link consistency without standing up real OTLP.
#[derive(Default)]
pub struct RecordingExporter {
    pub spans: std::sync::Mutex<Vec<SpanRecord>>,
}

impl SpanExporter for RecordingExporter {
    fn export(&self, span: SpanRecord) -> Result<(), ExporterError> {
        self.spans.lock().expect("recording exporter mutex poisoned").push(span);
        Ok(())
    }
}
