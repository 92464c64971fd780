//! OTLP binding for `tracegen-core`.
//!
//! This is the only crate in the workspace that imports a real
//! `opentelemetry`/`opentelemetry_sdk`/`opentelemetry-otlp` crate --
//! `tracegen-core` only ever sees the opaque [`tracegen_core::SpanExporter`]
//! trait, exactly as `spec.md` §6 requires. [`OtlpSpanExporter`] translates
//! a synthetic [`tracegen_core::SpanRecord`] into a real OTLP span by
//! driving the SDK's own `Tracer`/`Span` API with explicit trace and span
//! ids, rather than letting the SDK generate its own -- the whole point of
//! this generator is that every id is the one the scenario engine chose.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use opentelemetry::trace::{
    SpanBuilder, SpanContext, SpanId as OtelSpanId, SpanKind as OtelSpanKind, Status,
    TraceContextExt, TraceFlags, TraceId as OtelTraceId, TraceState, Tracer, TracerProvider,
};
use opentelemetry::{Context as OtelContext, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use thiserror::Error;

use tracegen_core::{
    AttributeValue, ExporterError, SpanEvent, SpanExporter, SpanKind, SpanLink, SpanRecord,
    SpanStatus,
};

#[derive(Error, Debug)]
pub enum OtlpInitError {
    #[error("failed to build OTLP span exporter: {0}")]
    ExporterBuild(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to start the background tokio runtime OTLP export needs: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Owns the SDK tracer provider and the background tokio runtime the batch
/// span processor needs to actually flush over gRPC. Both live for as long
/// as the exporter does; dropping this value blocks briefly while the
/// provider drains its final batch.
pub struct OtlpSpanExporter {
    provider: SdkTracerProvider,
    service_name: String,
    _runtime: tokio::runtime::Runtime,
}

impl OtlpSpanExporter {
    /// Build an exporter that sends spans to `endpoint` (e.g.
    /// `http://localhost:4317`) over OTLP/gRPC, tagging every span's
    /// resource with `service_name`.
    pub fn new(endpoint: &str, service_name: impl Into<String>) -> Result<Self, OtlpInitError> {
        let service_name = service_name.into();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(OtlpInitError::Runtime)?;
        let _guard = runtime.enter();

        let span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| OtlpInitError::ExporterBuild(Box::new(e)))?;

        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", service_name.clone()))
            .build();

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource)
            .build();

        Ok(OtlpSpanExporter {
            provider,
            service_name,
            _runtime: runtime,
        })
    }

    fn tracer(&self) -> opentelemetry_sdk::trace::Tracer {
        self.provider.tracer(self.service_name.clone())
    }
}

impl SpanExporter for OtlpSpanExporter {
    fn export(&self, span: SpanRecord) -> Result<(), ExporterError> {
        let _guard = self._runtime.enter();
        let tracer = self.tracer();

        let span_context = SpanContext::new(
            OtelTraceId::from_bytes(span.trace_id.to_bytes()),
            OtelSpanId::from_bytes(span.span_id.to_bytes()),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let parent_cx = if span.parent_span_id.is_zero() {
            OtelContext::new()
        } else {
            let parent_context = SpanContext::new(
                OtelTraceId::from_bytes(span.trace_id.to_bytes()),
                OtelSpanId::from_bytes(span.parent_span_id.to_bytes()),
                TraceFlags::SAMPLED,
                true,
                TraceState::default(),
            );
            OtelContext::new().with_remote_span_context(parent_context)
        };

        let builder = SpanBuilder::from_name(span.name.clone())
            .with_trace_id(span_context.trace_id())
            .with_span_id(span_context.span_id())
            .with_span_kind(to_otel_kind(span.kind))
            .with_start_time(nanos_to_system_time(span.start_time_ns))
            .with_end_time(nanos_to_system_time(span.end_time_ns))
            .with_attributes(
                span.attributes
                    .iter()
                    .map(|(k, v)| to_key_value(k, v))
                    .collect::<Vec<_>>(),
            )
            .with_links(span.links.iter().map(to_link).collect::<Vec<_>>())
            .with_status(to_status(&span.status));

        let mut otel_span = tracer.build_with_context(builder, &parent_cx);
        for event in &span.events {
            record_event(&mut otel_span, event);
        }
        otel_span.end_with_timestamp(nanos_to_system_time(span.end_time_ns));

        Ok(())
    }
}

fn to_otel_kind(kind: SpanKind) -> OtelSpanKind {
    match kind {
        SpanKind::Internal => OtelSpanKind::Internal,
        SpanKind::Server => OtelSpanKind::Server,
        SpanKind::Client => OtelSpanKind::Client,
        SpanKind::Producer => OtelSpanKind::Producer,
        SpanKind::Consumer => OtelSpanKind::Consumer,
    }
}

fn to_status(status: &SpanStatus) -> Status {
    match status {
        SpanStatus::Ok => Status::Ok,
        SpanStatus::Error { message } => Status::error(message.clone()),
    }
}

fn to_link(link: &SpanLink) -> opentelemetry::trace::Link {
    let context = SpanContext::new(
        OtelTraceId::from_bytes(link.trace_id.to_bytes()),
        OtelSpanId::from_bytes(link.span_id.to_bytes()),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    );
    opentelemetry::trace::Link::new(context, Vec::new(), 0)
}

fn record_event(span: &mut impl opentelemetry::trace::Span, event: &SpanEvent) {
    let attributes = event
        .attributes
        .iter()
        .map(|(k, v)| to_key_value(k, v))
        .collect::<Vec<_>>();
    span.add_event_with_timestamp(
        event.name.clone(),
        nanos_to_system_time(event.timestamp_ns),
        attributes,
    );
}

fn to_key_value(key: &str, value: &AttributeValue) -> KeyValue {
    match value {
        AttributeValue::Bool(b) => KeyValue::new(key.to_string(), *b),
        AttributeValue::Int(i) => KeyValue::new(key.to_string(), *i),
        AttributeValue::Float(f) => KeyValue::new(key.to_string(), *f),
        AttributeValue::String(s) => KeyValue::new(key.to_string(), s.clone()),
        AttributeValue::List(_) => KeyValue::new(key.to_string(), value.to_string()),
    }
}

fn nanos_to_system_time(nanos: u128) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
}

impl Drop for OtlpSpanExporter {
    fn drop(&mut self) {
        let _guard = self._runtime.enter();
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(error = %e, "OTLP tracer provider shutdown reported an error");
        }
    }
}
