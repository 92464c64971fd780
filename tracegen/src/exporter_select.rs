//! Chooses and constructs the configured [`SpanExporter`] implementation.
//!
//! `spec.md` §6 only commits to the exporter being swappable; it does not
//! mandate a selection mechanism, so this binary reads a small, separate
//! set of env vars (distinct from the core's own `Config`) naming which
//! exporter to build.

use std::env;

use tracegen_core::exporter::{RecordingExporter, StdoutSpanExporter};
use tracegen_core::SpanExporter;
use tracegen_otlp::OtlpSpanExporter;

/// Build the exporter named by `TRACEGEN_EXPORTER` (`stdout` by default,
/// or `otlp`, which additionally reads `OTLP_ENDPOINT` and
/// `OTLP_SERVICE_NAME`).
pub fn build_exporter() -> Result<Box<dyn SpanExporter + Sync>, String> {
    match env::var("TRACEGEN_EXPORTER").unwrap_or_else(|_| "stdout".to_string()).as_str() {
        "stdout" => Ok(Box::new(StdoutSpanExporter)),
        "otlp" => {
            let endpoint = env::var("OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string());
            let service_name =
                env::var("OTLP_SERVICE_NAME").unwrap_or_else(|_| "tracegen".to_string());
            let exporter = OtlpSpanExporter::new(&endpoint, service_name)
                .map_err(|e| format!("failed to initialize OTLP exporter: {e}"))?;
            Ok(Box::new(exporter))
        }
        "discard" => Ok(Box::new(RecordingExporter::default())),
        other => Err(format!(
            "unrecognised TRACEGEN_EXPORTER value {other:?}; expected \"stdout\", \"otlp\", or \"discard\""
        )),
    }
}
