//! Error taxonomy for the generator.
//!
//! Only [`ValidationError`] is fatal (raised during startup, before any
//! trace is emitted). Everything else is bounded to a single trace: the
//! worker logs it, bumps a counter in [`crate::stats::Stats`], and moves on
//! to the next trace.

use std::path::PathBuf;
use thiserror::Error;

/// One structured reason a scenario document was rejected.
///
/// A whole validation run collects these into a `Vec` rather than failing
/// on the first one, so a single `tracegen validate` invocation reports
/// every problem in the scenario directory at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: field `{field}`: {reason}")]
pub struct ValidationError {
    pub path: PathBuf,
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        path: impl Into<PathBuf>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ValidationError {
            path: path.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to parse a single `{{ ... }}` template expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateParseError {
    #[error("unbalanced `{{{{` `}}}}` in template: {0:?}")]
    UnbalancedBraces(String),
    #[error("unrecognised template expression: {0:?}")]
    UnknownExpression(String),
    #[error("malformed arguments to `{func}`: {args:?}")]
    MalformedArguments { func: &'static str, args: String },
}

/// Raised by the resolver when fixed-point iteration does not converge, or
/// a referenced name is absent from the environment. Aborts the trace that
/// triggered it; does not stop the worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedTemplate {
    #[error("template did not converge after {max_iterations} iterations: {last:?}")]
    DidNotConverge { max_iterations: usize, last: String },
    #[error("undefined variable `{0}` referenced in template")]
    UndefinedVar(String),
    #[error("parent has no attribute `{0}`")]
    MissingParentAttribute(String),
    #[error("root span has no parent, so `parent.attributes.*` cannot be resolved")]
    NoParent,
    #[error("`context_key` referenced before this span exported one")]
    ContextKeyUnavailable,
    #[error(transparent)]
    Parse(#[from] TemplateParseError),
}

/// Raised by the exporter handoff. Aborts the remainder of the current
/// trace; logged and counted; never stops the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("exporter rejected span {span_id} of trace {trace_id}: {reason}")]
pub struct ExporterError {
    pub trace_id: String,
    pub span_id: String,
    pub reason: String,
}

/// Errors that can end a single trace before it completes. Never fatal to
/// the worker pool -- see `spec` §7 propagation policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error(transparent)]
    UnresolvedTemplate(#[from] UnresolvedTemplate),
    #[error(transparent)]
    Exporter(#[from] ExporterError),
}
