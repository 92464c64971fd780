//! Domain model: the raw, `serde`-deserialized shape of a scenario document
//! and the frozen, validated shape the engine actually walks.
//!
//! Per `spec.md` §9 ("Recursive declarative tree"), `SpanNode` is modeled
//! as a tagged record holding an owned `Vec` of children -- no shared
//! subtrees, no back-edges -- and the frozen form is immutable once the
//! validator hands it to the engine.

use std::collections::HashMap;

use serde::Deserialize;

use crate::template::Template;

/// `service.name` in the span's root document, or the schema version
/// document that seeds the open-set of known services.
#[derive(Debug, Deserialize)]
pub struct RawBaseDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub services: Vec<String>,
}

/// A scenario document contains either one scenario or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawScenarioFile {
    Many(Vec<RawScenario>),
    One(RawScenario),
}

impl RawScenarioFile {
    pub fn into_scenarios(self) -> Vec<RawScenario> {
        match self {
            RawScenarioFile::Many(v) => v,
            RawScenarioFile::One(s) => vec![s],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawScenario {
    pub name: String,
    pub weight: Option<i64>,
    #[serde(default)]
    pub vars: HashMap<String, String>,
    pub root_span: RawSpanNode,
}

#[derive(Debug, Deserialize)]
pub struct RawSpanNode {
    pub service: String,
    #[serde(default)]
    pub operation: String,
    pub kind: Option<String>,
    pub delay_ms: Option<[i64; 2]>,
    #[serde(default)]
    pub attributes: HashMap<String, RawAttrValue>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub error_conditions: Vec<RawErrorCondition>,
    pub export_context_as: Option<String>,
    pub link_from_context: Option<String>,
    #[serde(default)]
    pub calls: Vec<RawSpanNode>,
}

#[derive(Debug, Deserialize)]
pub struct RawEvent {
    pub name: String,
    #[serde(default)]
    pub attributes: HashMap<String, RawAttrValue>,
    pub offset_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawErrorCondition {
    pub probability: i64,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// An attribute value as written in the scenario document. Strings may
/// contain `{{ ... }}` templates; other scalar kinds pass through
/// unresolved, per `spec.md` §4.2.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<RawAttrValue>),
}

// ---------------------------------------------------------------------
// Frozen model -- produced by the validator, walked by the engine.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INTERNAL" => Some(SpanKind::Internal),
            "SERVER" => Some(SpanKind::Server),
            "CLIENT" => Some(SpanKind::Client),
            "PRODUCER" => Some(SpanKind::Producer),
            "CONSUMER" => Some(SpanKind::Consumer),
            _ => None,
        }
    }
}

impl Default for SpanKind {
    fn default() -> Self {
        SpanKind::Internal
    }
}

/// An attribute value once parsed into templates, ready to be resolved
/// once per trace against the current span's environment.
#[derive(Debug, Clone)]
pub enum AttrTemplate {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Template),
    List(Vec<AttrTemplate>),
}

#[derive(Debug, Clone)]
pub struct EventSpec {
    pub name: Template,
    pub attributes: Vec<(String, AttrTemplate)>,
    pub offset_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ErrorCondition {
    pub probability: u8,
    pub error_type: Template,
    pub message: Template,
}

#[derive(Debug, Clone)]
pub struct SpanNode {
    pub service: String,
    pub operation: String,
    pub kind: SpanKind,
    pub delay_ms: (u64, u64),
    pub attributes: Vec<(String, AttrTemplate)>,
    pub events: Vec<EventSpec>,
    pub error_conditions: Vec<ErrorCondition>,
    pub export_context_as: Option<Template>,
    pub link_from_context: Option<String>,
    pub calls: Vec<SpanNode>,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub weight: u32,
    /// Declaration-order list so [`crate::template::resolve::resolve_vars`]
    /// can fixed-point over cross-references regardless of order.
    pub vars: Vec<(String, Template)>,
    pub root_span: SpanNode,
}

/// The normalized, frozen output of the validator: every scenario that
/// passed every check, plus the open-set of service names the base
/// document declared (for the non-fatal "unlisted service" warning).
#[derive(Debug, Clone, Default)]
pub struct ScenarioSet {
    pub scenarios: Vec<Scenario>,
    pub known_services: Vec<String>,
}
