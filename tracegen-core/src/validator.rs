//! Scenario directory loader and validator.
//!
//! Loads every document in a directory, merges the shared `_base.yaml`
//! document, checks schema conformance, and either returns a frozen
//! [`ScenarioSet`] or the complete list of problems found -- validation
//! never stops at the first error, so a single run reports everything
//! wrong with the directory at once (`spec.md` §4.1).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ValidationError;
use crate::model::{
    AttrTemplate, ErrorCondition, EventSpec, RawAttrValue, RawErrorCondition, RawEvent,
    RawScenario, RawScenarioFile, RawSpanNode, Scenario, ScenarioSet, SpanKind, SpanNode,
};
use crate::template::parse_template;

const BASE_DOCUMENT_NAME: &str = "_base.yaml";

struct Accumulator {
    errors: Vec<ValidationError>,
}

impl Accumulator {
    fn push(&mut self, path: &Path, field: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(ValidationError::new(path, field, reason));
    }
}

/// Load and validate every scenario document under `dir`.
pub fn load_scenario_dir(dir: impl AsRef<Path>) -> Result<ScenarioSet, Vec<ValidationError>> {
    let dir = dir.as_ref();
    let mut acc = Accumulator { errors: Vec::new() };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            acc.push(dir, "scenarios_dir", format!("cannot read directory: {e}"));
            return Err(acc.errors);
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                let is_yaml = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e == "yaml" || e == "yml")
                    .unwrap_or(false);
                if is_yaml {
                    paths.push(path);
                }
            }
            Err(e) => acc.push(dir, "scenarios_dir", format!("cannot read entry: {e}")),
        }
    }
    paths.sort();

    let base_path = paths
        .iter()
        .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(BASE_DOCUMENT_NAME))
        .cloned();

    let known_services: Vec<String> = match &base_path {
        Some(path) => match load_base_document(path) {
            Ok(services) => services,
            Err(e) => {
                acc.push(path, "base_document", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    let known: HashSet<&str> = known_services.iter().map(|s| s.as_str()).collect();

    let mut scenarios = Vec::new();
    for path in &paths {
        if Some(path.as_path()) == base_path.as_deref() {
            continue;
        }
        let raw = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                acc.push(path, "file", format!("cannot read file: {e}"));
                continue;
            }
        };
        let file: RawScenarioFile = match serde_yaml::from_str(&raw) {
            Ok(f) => f,
            Err(e) => {
                acc.push(path, "file", format!("invalid YAML/schema: {e}"));
                continue;
            }
        };
        for raw_scenario in file.into_scenarios() {
            if let Some(scenario) = validate_scenario(path, raw_scenario, &known, &mut acc) {
                scenarios.push(scenario);
            }
        }
    }

    if scenarios.is_empty() && acc.errors.is_empty() {
        acc.push(dir, "scenarios_dir", "no scenarios found in directory");
    }

    if acc.errors.is_empty() {
        Ok(ScenarioSet {
            scenarios,
            known_services,
        })
    } else {
        Err(acc.errors)
    }
}

fn load_base_document(path: &Path) -> Result<Vec<String>, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("cannot read file: {e}"))?;
    let doc: crate::model::RawBaseDocument =
        serde_yaml::from_str(&raw).map_err(|e| format!("invalid base document: {e}"))?;
    Ok(doc.services)
}

fn validate_scenario(
    path: &Path,
    raw: RawScenario,
    known_services: &HashSet<&str>,
    acc: &mut Accumulator,
) -> Option<Scenario> {
    let errors_before = acc.errors.len();

    let weight = match raw.weight {
        None => 1,
        Some(w) if w >= 1 => w as u32,
        Some(w) => {
            acc.push(
                path,
                format!("{}.weight", raw.name),
                format!("weight must be >= 1, got {w}"),
            );
            1
        }
    };

    let mut vars = Vec::with_capacity(raw.vars.len());
    for (key, value) in &raw.vars {
        match parse_template(value) {
            Ok(tpl) => vars.push((key.clone(), tpl)),
            Err(e) => acc.push(path, format!("{}.vars.{key}", raw.name), e.to_string()),
        }
    }
    vars.sort_by(|a, b| a.0.cmp(&b.0));

    let root_span = validate_span_node(
        path,
        &format!("{}.root_span", raw.name),
        raw.root_span,
        known_services,
        acc,
    );

    if acc.errors.len() > errors_before {
        return None;
    }

    root_span.map(|root_span| Scenario {
        name: raw.name,
        weight,
        vars,
        root_span,
    })
}

fn validate_span_node(
    path: &Path,
    field_prefix: &str,
    raw: RawSpanNode,
    known_services: &HashSet<&str>,
    acc: &mut Accumulator,
) -> Option<SpanNode> {
    let errors_before = acc.errors.len();

    if raw.service.trim().is_empty() {
        acc.push(path, format!("{field_prefix}.service"), "must be non-empty");
    } else if !known_services.is_empty() && !known_services.contains(raw.service.as_str()) {
        warn!(
            service = %raw.service,
            scenario_field = %field_prefix,
            "scenario references a service not listed in the base document"
        );
    }

    let kind = match raw.kind.as_deref() {
        None => SpanKind::Internal,
        Some(s) => match SpanKind::parse(s) {
            Some(k) => k,
            None => {
                acc.push(
                    path,
                    format!("{field_prefix}.kind"),
                    format!("unrecognised span kind: {s:?}"),
                );
                SpanKind::Internal
            }
        },
    };

    let delay_ms = match raw.delay_ms {
        None => (0, 0),
        Some([lo, hi]) => {
            if lo < 0 || hi < 0 {
                acc.push(
                    path,
                    format!("{field_prefix}.delay_ms"),
                    format!("delay_ms values must be non-negative, got [{lo}, {hi}]"),
                );
                (0, 0)
            } else if lo > hi {
                acc.push(
                    path,
                    format!("{field_prefix}.delay_ms"),
                    format!("delay_ms must be non-decreasing, got [{lo}, {hi}]"),
                );
                (0, 0)
            } else {
                (lo as u64, hi as u64)
            }
        }
    };

    let mut attributes = Vec::with_capacity(raw.attributes.len());
    for (key, value) in raw.attributes {
        match validate_attr_value(path, &format!("{field_prefix}.attributes.{key}"), value, acc) {
            Some(tpl) => attributes.push((key, tpl)),
            None => {}
        }
    }
    attributes.sort_by(|a, b| a.0.cmp(&b.0));

    let mut events = Vec::with_capacity(raw.events.len());
    for (i, raw_event) in raw.events.into_iter().enumerate() {
        if let Some(ev) = validate_event(
            path,
            &format!("{field_prefix}.events[{i}]"),
            raw_event,
            acc,
        ) {
            events.push(ev);
        }
    }

    let mut error_conditions = Vec::with_capacity(raw.error_conditions.len());
    let mut probability_sum: i64 = 0;
    for (i, raw_cond) in raw.error_conditions.into_iter().enumerate() {
        probability_sum += raw_cond.probability;
        if let Some(cond) = validate_error_condition(
            path,
            &format!("{field_prefix}.error_conditions[{i}]"),
            raw_cond,
            acc,
        ) {
            error_conditions.push(cond);
        }
    }
    if probability_sum > 100 {
        acc.push(
            path,
            format!("{field_prefix}.error_conditions"),
            format!("probabilities sum to {probability_sum}, must be <= 100"),
        );
    }

    let export_context_as = match raw.export_context_as {
        None => None,
        Some(s) => match parse_template(&s) {
            Ok(tpl) => Some(tpl),
            Err(e) => {
                acc.push(path, format!("{field_prefix}.export_context_as"), e.to_string());
                None
            }
        },
    };

    let operation = if raw.operation.trim().is_empty() {
        raw.service.clone()
    } else {
        raw.operation
    };

    let mut calls = Vec::with_capacity(raw.calls.len());
    for (i, child) in raw.calls.into_iter().enumerate() {
        if let Some(child) = validate_span_node(
            path,
            &format!("{field_prefix}.calls[{i}]"),
            child,
            known_services,
            acc,
        ) {
            calls.push(child);
        }
    }

    if acc.errors.len() > errors_before {
        return None;
    }

    Some(SpanNode {
        service: raw.service,
        operation,
        kind,
        delay_ms,
        attributes,
        events,
        error_conditions,
        export_context_as,
        link_from_context: raw.link_from_context,
        calls,
    })
}

fn validate_attr_value(
    path: &Path,
    field: &str,
    raw: RawAttrValue,
    acc: &mut Accumulator,
) -> Option<AttrTemplate> {
    match raw {
        RawAttrValue::Bool(b) => Some(AttrTemplate::Bool(b)),
        RawAttrValue::Int(i) => Some(AttrTemplate::Int(i)),
        RawAttrValue::Float(f) => Some(AttrTemplate::Float(f)),
        RawAttrValue::String(s) => match parse_template(&s) {
            Ok(tpl) => Some(AttrTemplate::Str(tpl)),
            Err(e) => {
                acc.push(path, field, e.to_string());
                None
            }
        },
        RawAttrValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            let mut ok = true;
            for (i, item) in items.into_iter().enumerate() {
                match validate_attr_value(path, &format!("{field}[{i}]"), item, acc) {
                    Some(v) => out.push(v),
                    None => ok = false,
                }
            }
            ok.then_some(AttrTemplate::List(out))
        }
    }
}

fn validate_event(
    path: &Path,
    field_prefix: &str,
    raw: RawEvent,
    acc: &mut Accumulator,
) -> Option<EventSpec> {
    let errors_before = acc.errors.len();

    let name = match parse_template(&raw.name) {
        Ok(tpl) => Some(tpl),
        Err(e) => {
            acc.push(path, format!("{field_prefix}.name"), e.to_string());
            None
        }
    };

    let mut attributes = Vec::with_capacity(raw.attributes.len());
    for (key, value) in raw.attributes {
        if let Some(tpl) =
            validate_attr_value(path, &format!("{field_prefix}.attributes.{key}"), value, acc)
        {
            attributes.push((key, tpl));
        }
    }
    attributes.sort_by(|a, b| a.0.cmp(&b.0));

    if acc.errors.len() > errors_before {
        return None;
    }

    name.map(|name| EventSpec {
        name,
        attributes,
        offset_ms: raw.offset_ms,
    })
}

fn validate_error_condition(
    path: &Path,
    field_prefix: &str,
    raw: RawErrorCondition,
    acc: &mut Accumulator,
) -> Option<ErrorCondition> {
    let errors_before = acc.errors.len();

    if !(0..=100).contains(&raw.probability) {
        acc.push(
            path,
            format!("{field_prefix}.probability"),
            format!("probability must be in [0,100], got {}", raw.probability),
        );
    }

    let error_type = match parse_template(&raw.error_type) {
        Ok(tpl) => Some(tpl),
        Err(e) => {
            acc.push(path, format!("{field_prefix}.type"), e.to_string());
            None
        }
    };
    let message = match parse_template(&raw.message) {
        Ok(tpl) => Some(tpl),
        Err(e) => {
            acc.push(path, format!("{field_prefix}.message"), e.to_string());
            None
        }
    };

    if acc.errors.len() > errors_before {
        return None;
    }

    Some(ErrorCondition {
        probability: raw.probability.clamp(0, 100) as u8,
        error_type: error_type?,
        message: message?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn rejects_missing_root_span_via_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "scenario.yaml",
            "name: broken\nweight: 1\n",
        );
        let result = load_scenario_dir(dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn rejects_weight_below_one() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "scenario.yaml",
            "name: s\nweight: 0\nroot_span:\n  service: svc\n  operation: op\n",
        );
        let errs = load_scenario_dir(dir.path()).unwrap_err();
        assert!(errs.iter().any(|e| e.field.contains("weight")));
    }

    #[test]
    fn rejects_error_conditions_summing_over_100() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "scenario.yaml",
            r#"
name: s
root_span:
  service: svc
  operation: op
  error_conditions:
    - probability: 60
      type: "A"
      message: "a"
    - probability: 60
      type: "B"
      message: "b"
"#,
        );
        let errs = load_scenario_dir(dir.path()).unwrap_err();
        assert!(errs.iter().any(|e| e.field.contains("error_conditions")));
    }

    #[test]
    fn accepts_minimal_valid_scenario() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "scenario.yaml",
            r#"
name: s1
weight: 2
root_span:
  service: checkout
  operation: POST /checkout
  delay_ms: [10, 10]
"#,
        );
        let set = load_scenario_dir(dir.path()).unwrap();
        assert_eq!(set.scenarios.len(), 1);
        assert_eq!(set.scenarios[0].weight, 2);
        assert_eq!(set.scenarios[0].root_span.delay_ms, (10, 10));
    }

    #[test]
    fn merges_base_document_service_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            BASE_DOCUMENT_NAME,
            "schema_version: 1\nservices: [checkout]\n",
        );
        write_file(
            dir.path(),
            "scenario.yaml",
            "name: s1\nroot_span:\n  service: checkout\n  operation: op\n",
        );
        let set = load_scenario_dir(dir.path()).unwrap();
        assert_eq!(set.known_services, vec!["checkout".to_string()]);
    }

    #[test]
    fn unlisted_service_is_a_warning_not_a_rejection() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            BASE_DOCUMENT_NAME,
            "schema_version: 1\nservices: [checkout]\n",
        );
        write_file(
            dir.path(),
            "scenario.yaml",
            "name: s1\nroot_span:\n  service: some-other-service\n  operation: op\n",
        );
        let set = load_scenario_dir(dir.path()).unwrap();
        assert_eq!(set.scenarios.len(), 1);
    }
}
