//! Trace generation engine (`spec.md` §4.4).
//!
//! Walks a selected scenario tree, synthesizing spans with correct
//! parent/child relationships, timings, attributes, events, links and
//! status, and hands each finished span to the configured
//! [`SpanExporter`]. A span is only handed to the exporter after every one
//! of its descendants has been, so the exporter always sees a causally
//! coherent trace.

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::clock::now_unix_nanos;
use crate::context_store::ContextStore;
use crate::error::{ExporterError, TraceError, UnresolvedTemplate};
use crate::exporter::{AttributeValue, SpanEvent, SpanExporter, SpanLink, SpanRecord, SpanStatus};
use crate::ids::{SpanId, TraceId};
use crate::model::{AttrTemplate, ErrorCondition, Scenario, SpanNode};
use crate::stats::Stats;
use crate::store::{TraceRecord, TraceStore};
use crate::template::resolve::{resolve, resolve_vars, Environment};

/// The immediate parent's identity and already-resolved attributes, handed
/// down so a child can reference `parent.attributes.<key>`.
struct ParentInfo<'a> {
    span_id: SpanId,
    attrs: &'a HashMap<String, String>,
}

/// What a completed `emit` call reports back to its caller: just enough to
/// compute `end_time = max(start + sampled_duration, last_child_end)`.
struct EmittedSpan {
    span_id: SpanId,
    end_time_ns: u128,
}

pub struct TraceEngine<'a> {
    exporter: &'a dyn SpanExporter,
    context_store: &'a ContextStore,
    trace_store: Option<&'a dyn TraceStore>,
    stats: &'a Stats,
    max_template_iterations: usize,
    /// Spans emitted so far in the trace currently in flight, handed to
    /// `trace_store` as one `TraceRecord` once the trace completes.
    /// `RefCell` rather than a `&mut self` threaded through `emit` because
    /// each worker owns one `TraceEngine` for its whole lifetime and runs
    /// traces strictly one at a time -- never from more than one thread.
    spans: RefCell<Vec<SpanRecord>>,
}

impl<'a> TraceEngine<'a> {
    pub fn new(
        exporter: &'a dyn SpanExporter,
        context_store: &'a ContextStore,
        stats: &'a Stats,
        max_template_iterations: usize,
    ) -> Self {
        TraceEngine {
            exporter,
            context_store,
            trace_store: None,
            stats,
            max_template_iterations,
            spans: RefCell::new(Vec::new()),
        }
    }

    /// Hand every completed trace's spans to `store` as a [`TraceRecord`],
    /// in addition to exporting them span-by-span. `spec.md` §6's
    /// persistence contract is consumed, not implemented, by the core; this
    /// wires in whichever implementation the caller picked (the in-process
    /// ring buffer by default, per `SPEC_FULL.md` §5).
    pub fn with_trace_store(mut self, store: &'a dyn TraceStore) -> Self {
        self.trace_store = Some(store);
        self
    }

    /// Run one trace for `scenario`, sleeping in real time to reproduce the
    /// span tree's timings, and export every span along the way.
    pub fn run_trace(&self, scenario: &Scenario, rng: &mut impl Rng) -> Result<(), TraceError> {
        let trace_id = TraceId::random(rng);
        self.spans.borrow_mut().clear();

        let vars = match resolve_vars(&scenario.vars, rng, self.max_template_iterations) {
            Ok(v) => v,
            Err(e) => {
                self.stats.record_unresolved_template();
                return Err(TraceError::UnresolvedTemplate(e));
            }
        };

        match self.emit(&scenario.root_span, trace_id, None, &vars, rng) {
            Ok(_) => {
                self.stats.record_trace_emitted();
                if let Some(store) = self.trace_store {
                    store.add(TraceRecord {
                        trace_id,
                        scenario_name: scenario.name.clone(),
                        spans: self.spans.borrow_mut().drain(..).collect(),
                    });
                }
                Ok(())
            }
            Err(TraceError::UnresolvedTemplate(e)) => {
                self.stats.record_unresolved_template();
                Err(TraceError::UnresolvedTemplate(e))
            }
            Err(TraceError::Exporter(e)) => {
                self.stats.record_exporter_error();
                Err(TraceError::Exporter(e))
            }
        }
    }

    fn emit(
        &self,
        node: &SpanNode,
        trace_id: TraceId,
        parent: Option<ParentInfo<'_>>,
        vars: &HashMap<String, String>,
        rng: &mut impl Rng,
    ) -> Result<EmittedSpan, TraceError> {
        let start_instant = Instant::now();
        let start_time_ns = now_unix_nanos();

        let span_id = SpanId::random(rng);
        let parent_span_id = parent.as_ref().map(|p| p.span_id).unwrap_or(SpanId::ZERO);
        let parent_attrs = parent.as_ref().map(|p| p.attrs);

        // b) resolve this span's own attributes, with access to the
        // parent's already-resolved attributes.
        let attr_env = env_with_optional_parent(vars, parent_attrs);
        let (attributes, attrs_str) = resolve_attrs(&node.attributes, &attr_env, rng, self.max_template_iterations)?;

        // c) link_from_context: query the store for matching producer
        // contexts and attach each as a Link.
        let links = match &node.link_from_context {
            Some(pattern) => self
                .context_store
                .find(pattern)
                .into_iter()
                .map(|ctx| SpanLink {
                    trace_id: ctx.trace_id,
                    span_id: ctx.span_id,
                })
                .collect(),
            None => Vec::new(),
        };

        // e) evaluate error_conditions in declared order; at most one wins.
        let fired = roll_error_conditions(&node.error_conditions, rng);
        let (status, exception) = match fired {
            Some(cond) => {
                let error_type = resolve(&cond.error_type, &attr_env, rng, self.max_template_iterations)?;
                let message = resolve(&cond.message, &attr_env, rng, self.max_template_iterations)?;
                (
                    SpanStatus::Error {
                        message: message.clone(),
                    },
                    Some((error_type, message)),
                )
            }
            None => (SpanStatus::Ok, None),
        };

        // f) export_context_as, if present, registers this span for later
        // cross-trace linking.
        let context_key = match &node.export_context_as {
            Some(tpl) => {
                let key = resolve(tpl, &attr_env, rng, self.max_template_iterations)?;
                self.context_store.insert(key.clone(), trace_id, span_id);
                Some(key)
            }
            None => None,
        };

        // g) events, interpolated within the span's own sampled duration;
        // the exception event (if any) is appended last.
        let sampled_duration_ms = rng.random_range(node.delay_ms.0..=node.delay_ms.1);
        let event_env = env_with_optional_parent(vars, parent_attrs);
        let event_env = match &context_key {
            Some(key) => event_env.with_context_key(key),
            None => event_env,
        };
        let mut events = resolve_events(
            &node.events,
            start_time_ns,
            sampled_duration_ms,
            &event_env,
            rng,
            self.max_template_iterations,
        )?;
        if let Some((error_type, message)) = exception {
            let mut attrs = HashMap::new();
            attrs.insert("exception.type".to_string(), AttributeValue::String(error_type));
            attrs.insert("exception.message".to_string(), AttributeValue::String(message));
            events.push(SpanEvent {
                name: "exception".to_string(),
                timestamp_ns: now_unix_nanos(),
                attributes: attrs,
            });
        }

        // h) walk children serially, in declaration order.
        let this_parent_info = ParentInfo {
            span_id,
            attrs: &attrs_str,
        };
        let mut last_child_end_ns = start_time_ns;
        for child in &node.calls {
            let child_parent = ParentInfo {
                span_id: this_parent_info.span_id,
                attrs: this_parent_info.attrs,
            };
            let emitted = self.emit(child, trace_id, Some(child_parent), vars, rng)?;
            last_child_end_ns = last_child_end_ns.max(emitted.end_time_ns);
        }

        // i) end_time = max(start + sampled_duration, last_child_end); top
        // up the real sleep so wall-clock time matches.
        let own_deadline_ns = start_time_ns + u128::from(sampled_duration_ms) * 1_000_000;
        let logical_end_ns = own_deadline_ns.max(last_child_end_ns);
        let target_elapsed_ns = logical_end_ns - start_time_ns;
        let elapsed_ns = start_instant.elapsed().as_nanos();
        if target_elapsed_ns > elapsed_ns {
            thread::sleep(Duration::from_nanos((target_elapsed_ns - elapsed_ns) as u64));
        }
        let end_time_ns = logical_end_ns;

        // k) hand the finished span to the exporter. Children were already
        // exported by their own recursive calls above, so by the time this
        // call returns every descendant is finalized.
        let record = SpanRecord {
            trace_id,
            span_id,
            parent_span_id,
            name: node.operation.clone(),
            kind: node.kind,
            service: node.service.clone(),
            start_time_ns,
            end_time_ns,
            attributes,
            events,
            links,
            status,
        };
        if self.trace_store.is_some() {
            self.spans.borrow_mut().push(record.clone());
        }
        self.exporter.export(record).map_err(TraceError::Exporter)?;

        Ok(EmittedSpan { span_id, end_time_ns })
    }
}

fn env_with_optional_parent<'a>(
    vars: &'a HashMap<String, String>,
    parent_attrs: Option<&'a HashMap<String, String>>,
) -> Environment<'a> {
    let env = Environment::new(vars);
    match parent_attrs {
        Some(attrs) => env.with_parent_attrs(attrs),
        None => env,
    }
}

/// Single roulette draw over `conditions`' cumulative probability space;
/// `conditions` sum to <= 100 (enforced by the validator), so at most one
/// can win.
fn roll_error_conditions<'a>(
    conditions: &'a [ErrorCondition],
    rng: &mut impl Rng,
) -> Option<&'a ErrorCondition> {
    if conditions.is_empty() {
        return None;
    }
    let roll = rng.random_range(0..100u32);
    let mut cumulative = 0u32;
    for cond in conditions {
        cumulative += u32::from(cond.probability);
        if roll < cumulative {
            return Some(cond);
        }
    }
    None
}

fn resolve_attrs(
    templates: &[(String, AttrTemplate)],
    env: &Environment<'_>,
    rng: &mut impl Rng,
    max_iterations: usize,
) -> Result<(HashMap<String, AttributeValue>, HashMap<String, String>), UnresolvedTemplate> {
    let mut values = HashMap::with_capacity(templates.len());
    let mut strings = HashMap::with_capacity(templates.len());
    for (key, tpl) in templates {
        let value = resolve_attr_value(tpl, env, rng, max_iterations)?;
        strings.insert(key.clone(), value.to_string());
        values.insert(key.clone(), value);
    }
    Ok((values, strings))
}

fn resolve_attr_value(
    tpl: &AttrTemplate,
    env: &Environment<'_>,
    rng: &mut impl Rng,
    max_iterations: usize,
) -> Result<AttributeValue, UnresolvedTemplate> {
    Ok(match tpl {
        AttrTemplate::Bool(b) => AttributeValue::Bool(*b),
        AttrTemplate::Int(i) => AttributeValue::Int(*i),
        AttrTemplate::Float(f) => AttributeValue::Float(*f),
        AttrTemplate::Str(t) => AttributeValue::String(resolve(t, env, rng, max_iterations)?),
        AttrTemplate::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_attr_value(item, env, rng, max_iterations)?);
            }
            AttributeValue::List(out)
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn resolve_events(
    events: &[crate::model::EventSpec],
    start_time_ns: u128,
    sampled_duration_ms: u64,
    env: &Environment<'_>,
    rng: &mut impl Rng,
    max_iterations: usize,
) -> Result<Vec<SpanEvent>, UnresolvedTemplate> {
    let n = events.len();
    let duration_ns = u128::from(sampled_duration_ms) * 1_000_000;
    let mut out = Vec::with_capacity(n);

    for (i, event) in events.iter().enumerate() {
        let name = resolve(&event.name, env, rng, max_iterations)?;
        let (attributes, _) = resolve_attrs(&event.attributes, env, rng, max_iterations)?;
        let timestamp_ns = match event.offset_ms {
            Some(offset) => start_time_ns + u128::from(offset) * 1_000_000,
            None => {
                let slot = duration_ns * (i as u128 + 1) / (n as u128 + 1);
                start_time_ns + slot
            }
        };
        out.push(SpanEvent {
            name,
            timestamp_ns,
            attributes,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::RecordingExporter;
    use crate::model::{ErrorCondition as ModelErrorCondition, SpanKind};
    use crate::template::parse_template;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn leaf_scenario(delay: (u64, u64)) -> Scenario {
        Scenario {
            name: "s1".to_string(),
            weight: 1,
            vars: Vec::new(),
            root_span: SpanNode {
                service: "checkout".to_string(),
                operation: "checkout".to_string(),
                kind: SpanKind::Internal,
                delay_ms: delay,
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
    fn s1_single_leaf_span_has_expected_duration_and_ok_status() {
        let exporter = RecordingExporter::default();
        let store = ContextStore::new(10);
        let stats = Stats::default();
        let engine = TraceEngine::new(&exporter, &store, &stats, 10);
        let scenario = leaf_scenario((10, 10));
        let mut rng = SmallRng::seed_from_u64(1);

        engine.run_trace(&scenario, &mut rng).unwrap();

        let spans = exporter.spans.lock().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.status, SpanStatus::Ok);
        assert!(span.parent_span_id.is_zero());
        let duration_ms = (span.end_time_ns - span.start_time_ns) / 1_000_000;
        assert!(duration_ms >= 10, "duration_ms was {duration_ms}");
    }

    #[test]
    fn s2_children_nest_inside_parent_and_extend_its_duration() {
        let exporter = RecordingExporter::default();
        let store = ContextStore::new(10);
        let stats = Stats::default();
        let engine = TraceEngine::new(&exporter, &store, &stats, 10);

        let child = SpanNode {
            service: "inventory".to_string(),
            operation: "reserve".to_string(),
            kind: SpanKind::Internal,
            delay_ms: (5, 5),
            attributes: Vec::new(),
            events: Vec::new(),
            error_conditions: Vec::new(),
            export_context_as: None,
            link_from_context: None,
            calls: Vec::new(),
        };
        let scenario = Scenario {
            name: "s2".to_string(),
            weight: 1,
            vars: Vec::new(),
            root_span: SpanNode {
                service: "checkout".to_string(),
                operation: "checkout".to_string(),
                kind: SpanKind::Internal,
                delay_ms: (1, 1),
                attributes: Vec::new(),
                events: Vec::new(),
                error_conditions: Vec::new(),
                export_context_as: None,
                link_from_context: None,
                calls: vec![child.clone(), child],
            },
        };
        let mut rng = SmallRng::seed_from_u64(2);
        engine.run_trace(&scenario, &mut rng).unwrap();

        let spans = exporter.spans.lock().unwrap();
        assert_eq!(spans.len(), 3);
        let root = spans.iter().find(|s| s.parent_span_id.is_zero()).unwrap();
        let children: Vec<_> = spans.iter().filter(|s| !s.parent_span_id.is_zero()).collect();
        assert_eq!(children.len(), 2);

        let root_duration_ms = (root.end_time_ns - root.start_time_ns) / 1_000_000;
        assert!(root_duration_ms >= 10, "root_duration_ms was {root_duration_ms}");

        for child in &children {
            assert_eq!(child.parent_span_id, root.span_id);
            assert!(child.start_time_ns >= root.start_time_ns);
            assert!(child.end_time_ns <= root.end_time_ns);
        }
    }

    #[test]
    fn s3_guaranteed_error_condition_sets_status_and_exception_event() {
        let exporter = RecordingExporter::default();
        let store = ContextStore::new(10);
        let stats = Stats::default();
        let engine = TraceEngine::new(&exporter, &store, &stats, 10);

        let mut scenario = leaf_scenario((1, 1));
        scenario.root_span.error_conditions.push(ModelErrorCondition {
            probability: 100,
            error_type: parse_template("X").unwrap(),
            message: parse_template("m").unwrap(),
        });
        let mut rng = SmallRng::seed_from_u64(3);
        engine.run_trace(&scenario, &mut rng).unwrap();

        let spans = exporter.spans.lock().unwrap();
        let span = &spans[0];
        assert_eq!(
            span.status,
            SpanStatus::Error {
                message: "m".to_string()
            }
        );
        let exception = span.events.iter().find(|e| e.name == "exception").unwrap();
        assert_eq!(
            exception.attributes.get("exception.type"),
            Some(&AttributeValue::String("X".to_string()))
        );
    }

    #[test]
    fn s5_child_resolves_parent_attribute() {
        let exporter = RecordingExporter::default();
        let store = ContextStore::new(10);
        let stats = Stats::default();
        let engine = TraceEngine::new(&exporter, &store, &stats, 10);

        let child = SpanNode {
            service: "inventory".to_string(),
            operation: "reserve".to_string(),
            kind: SpanKind::Internal,
            delay_ms: (0, 0),
            attributes: vec![(
                "user.id".to_string(),
                AttrTemplate::Str(parse_template("{{parent.attributes.user.id}}").unwrap()),
            )],
            events: Vec::new(),
            error_conditions: Vec::new(),
            export_context_as: None,
            link_from_context: None,
            calls: Vec::new(),
        };
        let scenario = Scenario {
            name: "s5".to_string(),
            weight: 1,
            vars: Vec::new(),
            root_span: SpanNode {
                service: "checkout".to_string(),
                operation: "checkout".to_string(),
                kind: SpanKind::Internal,
                delay_ms: (0, 0),
                attributes: vec![("user.id".to_string(), AttrTemplate::Str(parse_template("42").unwrap()))],
                events: Vec::new(),
                error_conditions: Vec::new(),
                export_context_as: None,
                link_from_context: None,
                calls: vec![child],
            },
        };
        let mut rng = SmallRng::seed_from_u64(5);
        engine.run_trace(&scenario, &mut rng).unwrap();

        let spans = exporter.spans.lock().unwrap();
        let child_span = spans.iter().find(|s| !s.parent_span_id.is_zero()).unwrap();
        assert_eq!(
            child_span.attributes.get("user.id"),
            Some(&AttributeValue::String("42".to_string()))
        );
    }
}
