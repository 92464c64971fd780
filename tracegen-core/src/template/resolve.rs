//! Interpreting a parsed [`Template`] against a variable environment.
//!
//! Per `spec.md` §4.2, resolution is a fixed-point: a resolved value may
//! itself still contain `{{ ... }}` text (for example a variable whose own
//! template substitutes another not-yet-resolved variable). We re-parse and
//! re-render until no `{{` remains or `max_iterations` is hit, at which
//! point the whole scenario evaluation aborts with [`UnresolvedTemplate`].

use std::collections::HashMap;

use rand::Rng;

use super::{Expr, Segment, Template, parse_template};
use crate::error::UnresolvedTemplate;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15",
];

/// The scoped variable environment a [`Template`] is resolved against.
///
/// A fresh `Environment` is built per span: `vars` are the scenario's
/// trace-wide constants (resolved once, up front), `parent_attrs` are the
/// immediate parent's already-resolved attributes, and `context_key` is the
/// value this span itself exported via `export_context_as`, if any --
/// available to this span's own event attributes, emitted after export.
pub struct Environment<'a> {
    pub vars: &'a HashMap<String, String>,
    pub parent_attrs: Option<&'a HashMap<String, String>>,
    pub context_key: Option<&'a str>,
}

impl<'a> Environment<'a> {
    pub fn new(vars: &'a HashMap<String, String>) -> Self {
        Environment {
            vars,
            parent_attrs: None,
            context_key: None,
        }
    }

    pub fn with_parent_attrs(mut self, attrs: &'a HashMap<String, String>) -> Self {
        self.parent_attrs = Some(attrs);
        self
    }

    pub fn with_context_key(mut self, key: &'a str) -> Self {
        self.context_key = Some(key);
        self
    }
}

/// Resolve `tpl` against `env`, iterating until fixed point.
pub fn resolve(
    tpl: &Template,
    env: &Environment<'_>,
    rng: &mut impl Rng,
    max_iterations: usize,
) -> Result<String, UnresolvedTemplate> {
    let mut current = render_once(tpl, env, rng)?;
    let mut iterations = 1usize;

    while current.contains("{{") {
        if iterations >= max_iterations {
            return Err(UnresolvedTemplate::DidNotConverge {
                max_iterations,
                last: current,
            });
        }
        let reparsed = parse_template(&current)?;
        current = render_once(&reparsed, env, rng)?;
        iterations += 1;
    }

    Ok(current)
}

/// Fixed-point resolution of a whole `vars` mapping: every raw template may
/// reference any other var regardless of declaration order.
pub fn resolve_vars(
    raw: &[(String, Template)],
    rng: &mut impl Rng,
    max_iterations: usize,
) -> Result<HashMap<String, String>, UnresolvedTemplate> {
    // Seed the environment with the constant (non-template) values so a
    // dependent var can see them on the very first pass.
    let mut resolved: HashMap<String, String> = HashMap::new();
    let mut pending: Vec<&(String, Template)> = raw.iter().collect();

    for (name, tpl) in raw {
        if tpl.is_constant() {
            if let [Segment::Literal(lit)] = tpl.0.as_slice() {
                resolved.insert(name.clone(), lit.clone());
            } else {
                resolved.insert(name.clone(), String::new());
            }
        }
    }
    pending.retain(|(_, tpl)| !tpl.is_constant());

    for iteration in 0..max_iterations.max(1) {
        if pending.is_empty() {
            break;
        }
        let mut still_pending = Vec::new();
        let mut progressed = false;

        for entry @ (name, tpl) in &pending {
            let env = Environment::new(&resolved);
            match render_once(tpl, &env, rng) {
                Ok(value) if !value.contains("{{") => {
                    resolved.insert((*name).clone(), value);
                    progressed = true;
                }
                Ok(_) | Err(UnresolvedTemplate::UndefinedVar(_)) => {
                    still_pending.push(*entry);
                }
                Err(other) => return Err(other),
            }
        }

        pending = still_pending;
        if !progressed && !pending.is_empty() && iteration + 1 >= max_iterations {
            let (name, _) = pending[0];
            return Err(UnresolvedTemplate::DidNotConverge {
                max_iterations,
                last: name.clone(),
            });
        }
    }

    if let Some((name, _)) = pending.first() {
        return Err(UnresolvedTemplate::DidNotConverge {
            max_iterations,
            last: (*name).clone(),
        });
    }

    Ok(resolved)
}

fn render_once(
    tpl: &Template,
    env: &Environment<'_>,
    rng: &mut impl Rng,
) -> Result<String, UnresolvedTemplate> {
    let mut out = String::new();
    for segment in &tpl.0 {
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Expr(e) => out.push_str(&eval_expr(e, env, rng)?),
        }
    }
    Ok(out)
}

fn eval_expr(
    expr: &Expr,
    env: &Environment<'_>,
    rng: &mut impl Rng,
) -> Result<String, UnresolvedTemplate> {
    match expr {
        Expr::RandomInt(lo, hi) => Ok(rng.random_range(*lo..=*hi).to_string()),
        Expr::RandomFloat(lo, hi) => Ok(rng.random_range(*lo..=*hi).to_string()),
        Expr::RandomUuid => {
            let mut bytes = [0u8; 16];
            rng.fill(&mut bytes);
            Ok(uuid::Builder::from_random_bytes(bytes)
                .into_uuid()
                .to_string())
        }
        Expr::RandomIpv4 => {
            let octets: [u8; 4] = rng.random();
            Ok(format!(
                "{}.{}.{}.{}",
                octets[0], octets[1], octets[2], octets[3]
            ))
        }
        Expr::RandomUserAgent => {
            let idx = rng.random_range(0..USER_AGENTS.len());
            Ok(USER_AGENTS[idx].to_string())
        }
        Expr::RandomChoice(items) => {
            if items.is_empty() {
                return Ok(String::new());
            }
            let idx = rng.random_range(0..items.len());
            Ok(items[idx].clone())
        }
        Expr::TimeIso => Ok(chrono::Utc::now().to_rfc3339()),
        Expr::Var(name) => env
            .vars
            .get(name)
            .cloned()
            .ok_or_else(|| UnresolvedTemplate::UndefinedVar(name.clone())),
        Expr::ParentAttr(key) => match env.parent_attrs {
            None => Err(UnresolvedTemplate::NoParent),
            Some(attrs) => attrs
                .get(key)
                .cloned()
                .ok_or_else(|| UnresolvedTemplate::MissingParentAttribute(key.clone())),
        },
        Expr::ContextKey => env
            .context_key
            .map(|s| s.to_string())
            .ok_or(UnresolvedTemplate::ContextKeyUnavailable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parse_template;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn resolving_a_string_with_no_placeholders_is_a_no_op() {
        let tpl = parse_template("plain-value").unwrap();
        let vars = HashMap::new();
        let env = Environment::new(&vars);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(resolve(&tpl, &env, &mut rng, 10).unwrap(), "plain-value");
    }

    #[test]
    fn resolution_is_deterministic_for_a_seed() {
        let tpl = parse_template("id-{{random.uuid}}-{{random.int(1,1000)}}").unwrap();
        let vars = HashMap::new();
        let env = Environment::new(&vars);

        let mut rng_a = SmallRng::seed_from_u64(7);
        let mut rng_b = SmallRng::seed_from_u64(7);

        let a = resolve(&tpl, &env, &mut rng_a, 10).unwrap();
        let b = resolve(&tpl, &env, &mut rng_b, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parent_attribute_lookup_succeeds_when_present() {
        let tpl = parse_template("{{parent.attributes.user.id}}").unwrap();
        let vars = HashMap::new();
        let mut parent_attrs = HashMap::new();
        parent_attrs.insert("user.id".to_string(), "42".to_string());
        let env = Environment::new(&vars).with_parent_attrs(&parent_attrs);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(resolve(&tpl, &env, &mut rng, 10).unwrap(), "42");
    }

    #[test]
    fn parent_attribute_lookup_fails_when_missing() {
        let tpl = parse_template("{{parent.attributes.nope}}").unwrap();
        let vars = HashMap::new();
        let parent_attrs = HashMap::new();
        let env = Environment::new(&vars).with_parent_attrs(&parent_attrs);
        let mut rng = SmallRng::seed_from_u64(1);
        let err = resolve(&tpl, &env, &mut rng, 10).unwrap_err();
        assert!(matches!(err, UnresolvedTemplate::MissingParentAttribute(_)));
    }

    #[test]
    fn vars_resolve_regardless_of_declaration_order() {
        let raw = vec![
            ("a".to_string(), parse_template("{{b}}-suffix").unwrap()),
            ("b".to_string(), parse_template("base").unwrap()),
        ];
        let mut rng = SmallRng::seed_from_u64(3);
        let resolved = resolve_vars(&raw, &mut rng, 10).unwrap();
        assert_eq!(resolved.get("a").unwrap(), "base-suffix");
        assert_eq!(resolved.get("b").unwrap(), "base");
    }

    #[test]
    fn unresolved_var_chain_fails_after_max_iterations() {
        let raw = vec![("a".to_string(), parse_template("{{missing}}").unwrap())];
        let mut rng = SmallRng::seed_from_u64(1);
        let err = resolve_vars(&raw, &mut rng, 3).unwrap_err();
        assert!(matches!(err, UnresolvedTemplate::DidNotConverge { .. }));
    }
}
