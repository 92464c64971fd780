//! `{{ ... }}` template parsing.
//!
//! Templates are parsed once, at scenario-load time, into a small AST of
//! literal and expression segments -- the same "parse once, interpret many"
//! shape the rest of this workspace uses for OTLP config (parse the YAML
//! document once, not per request). Interpreting the AST at emission time
//! is handled by [`resolve`](crate::template::resolve).

mod parser;
pub mod resolve;

use crate::error::TemplateParseError;

/// A parsed `{{ expr }}` body.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    RandomInt(i64, i64),
    RandomFloat(f64, f64),
    RandomUuid,
    RandomIpv4,
    RandomUserAgent,
    RandomChoice(Vec<String>),
    TimeIso,
    Var(String),
    ParentAttr(String),
    ContextKey,
}

/// One piece of a template: either a literal run of text or a parsed
/// expression to interpolate.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr(Expr),
}

/// A whole template string, split into literal and expression segments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template(pub Vec<Segment>);

impl Template {
    /// A template containing only a fixed string, with nothing to resolve.
    pub fn literal(s: impl Into<String>) -> Self {
        Template(vec![Segment::Literal(s.into())])
    }

    /// True if this template has no `{{ ... }}` expressions at all, so
    /// resolving it is a pure no-op copy.
    pub fn is_constant(&self) -> bool {
        !self.0.iter().any(|s| matches!(s, Segment::Expr(_)))
    }
}

pub fn parse_template(input: &str) -> Result<Template, TemplateParseError> {
    parser::parse_template(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_template_has_no_expr_segments() {
        let t = parse_template("plain text, no placeholders").unwrap();
        assert!(t.is_constant());
    }

    #[test]
    fn template_with_placeholder_is_not_constant() {
        let t = parse_template("id-{{random.uuid}}").unwrap();
        assert!(!t.is_constant());
    }
}
