use super::{Expr, Segment, Template};
use crate::error::TemplateParseError;

pub(super) fn parse_template(input: &str) -> Result<Template, TemplateParseError> {
    let mut segments = Vec::new();
    let mut rest = input;

    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    segments.push(Segment::Literal(rest.to_string()));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    segments.push(Segment::Literal(rest[..start].to_string()));
                }
                let after_open = &rest[start + 2..];
                let end = after_open
                    .find("}}")
                    .ok_or_else(|| TemplateParseError::UnbalancedBraces(input.to_string()))?;
                let expr_str = after_open[..end].trim();
                segments.push(Segment::Expr(parse_expr(expr_str)?));
                rest = &after_open[end + 2..];
            }
        }
    }

    Ok(Template(segments))
}

fn parse_expr(s: &str) -> Result<Expr, TemplateParseError> {
    if let Some(key) = s.strip_prefix("parent.attributes.") {
        if key.is_empty() {
            return Err(TemplateParseError::MalformedArguments {
                func: "parent.attributes",
                args: s.to_string(),
            });
        }
        return Ok(Expr::ParentAttr(key.to_string()));
    }

    match s {
        "context_key" => return Ok(Expr::ContextKey),
        "time.iso" => return Ok(Expr::TimeIso),
        "random.uuid" => return Ok(Expr::RandomUuid),
        "random.ipv4" => return Ok(Expr::RandomIpv4),
        "random.user_agent" => return Ok(Expr::RandomUserAgent),
        _ => {}
    }

    if let Some(args) = call_args(s, "random.int") {
        let (lo, hi) = parse_int_pair("random.int", args)?;
        return Ok(Expr::RandomInt(lo, hi));
    }
    if let Some(args) = call_args(s, "random.float") {
        let (lo, hi) = parse_float_pair("random.float", args)?;
        return Ok(Expr::RandomFloat(lo, hi));
    }
    if let Some(args) = call_args(s, "random.choice") {
        let items = parse_choice_list(args)?;
        return Ok(Expr::RandomChoice(items));
    }

    if is_identifier(s) {
        return Ok(Expr::Var(s.to_string()));
    }

    Err(TemplateParseError::UnknownExpression(s.to_string()))
}

/// `"random.int(1, 5)"` -> `Some("1, 5")`
fn call_args<'a>(s: &'a str, func: &str) -> Option<&'a str> {
    let prefix = format!("{func}(");
    s.strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_suffix(')'))
}

fn parse_int_pair(func: &'static str, args: &str) -> Result<(i64, i64), TemplateParseError> {
    let (lo, hi) = split_two(args).ok_or_else(|| TemplateParseError::MalformedArguments {
        func,
        args: args.to_string(),
    })?;
    let lo: i64 = lo
        .trim()
        .parse()
        .map_err(|_| TemplateParseError::MalformedArguments {
            func,
            args: args.to_string(),
        })?;
    let hi: i64 = hi
        .trim()
        .parse()
        .map_err(|_| TemplateParseError::MalformedArguments {
            func,
            args: args.to_string(),
        })?;
    Ok((lo, hi))
}

fn parse_float_pair(func: &'static str, args: &str) -> Result<(f64, f64), TemplateParseError> {
    let (lo, hi) = split_two(args).ok_or_else(|| TemplateParseError::MalformedArguments {
        func,
        args: args.to_string(),
    })?;
    let lo: f64 = lo
        .trim()
        .parse()
        .map_err(|_| TemplateParseError::MalformedArguments {
            func,
            args: args.to_string(),
        })?;
    let hi: f64 = hi
        .trim()
        .parse()
        .map_err(|_| TemplateParseError::MalformedArguments {
            func,
            args: args.to_string(),
        })?;
    Ok((lo, hi))
}

fn split_two(args: &str) -> Option<(&str, &str)> {
    let mut parts = args.splitn(2, ',');
    let a = parts.next()?;
    let b = parts.next()?;
    Some((a, b))
}

fn parse_choice_list(args: &str) -> Result<Vec<String>, TemplateParseError> {
    let inner = args
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| TemplateParseError::MalformedArguments {
            func: "random.choice",
            args: args.to_string(),
        })?;

    if inner.trim().is_empty() {
        return Err(TemplateParseError::MalformedArguments {
            func: "random.choice",
            args: args.to_string(),
        });
    }

    Ok(inner
        .split(',')
        .map(|item| item.trim().trim_matches('"').trim_matches('\'').to_string())
        .collect())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
