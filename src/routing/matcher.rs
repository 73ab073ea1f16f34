//! Route matching module
//!
//! A single loop walks the rule table; the first rule whose matcher accepts
//! the path wins. Matching never touches the request itself, it only reports
//! the target and the captures.

use std::borrow::Cow;

use super::rules::{Captures, Decode, PathMatcher, RouteRule, RouteTarget};

/// Result of matching a path against the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub target: RouteTarget,
    pub captures: Captures,
}

impl RouteMatch {
    pub fn not_found() -> Self {
        Self {
            target: RouteTarget::NotFound,
            captures: Captures::default(),
        }
    }
}

/// Find the first matching rule for a path
pub fn match_route(path: &str, rules: &[RouteRule]) -> RouteMatch {
    rules
        .iter()
        .find_map(|rule| match_rule(rule, path))
        .unwrap_or_else(RouteMatch::not_found)
}

/// Test a single rule
pub fn match_rule(rule: &RouteRule, path: &str) -> Option<RouteMatch> {
    match &rule.matcher {
        PathMatcher::Exact(exact) => (path == exact).then(|| RouteMatch {
            target: rule.target,
            captures: Captures::default(),
        }),
        PathMatcher::Pattern { regex, decode } => {
            let caps = regex.captures(path)?;
            let mut captures = Captures::default();
            for name in regex.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    let value = match decode {
                        Decode::Raw => m.as_str().to_string(),
                        Decode::Percent => decode_percent(m.as_str()).into_owned(),
                        Decode::Form => decode_form(m.as_str()).into_owned(),
                    };
                    captures.insert(name, value);
                }
            }
            Some(RouteMatch {
                target: rule.target,
                captures,
            })
        }
    }
}

/// Decode `%XX` escapes. Invalid UTF-8 after decoding is replaced rather
/// than rejected.
pub fn decode_percent(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    let bytes = urlencoding::decode_binary(raw.as_bytes());
    Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
}

/// Form-style decoding: `+` is a space, then `%XX` escapes
pub fn decode_form(raw: &str) -> Cow<'_, str> {
    if !raw.contains('+') {
        return decode_percent(raw);
    }
    Cow::Owned(decode_percent(&raw.replace('+', " ")).into_owned())
}
