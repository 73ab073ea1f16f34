//! Route rule definitions
//!
//! The route table is an ordered list of declarative rules. Order is priority:
//! blog patterns, then the exact handler table, then the static prefixes, then
//! health checks. Anything else is not found.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::HealthConfig;

/// Logical handler behind an API route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerId {
    Blogs,
    Categories,
    Banner,
    AdminBlogs,
    AuthLogin,
    AdminBanners,
    AdminRelatedBooks,
}

impl HandlerId {
    pub const ALL: [Self; 7] = [
        Self::Blogs,
        Self::Categories,
        Self::Banner,
        Self::AdminBlogs,
        Self::AuthLogin,
        Self::AdminBanners,
        Self::AdminRelatedBooks,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blogs => "blogs",
            Self::Categories => "categories",
            Self::Banner => "banner",
            Self::AdminBlogs => "admin_blogs",
            Self::AuthLogin => "auth_login",
            Self::AdminBanners => "admin_banners",
            Self::AdminRelatedBooks => "admin_related_books",
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory a static route serves from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticRoot {
    /// User uploads; no fallback
    Uploads,
    /// Frontend public assets; falls back to the default image
    Assets,
}

impl StaticRoot {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uploads => "uploads",
            Self::Assets => "assets",
        }
    }
}

/// Where a matched request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Handler(HandlerId),
    Static(StaticRoot),
    Health,
    NotFound,
}

impl RouteTarget {
    /// Short label used in access logs
    pub const fn label(self) -> &'static str {
        match self {
            Self::Handler(id) => id.as_str(),
            Self::Static(root) => root.as_str(),
            Self::Health => "health",
            Self::NotFound => "-",
        }
    }
}

/// Named substrings extracted from the path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(HashMap<String, String>);

impl Captures {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// How captured values are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// Kept exactly as matched
    Raw,
    /// `%XX` escapes only; `+` is a literal character in a path
    Percent,
    /// `%XX` escapes and `+` as space, for slugs
    Form,
}

/// How a rule tests the request path
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Whole path must be equal
    Exact(String),
    /// Anchored regex; every named group becomes a capture
    Pattern {
        regex: Regex,
        decode: Decode,
    },
}

/// One entry of the route table
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub matcher: PathMatcher,
    pub target: RouteTarget,
}

impl RouteRule {
    pub fn exact(path: impl Into<String>, target: RouteTarget) -> Self {
        Self {
            matcher: PathMatcher::Exact(path.into()),
            target,
        }
    }

    pub fn pattern(pattern: &str, decode: Decode, target: RouteTarget) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: PathMatcher::Pattern {
                regex: Regex::new(pattern)?,
                decode,
            },
            target,
        })
    }
}

/// Exact-path handler table, evaluated after the blog patterns
const EXACT_ROUTES: [(&str, HandlerId); 6] = [
    ("/api/categories", HandlerId::Categories),
    ("/api/banner", HandlerId::Banner),
    ("/api/admin/blogs", HandlerId::AdminBlogs),
    ("/api/auth/login", HandlerId::AuthLogin),
    ("/api/admin/banners", HandlerId::AdminBanners),
    ("/api/admin/related-books", HandlerId::AdminRelatedBooks),
];

/// Build the ordered rule list
pub fn build_rules(health: &HealthConfig) -> Result<Vec<RouteRule>, regex::Error> {
    let blogs = RouteTarget::Handler(HandlerId::Blogs);

    let mut rules = vec![
        RouteRule::exact("/api/blogs", blogs),
        RouteRule::pattern(r"^/api/blogs/(?P<id>\d+)$", Decode::Raw, blogs)?,
        RouteRule::pattern(r"^/api/blogs/slug/(?P<slug>[^/]+)$", Decode::Form, blogs)?,
    ];

    rules.extend(
        EXACT_ROUTES
            .iter()
            .map(|(path, id)| RouteRule::exact(*path, RouteTarget::Handler(*id))),
    );

    rules.push(RouteRule::pattern(
        r"^/uploads/(?P<path>.+)$",
        Decode::Percent,
        RouteTarget::Static(StaticRoot::Uploads),
    )?);
    rules.push(RouteRule::pattern(
        r"^/assets/(?P<path>.+)$",
        Decode::Percent,
        RouteTarget::Static(StaticRoot::Assets),
    )?);

    if health.enabled {
        rules.push(RouteRule::exact(health.liveness_path.clone(), RouteTarget::Health));
        rules.push(RouteRule::exact(health.readiness_path.clone(), RouteTarget::Health));
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order() {
        let rules = build_rules(&HealthConfig::default()).unwrap();
        let targets: Vec<RouteTarget> = rules.iter().map(|r| r.target).collect();

        assert_eq!(targets[0], RouteTarget::Handler(HandlerId::Blogs));
        assert_eq!(targets[3], RouteTarget::Handler(HandlerId::Categories));
        assert_eq!(targets[9], RouteTarget::Static(StaticRoot::Uploads));
        assert_eq!(targets[10], RouteTarget::Static(StaticRoot::Assets));
        assert_eq!(targets[11], RouteTarget::Health);
        assert_eq!(rules.len(), 13);
    }

    #[test]
    fn test_health_rules_disabled() {
        let health = HealthConfig {
            enabled: false,
            ..HealthConfig::default()
        };
        let rules = build_rules(&health).unwrap();
        assert!(rules.iter().all(|r| r.target != RouteTarget::Health));
    }

    #[test]
    fn test_handler_id_names() {
        assert_eq!(HandlerId::AdminRelatedBooks.to_string(), "admin_related_books");
        assert_eq!(RouteTarget::Static(StaticRoot::Assets).label(), "assets");
        assert_eq!(RouteTarget::NotFound.label(), "-");
    }
}
