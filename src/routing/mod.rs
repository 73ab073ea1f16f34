//! Routing module
//!
//! Provides the ordered route table in front of the API handlers and static
//! directories:
//! - Exact and pattern rules with named captures
//! - First-match-wins evaluation
//! - Health check routes

mod matcher;
mod rules;

pub use matcher::{match_route, RouteMatch};
pub use rules::{build_rules, Captures, HandlerId, RouteRule, RouteTarget, StaticRoot};

use crate::config::HealthConfig;

/// Immutable route table built once at start-up
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(health: &HealthConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            rules: build_rules(health)?,
        })
    }

    pub fn match_path(&self, path: &str) -> RouteMatch {
        match_route(path, &self.rules)
    }
}
