//! Handler contract and registry
//!
//! API routes end in a `Handler`. The router hands it the request together
//! with the route captures and returns whatever it answers.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{HeaderMap, Method, Response};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::upstream::{build_client, UpstreamHandler};
use crate::error::ConfigError;
use crate::routing::{Captures, HandlerId};

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Response<Full<Bytes>>> + Send + 'a>>;

/// A collaborator that answers API requests
pub trait Handler: Send + Sync {
    fn handle(&self, request: HandlerRequest) -> HandlerFuture<'_>;
}

/// Request as seen by a handler
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub captures: Captures,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HandlerRequest {
    /// Query pairs with the captures merged in; a capture replaces every
    /// query pair of the same name.
    pub fn merged_query(&self) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = self
            .query
            .iter()
            .filter(|(key, _)| self.captures.get(key).is_none())
            .cloned()
            .collect();

        let mut captures: Vec<(&str, &str)> = self.captures.iter().collect();
        captures.sort_unstable();
        merged.extend(
            captures
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        merged
    }
}

#[cfg(test)]
impl HandlerRequest {
    /// Captures first, then the last query value of that name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.captures.get(name).or_else(|| {
            self.query
                .iter()
                .rev()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }
}

/// Handler per handler id; ids without an entry answer 503
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: HandlerId, handler: Arc<dyn Handler>) {
        self.handlers.insert(id, handler);
    }

    pub fn get(&self, id: HandlerId) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&id)
    }

    /// One upstream handler per configured base URL, sharing a single client
    pub fn from_upstreams(
        upstreams: &HashMap<HandlerId, String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = build_client();
        let mut registry = Self::new();
        for (id, base) in upstreams {
            let handler = UpstreamHandler::new(*id, base, client.clone(), timeout)?;
            registry.register(*id, Arc::new(handler));
        }
        Ok(registry)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.handlers.keys().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        f.debug_struct("HandlerRegistry").field("handlers", &ids).finish()
    }
}
