//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: CORS, preflight short-circuit,
//! route matching, and dispatch to a handler or a static directory.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::http::request::Parts;
use hyper::header::{HeaderMap, CONTENT_LENGTH, ORIGIN, REFERER, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::backend::{HandlerRegistry, HandlerRequest};
use super::static_files::{StaticRequest, StaticResolver};
use crate::config::{AppState, Config};
use crate::error::{ConfigError, DispatchError};
use crate::http::{self as http_layer, is_preflight, CorsHeaders, CorsPolicy};
use crate::logger::{self, AccessLogEntry};
use crate::routing::{Captures, HandlerId, RouteMatch, RouteTable, RouteTarget};

/// A request with its body already read
#[derive(Debug, Clone)]
pub struct RouterRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RouterRequest {
    /// Build from the request head and the already collected body
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            path: parts.uri.path().to_string(),
            query: parse_query(parts.uri.query()),
            method: parts.method,
            headers: parts.headers,
            body,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.headers.get(ORIGIN).and_then(|v| v.to_str().ok())
    }
}

/// Response plus the route label for the access log
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response<Full<Bytes>>,
    pub route: &'static str,
}

/// Immutable per-process router
#[derive(Debug)]
pub struct Dispatcher {
    cors: CorsPolicy,
    routes: RouteTable,
    statics: StaticResolver,
    handlers: HandlerRegistry,
}

impl Dispatcher {
    pub const fn new(
        cors: CorsPolicy,
        routes: RouteTable,
        statics: StaticResolver,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            cors,
            routes,
            statics,
            handlers,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let handlers = HandlerRegistry::from_upstreams(
            &config.handlers,
            Duration::from_secs(config.performance.upstream_timeout),
        )?;
        for id in HandlerId::ALL {
            if handlers.get(id).is_none() {
                logger::log_warning(&format!(
                    "No upstream configured for handler '{id}', its routes will answer 503"
                ));
            }
        }

        Ok(Self::new(
            CorsPolicy::new(&config.cors.allowed_origins)?,
            RouteTable::new(&config.health)?,
            StaticResolver::from_config(&config.static_files),
            handlers,
        ))
    }

    pub fn cors_for(&self, headers: &HeaderMap) -> CorsHeaders {
        self.cors
            .resolve(headers.get(ORIGIN).and_then(|v| v.to_str().ok()))
    }

    /// Route one request to its response
    pub async fn dispatch(&self, request: RouterRequest) -> Dispatched {
        let cors = self.cors.resolve(request.origin());

        if is_preflight(&request.method) {
            return Dispatched {
                response: http_layer::build_preflight_response(&cors),
                route: "preflight",
            };
        }

        let RouteMatch { target, captures } = self.routes.match_path(&request.path);

        let response = match target {
            RouteTarget::Handler(id) => self.call_handler(&cors, id, captures, request).await,
            RouteTarget::Static(root) => {
                let relative = captures.get("path").unwrap_or_default();
                let ctx = StaticRequest::from_parts(&request.method, &request.headers);
                self.statics.serve(&cors, root, relative, &ctx).await
            }
            RouteTarget::Health => http_layer::build_json_response(
                &cors,
                StatusCode::OK,
                &serde_json::json!({ "status": "ok" }),
            ),
            RouteTarget::NotFound => {
                let err = DispatchError::RouteNotFound(request.path);
                http_layer::build_error_response(&cors, &err)
            }
        };

        Dispatched {
            response,
            route: target.label(),
        }
    }

    async fn call_handler(
        &self,
        cors: &CorsHeaders,
        id: HandlerId,
        captures: Captures,
        request: RouterRequest,
    ) -> Response<Full<Bytes>> {
        let Some(handler) = self.handlers.get(id) else {
            return http_layer::build_error_response(cors, &DispatchError::HandlerNotConfigured(id));
        };

        let RouterRequest {
            method,
            path,
            query,
            headers,
            body,
        } = request;
        let response = handler
            .handle(HandlerRequest {
                method,
                path,
                query,
                captures,
                headers,
                body,
            })
            .await;
        http_layer::with_cors(cors, response)
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let mut entry = state.access_log.then(|| {
        let mut entry = AccessLogEntry::new(
            peer_addr.ip().to_string(),
            parts.method.to_string(),
            parts.uri.path().to_string(),
        );
        entry.query = parts.uri.query().map(ToString::to_string);
        entry.http_version = version_label(parts.version).to_string();
        entry.referer = header_string(&parts.headers, REFERER);
        entry.user_agent = header_string(&parts.headers, USER_AGENT);
        entry
    });

    // preflight never reads the body
    let body = if is_preflight(&parts.method) {
        Ok(Bytes::new())
    } else {
        read_body(body, &parts.headers, state.config.http.max_body_size).await
    };

    let Dispatched {
        mut response,
        route,
    } = match body {
        Ok(body) => {
            state
                .dispatcher
                .dispatch(RouterRequest::from_parts(parts, body))
                .await
        }
        Err(e) => {
            logger::log_warning(&e.to_string());
            Dispatched {
                response: http_layer::build_error_response(&state.dispatcher.cors_for(&parts.headers), &e),
                route: "-",
            }
        }
    };

    http_layer::set_server_header(&mut response, &state.config.http.server_name);

    if let Some(entry) = entry.as_mut() {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.route = route.to_string();
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Collect the body, refusing anything above `max_body_size`
async fn read_body<B>(
    body: B,
    headers: &HeaderMap,
    max_body_size: u64,
) -> Result<Bytes, DispatchError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|size| size > max_body_size) {
        return Err(DispatchError::PayloadTooLarge);
    }

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(DispatchError::PayloadTooLarge)
        }
        Err(e) => Err(DispatchError::BadRequestBody(e.to_string())),
    }
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query.map_or_else(Vec::new, |q| {
        url::form_urlencoded::parse(q.as_bytes())
            .into_owned()
            .collect()
    })
}

fn header_string(headers: &HeaderMap, name: hyper::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

const fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
