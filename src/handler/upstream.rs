//! Upstream handler
//!
//! Forwards an API request to the content backend that owns it. Route
//! captures travel as query parameters, since that is where the backend
//! reads `id` and `slug` from.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderName, CONNECTION, CONTENT_LENGTH, HOST};
use hyper::{HeaderMap, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::backend::{Handler, HandlerFuture, HandlerRequest};
use crate::error::{ConfigError, DispatchError};
use crate::http::response::build_plain_error_response;
use crate::logger;
use crate::routing::HandlerId;

pub type UpstreamClient = Client<HttpConnector, Full<Bytes>>;

/// Connection-scoped headers that must not be forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn build_client() -> UpstreamClient {
    Client::builder(TokioExecutor::new()).build_http()
}

pub struct UpstreamHandler {
    id: HandlerId,
    /// Scheme, authority and optional path prefix, no trailing slash
    base: String,
    client: UpstreamClient,
    timeout: Duration,
}

impl UpstreamHandler {
    pub fn new(
        id: HandlerId,
        base: &str,
        client: UpstreamClient,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUpstream {
            handler: id,
            reason,
        };
        let url = url::Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.query().is_some() {
            return Err(invalid("query string not allowed in upstream base".to_string()));
        }

        Ok(Self {
            id,
            base: base.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    /// Target URI: base + original path + query with captures merged in
    pub fn upstream_uri(&self, request: &HandlerRequest) -> Result<Uri, DispatchError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(request.merged_query())
            .finish();

        let target = if query.is_empty() {
            format!("{}{}", self.base, request.path)
        } else {
            format!("{}{}?{}", self.base, request.path, query)
        };

        target
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| self.unavailable(e.to_string()))
    }

    async fn forward(&self, request: HandlerRequest) -> Result<Response<Full<Bytes>>, DispatchError> {
        let uri = self.upstream_uri(&request)?;
        let HandlerRequest {
            method,
            headers,
            body,
            ..
        } = request;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(out) = builder.headers_mut() {
            copy_end_to_end(&headers, out, false);
        }
        let upstream_req = builder
            .body(Full::new(body))
            .map_err(|e| self.unavailable(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(upstream_req)
                .await
                .map_err(|e| self.unavailable(e.to_string()))?;
            let (parts, incoming) = response.into_parts();
            let bytes = incoming
                .collect()
                .await
                .map_err(|e| self.unavailable(e.to_string()))?
                .to_bytes();
            Ok::<_, DispatchError>((parts, bytes))
        };

        let (mut parts, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DispatchError::UpstreamTimeout(self.id))??;

        let mut headers = HeaderMap::with_capacity(parts.headers.len());
        copy_end_to_end(&parts.headers, &mut headers, true);
        parts.headers = headers;

        Ok(Response::from_parts(parts, Full::new(bytes)))
    }

    fn unavailable(&self, reason: String) -> DispatchError {
        DispatchError::UpstreamUnavailable {
            handler: self.id,
            reason,
        }
    }
}

impl Handler for UpstreamHandler {
    fn handle(&self, request: HandlerRequest) -> HandlerFuture<'_> {
        Box::pin(async move {
            match self.forward(request).await {
                Ok(response) => response,
                Err(e) => {
                    logger::log_error(&e.to_string());
                    build_plain_error_response(&e)
                }
            }
        })
    }
}

/// Copy headers minus hop-by-hop ones, including any named in
/// `Connection`; `Host` is dropped on the way in, `Content-Length` on the
/// way out (the body has been re-buffered).
fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap, response: bool) {
    let listed = connection_tokens(from);
    for (name, value) in from {
        if is_hop_by_hop(name) || listed.iter().any(|token| token == name.as_str()) {
            continue;
        }
        if (!response && name == HOST) || (response && name == CONTENT_LENGTH) {
            continue;
        }
        to.append(name, value.clone());
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Lowercased header names listed in every `Connection` header
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}
