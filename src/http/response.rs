//! HTTP response building module
//!
//! Every builder starts from the request's CORS headers so they always come
//! first in the header map.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL,
    CONTENT_LENGTH, CONTENT_TYPE, ETAG, SERVER,
};
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};

use super::cache::CachePolicy;
use super::cors::CorsHeaders;
use crate::error::DispatchError;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Static file payload ready to be sent
#[derive(Debug)]
pub struct StaticBody<'a> {
    pub data: Bytes,
    pub content_type: &'static str,
    pub etag: &'a str,
    pub cache: CachePolicy,
    pub is_head: bool,
    /// Open the file to any origin (uploads)
    pub public_origin: bool,
}

/// Preflight: 200, empty body, CORS headers only
pub fn build_preflight_response(cors: &CorsHeaders) -> Response<Full<Bytes>> {
    finish(cors.builder().status(StatusCode::OK), Bytes::new(), "OPTIONS")
}

/// JSON response with the router's content type
pub fn build_json_response(
    cors: &CorsHeaders,
    status: StatusCode,
    body: &serde_json::Value,
) -> Response<Full<Bytes>> {
    let builder = cors
        .builder()
        .status(status)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
    finish(builder, Bytes::from(body.to_string()), status.as_str())
}

/// `{"error": "..."}` with the status of the error
pub fn build_error_response(cors: &CorsHeaders, error: &DispatchError) -> Response<Full<Bytes>> {
    build_json_response(cors, error.status(), &error.to_json())
}

/// Error body without CORS headers, for handlers; the dispatcher adds them
pub fn build_plain_error_response(error: &DispatchError) -> Response<Full<Bytes>> {
    let builder = Response::builder()
        .status(error.status())
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
    finish(builder, Bytes::from(error.to_json().to_string()), error.status().as_str())
}

/// 200 response carrying file bytes
pub fn build_static_response(cors: &CorsHeaders, file: StaticBody<'_>) -> Response<Full<Bytes>> {
    let content_length = file.data.len();
    let body = if file.is_head { Bytes::new() } else { file.data };

    let builder = static_builder(cors, file.public_origin)
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, file.content_type)
        .header(CONTENT_LENGTH, content_length)
        .header(ETAG, file.etag)
        .header(CACHE_CONTROL, file.cache.to_header_value());
    finish(builder, body, "200")
}

/// 304 Not Modified for a matching `If-None-Match`
pub fn build_304_response(
    cors: &CorsHeaders,
    etag: &str,
    cache: CachePolicy,
    public_origin: bool,
) -> Response<Full<Bytes>> {
    let builder = static_builder(cors, public_origin)
        .status(StatusCode::NOT_MODIFIED)
        .header(ETAG, etag)
        .header(CACHE_CONTROL, cache.to_header_value());
    finish(builder, Bytes::new(), "304")
}

/// Re-emit a handler response with the CORS headers in front.
///
/// The handler's own `Access-Control-*` headers are dropped; status, other
/// headers and body pass through untouched.
pub fn with_cors(cors: &CorsHeaders, response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let (parts, body) = response.into_parts();
    let mut builder = cors.builder().status(parts.status).version(parts.version);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &parts.headers {
            if !name.as_str().starts_with("access-control-") {
                headers.append(name, value.clone());
            }
        }
    }
    match builder.body(body) {
        Ok(resp) => resp,
        Err(e) => {
            log_build_error("handler", &e);
            internal_error()
        }
    }
}

/// Stamp the `Server` header on an outgoing response
pub fn set_server_header(response: &mut Response<Full<Bytes>>, server_name: &str) {
    if let Ok(value) = HeaderValue::from_str(server_name) {
        response.headers_mut().insert(SERVER, value);
    }
}

fn static_builder(cors: &CorsHeaders, public_origin: bool) -> Builder {
    let mut builder = cors.builder();
    if public_origin {
        if let Some(headers) = builder.headers_mut() {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, OPTIONS"),
            );
        }
    }
    builder
}

fn finish(builder: Builder, body: Bytes, label: &str) -> Response<Full<Bytes>> {
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error(label, &e);
        internal_error()
    })
}

fn internal_error() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::cors::CorsPolicy;
    use http_body_util::BodyExt;

    fn cors() -> CorsHeaders {
        CorsPolicy::new(&["http://localhost:5173".to_string()])
            .unwrap()
            .resolve(None)
    }

    async fn body_string(resp: Response<Full<Bytes>>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_has_only_cors_headers() {
        let resp = build_preflight_response(&cors());
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().len(), 4);
        assert!(body_string(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_error_response() {
        let resp = build_error_response(&cors(), &DispatchError::RouteNotFound("/x".to_string()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
        let first = resp.headers().keys().next().unwrap().clone();
        assert_eq!(first, ACCESS_CONTROL_ALLOW_ORIGIN);
        assert_eq!(body_string(resp).await, r#"{"error":"Route not found: /x"}"#);
    }

    #[tokio::test]
    async fn test_static_response_head_and_public_origin() {
        let resp = build_static_response(
            &cors(),
            StaticBody {
                data: Bytes::from_static(b"png-bytes"),
                content_type: "image/png",
                etag: "\"1\"",
                cache: CachePolicy::Public(60),
                is_head: true,
                public_origin: true,
            },
        );
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
        assert_eq!(resp.headers()[CONTENT_LENGTH], "9");
        assert_eq!(resp.headers()[CACHE_CONTROL], "public, max-age=60");
        assert!(body_string(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_with_cors_replaces_handler_cors() {
        let handler_resp = Response::builder()
            .status(StatusCode::CREATED)
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(CONTENT_TYPE, "application/json")
            .header("x-blog-id", "7")
            .body(Full::new(Bytes::from_static(b"{\"id\":7}")))
            .unwrap();

        let resp = with_cors(&cors(), handler_resp);
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(
            resp.headers().get_all(ACCESS_CONTROL_ALLOW_ORIGIN).iter().count(),
            1
        );
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
        assert_eq!(resp.headers()["x-blog-id"], "7");
        assert_eq!(body_string(resp).await, r#"{"id":7}"#);
    }
}
