//! CORS header resolution
//!
//! The allow-origin value is an exact, case-sensitive echo of an allow-listed
//! origin, or the first allow-listed origin. The remaining headers are fixed.

use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::http::response::Builder;
use hyper::Method;

use crate::error::ConfigError;

pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

/// Validated allow-list, built once from configuration
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<HeaderValue>,
}

impl CorsPolicy {
    pub fn new(allowed_origins: &[String]) -> Result<Self, ConfigError> {
        if allowed_origins.is_empty() {
            return Err(ConfigError::NoAllowedOrigins);
        }
        let allowed_origins = allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { allowed_origins })
    }

    /// Resolve the CORS headers for a request's `Origin` header
    pub fn resolve(&self, origin: Option<&str>) -> CorsHeaders {
        let allow_origin = origin
            .and_then(|o| self.allowed_origins.iter().find(|allowed| *allowed == o))
            .unwrap_or(&self.allowed_origins[0])
            .clone();
        CorsHeaders { allow_origin }
    }
}

/// The four CORS headers of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsHeaders {
    allow_origin: HeaderValue,
}

impl CorsHeaders {
    /// Start a response builder with the CORS headers in front
    pub fn builder(&self) -> Builder {
        hyper::Response::builder()
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone())
            .header(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
            .header(ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS)
            .header(ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS)
    }
}

pub fn is_preflight(method: &Method) -> bool {
    method == Method::OPTIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list() -> Vec<String> {
        vec![
            "http://localhost:5173".to_string(),
            "http://localhost:3000".to_string(),
        ]
    }

    #[test]
    fn test_allowed_origin_is_echoed() {
        let cors = CorsPolicy::new(&allow_list())
            .unwrap()
            .resolve(Some("http://localhost:3000"));
        assert_eq!(cors.allow_origin, "http://localhost:3000");
    }

    #[test]
    fn test_unknown_origin_gets_default() {
        let policy = CorsPolicy::new(&allow_list()).unwrap();
        for origin in [
            Some("https://evil.example"),
            Some("HTTP://LOCALHOST:3000"),
            Some("http://localhost:3000/"),
            Some("*"),
            None,
        ] {
            let cors = policy.resolve(origin);
            assert_eq!(cors.allow_origin, "http://localhost:5173", "origin {origin:?}");
        }
    }

    #[test]
    fn test_fixed_headers_in_order() {
        let cors = CorsPolicy::new(&allow_list()).unwrap().resolve(None);
        let resp = cors.builder().body(()).unwrap();
        let names: Vec<&str> = resp.headers().keys().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "access-control-allow-origin",
                "access-control-allow-credentials",
                "access-control-allow-methods",
                "access-control-allow-headers",
            ]
        );
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_METHODS], ALLOW_METHODS);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_HEADERS], ALLOW_HEADERS);
    }

    #[test]
    fn test_invalid_allow_list() {
        assert!(matches!(CorsPolicy::new(&[]), Err(ConfigError::NoAllowedOrigins)));
        assert!(matches!(
            CorsPolicy::new(&["http://bad\norigin".to_string()]),
            Err(ConfigError::InvalidOrigin(_))
        ));
    }

    #[test]
    fn test_is_preflight() {
        assert!(is_preflight(&Method::OPTIONS));
        assert!(!is_preflight(&Method::GET));
        assert!(!is_preflight(&Method::DELETE));
    }
}
