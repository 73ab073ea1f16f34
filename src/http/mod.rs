//! HTTP protocol layer module
//!
//! CORS resolution, MIME detection, cache headers and response builders.
//! Nothing here knows about routes or handlers.

pub mod cache;
pub mod cors;
pub mod mime;
pub mod response;

pub use cors::{is_preflight, CorsHeaders, CorsPolicy};
pub use response::{
    build_304_response, build_error_response, build_json_response, build_preflight_response,
    build_static_response, set_server_header, with_cors, StaticBody,
};
