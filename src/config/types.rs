// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::routing::HandlerId;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub static_files: StaticFilesConfig,
    #[serde(default)]
    pub health: HealthConfig,
    /// Upstream base URL per handler, e.g. `blogs = "http://127.0.0.1:8000"`
    #[serde(default)]
    pub handlers: HashMap<HandlerId, String>,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

#[allow(clippy::missing_const_for_fn)]
fn default_backlog() -> i32 {
    1024
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration, all durations in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
    pub shutdown_timeout: u64,
    pub upstream_timeout: u64,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub max_body_size: u64,
}

/// CORS allow-list; the first entry is the fallback origin
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Static directories served under `/uploads` and `/assets`
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StaticFilesConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    /// Image served when an `/assets` file is missing
    #[serde(default = "default_image")]
    pub default_image: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_uploads_dir() -> String {
    "uploads".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_assets_dir() -> String {
    "frontend/public/assets".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_image() -> Option<String> {
    Some("uploads/1758801057_a-book-759873_640.jpg".to_string())
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            assets_dir: default_assets_dir(),
            default_image: default_image(),
        }
    }
}

/// Health check configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthConfig {
    /// Enable health check endpoints
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    /// Liveness check path (default: /healthz)
    #[serde(default = "default_healthz_path")]
    pub liveness_path: String,
    /// Readiness check path (default: /readyz)
    #[serde(default = "default_readyz_path")]
    pub readiness_path: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_health_enabled() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_healthz_path() -> String {
    "/healthz".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_readyz_path() -> String {
    "/readyz".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            liveness_path: default_healthz_path(),
            readiness_path: default_readyz_path(),
        }
    }
}
