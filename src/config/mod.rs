// Configuration module entry point
// Loads layered configuration and holds the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{Config, HealthConfig, StaticFilesConfig};

use crate::error::ConfigError;

/// Environment variable prefix, e.g. `BLOGGATE__SERVER__PORT=9090`
const ENV_PREFIX: &str = "BLOGGATE";

impl Config {
    /// Load configuration from the given file path (extension optional).
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.shutdown_timeout", 10)?
            .set_default("performance.upstream_timeout", 30)?
            .set_default("http.server_name", "blog-gateway")?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidAddress {
            addr: addr.clone(),
            reason: e.to_string(),
        })
    }

    /// Check the settings the router depends on before anything is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cors.allowed_origins.is_empty() {
            return Err(ConfigError::NoAllowedOrigins);
        }

        for (handler, upstream) in &self.handlers {
            let url = url::Url::parse(upstream).map_err(|e| ConfigError::InvalidUpstream {
                handler: *handler,
                reason: e.to_string(),
            })?;
            if url.scheme() != "http" {
                return Err(ConfigError::InvalidUpstream {
                    handler: *handler,
                    reason: format!("unsupported scheme '{}', only http is supported", url.scheme()),
                });
            }
            if url.host_str().is_none() {
                return Err(ConfigError::InvalidUpstream {
                    handler: *handler,
                    reason: "missing host".to_string(),
                });
            }
        }

        self.get_socket_addr().map(|_| ())
    }
}
