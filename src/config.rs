use crate::engine::EngineOptions;

/// Server settings, read from `COURTSIDE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address (`COURTSIDE_BIND`).
    pub bind: String,
    /// Postgres wire port (`COURTSIDE_PORT`).
    pub port: u16,
    /// Concurrent connection cap (`COURTSIDE_MAX_CONNECTIONS`).
    pub max_connections: usize,
    /// Prometheus exporter port; disabled when unset (`COURTSIDE_METRICS_PORT`).
    pub metrics_port: Option<u16>,
    /// Re-check overlaps when a booking is moved (`COURTSIDE_STRICT_UPDATES`).
    pub strict_updates: bool,
    /// `tracing` filter directive (`COURTSIDE_LOG`).
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            max_connections: 256,
            metrics_port: None,
            strict_updates: false,
            log_filter: "info".into(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable values fall back to
    /// the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("COURTSIDE_BIND").unwrap_or(defaults.bind),
            port: lookup("COURTSIDE_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            max_connections: lookup("COURTSIDE_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            metrics_port: lookup("COURTSIDE_METRICS_PORT").and_then(|s| s.parse().ok()),
            strict_updates: lookup("COURTSIDE_STRICT_UPDATES")
                .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.strict_updates),
            log_filter: lookup("COURTSIDE_LOG").unwrap_or(defaults.log_filter),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            recheck_overlap_on_update: self.strict_updates,
        }
    }
}
