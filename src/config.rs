use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::query::QueryConfig;

/// Client configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiSettings,
    pub cache: CacheSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// File holding the bearer token. Ignored when `token` is set.
    pub token_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Where cache entries are persisted. Memory only when unset.
    pub persist_path: Option<PathBuf>,
    pub retry: bool,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            token_path: None,
            timeout_secs: 30,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            ttl_secs: 300,
            sweep_interval_secs: 60,
            persist_path: None,
            retry: false,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl ApiSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheSettings {
    pub const fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl From<&CacheSettings> for QueryConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self::new(settings.stale_time(), settings.ttl()).with_retry(settings.retry, settings.retry_delay())
    }
}

impl ClientConfig {
    /// Loads `config/default`, then `config/local`, then `REIMS__*` environment
    /// variables. A `.env` file is read first when present.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("REIMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Loads a single configuration file, for example the one given on the command line.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig::from(&self.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.persist_path, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_query_config_from_cache_section() {
        let settings = CacheSettings {
            stale_time_ms: 30_000,
            ttl_secs: 600,
            retry: true,
            retry_delay_ms: 250,
            ..CacheSettings::default()
        };

        let query = QueryConfig::from(&settings);
        assert_eq!(query.stale_time, Duration::from_secs(30));
        assert_eq!(query.cache_time, Duration::from_secs(600));
        assert!(query.retry);
        assert_eq!(query.retry_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_load_from_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(
            file,
            r#"
[api]
base_url = "https://reims.example.com"
token = "secret"

[cache]
stale_time_ms = 30000

[logging]
format = "json"
"#
        )
        .expect("write config");

        let config = ClientConfig::load_from(file.path()).expect("load config");
        assert_eq!(config.api.base_url, "https://reims.example.com");
        assert_eq!(config.api.token.as_deref(), Some("secret"));
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.cache.stale_time(), Duration::from_secs(30));
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }
}
