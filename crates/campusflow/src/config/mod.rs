use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    fn default_log_level(self) -> &'static str {
        match self {
            Self::Production => "info",
            Self::Development | Self::Test => "debug",
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub worker: WorkerSettings,
    pub prospection: ProspectionSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL")
            .unwrap_or_else(|_| environment.default_log_level().to_string());

        let worker = WorkerSettings::from_env()?;
        let prospection = ProspectionSettings::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            worker,
            prospection,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Cadence and batching for the prospection reconciliation worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub interval_seconds: u64,
    pub batch_size: usize,
    pub enabled: bool,
}

impl WorkerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let interval_seconds = env::var("WORKER_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "900".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidWorkerInterval)?;
        if interval_seconds == 0 {
            return Err(ConfigError::InvalidWorkerInterval);
        }

        let batch_size = env::var("WORKER_BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidWorkerBatchSize)?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidWorkerBatchSize);
        }

        let enabled = match env::var("WORKER_ENABLED") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidWorkerEnabled)?,
            Err(_) => true,
        };

        Ok(Self {
            interval_seconds,
            batch_size,
            enabled,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 900,
            batch_size: 100,
            enabled: true,
        }
    }
}

/// Lifetime applied to prospection entries accepted through the intake.
#[derive(Debug, Clone)]
pub struct ProspectionSettings {
    pub ttl_seconds: u64,
}

impl ProspectionSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let ttl_seconds = env::var("PROSPECTION_TTL_SECONDS")
            .unwrap_or_else(|_| "7200".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidProspectionTtl)?;
        if ttl_seconds == 0 {
            return Err(ConfigError::InvalidProspectionTtl);
        }

        Ok(Self { ttl_seconds })
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for ProspectionSettings {
    fn default() -> Self {
        Self { ttl_seconds: 7200 }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidWorkerInterval,
    InvalidWorkerBatchSize,
    InvalidWorkerEnabled,
    InvalidProspectionTtl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidWorkerInterval => {
                write!(f, "WORKER_INTERVAL_SECONDS must be a positive integer")
            }
            ConfigError::InvalidWorkerBatchSize => {
                write!(f, "WORKER_BATCH_SIZE must be a positive integer")
            }
            ConfigError::InvalidWorkerEnabled => {
                write!(f, "WORKER_ENABLED must be a boolean flag")
            }
            ConfigError::InvalidProspectionTtl => {
                write!(f, "PROSPECTION_TTL_SECONDS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("WORKER_INTERVAL_SECONDS");
        env::remove_var("WORKER_BATCH_SIZE");
        env::remove_var("WORKER_ENABLED");
        env::remove_var("PROSPECTION_TTL_SECONDS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.worker.interval_seconds, 900);
        assert_eq!(config.worker.batch_size, 100);
        assert!(config.worker.enabled);
        assert_eq!(config.prospection.ttl_seconds, 7200);
    }

    #[test]
    fn production_defaults_to_info_logging() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn worker_overrides_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("WORKER_INTERVAL_SECONDS", "60");
        env::set_var("WORKER_BATCH_SIZE", "25");
        env::set_var("WORKER_ENABLED", "off");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.worker.interval_seconds, 60);
        assert_eq!(config.worker.batch_size, 25);
        assert!(!config.worker.enabled);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("WORKER_BATCH_SIZE", "0");
        let err = AppConfig::load().expect_err("zero batch size is invalid");
        assert!(matches!(err, ConfigError::InvalidWorkerBatchSize));
    }
}
