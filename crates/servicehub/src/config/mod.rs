use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::marketplace::domain::UserId;

const DEFAULT_COUNTRY_CODE: &str = "55";

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
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub marketplace: MarketplaceConfig,
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

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            marketplace: MarketplaceConfig::from_env()?,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Marketplace policy knobs: alert dispatch and the admin allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceConfig {
    pub country_code: String,
    pub external_alerts: bool,
    pub admin_users: BTreeSet<UserId>,
    pub directory_csv: Option<PathBuf>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            external_alerts: true,
            admin_users: BTreeSet::new(),
            directory_csv: None,
        }
    }
}

impl MarketplaceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let country_code = env::var("MARKETPLACE_COUNTRY_CODE")
            .unwrap_or_else(|_| DEFAULT_COUNTRY_CODE.to_string())
            .trim()
            .to_string();
        if country_code.is_empty() || !country_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidCountryCode(country_code));
        }

        let external_alerts = match env::var("MARKETPLACE_EXTERNAL_ALERTS") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                name: "MARKETPLACE_EXTERNAL_ALERTS",
                value: raw,
            })?,
            Err(_) => true,
        };

        let admin_users = env::var("MARKETPLACE_ADMIN_USERS")
            .map(|raw| parse_user_list(&raw))
            .unwrap_or_default();

        let directory_csv = env::var("MARKETPLACE_DIRECTORY_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            country_code,
            external_alerts,
            admin_users,
            directory_csv,
        })
    }
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_user_list(raw: &str) -> BTreeSet<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(UserId::new)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCountryCode(String),
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCountryCode(value) => write!(
                f,
                "MARKETPLACE_COUNTRY_CODE must be digits only (found '{}')",
                value
            ),
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{} must be true or false (found '{}')", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidCountryCode(_)
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
