use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub tracking_server: ServerConfig,
    pub auth: AuthConfig,
    pub frontend: FrontendConfig,
    pub tracking: TrackingConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub mentions: Option<MentionsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    None,
    ApiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Directory with the dashboard assets, served at `/` of the API server
    pub static_dir: Option<String>,
    /// Directory with the tracked site, served behind the bot tracking middleware
    pub site_dir: Option<String>,
}

/// Which built-in signature list the tracking middleware classifies against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryChoice {
    Core,
    Extended,
}

/// Client IP extraction trust mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Always use the socket address
    None,
    /// Forwarded / X-Forwarded-For
    Standard,
    /// CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub registry: RegistryChoice,
    #[serde(default)]
    pub extra_signatures: Vec<String>,
    pub trusted_proxy_mode: TrustedProxyMode,
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
    pub geoip_city_db_path: Option<String>,
    pub logger_buffer_size: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            registry: RegistryChoice::Core,
            extra_signatures: Vec::new(),
            trusted_proxy_mode: TrustedProxyMode::Standard,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
            geoip_city_db_path: None,
            logger_buffer_size: TrackingConfig::default_logger_buffer_size(),
        }
    }
}

impl TrackingConfig {
    const fn default_logger_buffer_size() -> usize {
        10_000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub page_size: u32,
}

impl DashboardConfig {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionsConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub brands: Vec<String>,
    pub interval_secs: u64,
}

impl MentionsConfig {
    pub const DEFAULT_API_URL: &'static str = "https://api.openai.com/v1/chat/completions";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";

    const fn default_interval_secs() -> u64 {
        86_400
    }
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./botwatch.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port")?;

        let tracking_host =
            std::env::var("TRACKING_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let tracking_port = std::env::var("TRACKING_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("TRACKING_PORT must be a valid port")?;

        let auth_mode = match std::env::var("AUTH_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => AuthMode::None,
            "api_key" | "apikey" => AuthMode::ApiKey,
            other => {
                tracing::warn!(
                    "Unknown AUTH_MODE '{other}', falling back to 'none'. Supported values: none, api_key"
                );
                AuthMode::None
            }
        };

        let registry = match std::env::var("BOT_REGISTRY")
            .unwrap_or_else(|_| "core".to_string())
            .to_lowercase()
            .as_str()
        {
            "core" => RegistryChoice::Core,
            "extended" => RegistryChoice::Extended,
            other => {
                tracing::warn!(
                    "Unknown BOT_REGISTRY '{other}', falling back to 'core'. Supported values: core, extended"
                );
                RegistryChoice::Core
            }
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "standard".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'standard'"
                );
                TrustedProxyMode::Standard
            }
        };

        let trusted_proxies = env_list("TRUSTED_PROXIES")
            .iter()
            .map(|cidr| {
                cidr.parse::<IpNet>()
                    .with_context(|| format!("invalid CIDR in TRUSTED_PROXIES: {cidr}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let logger_buffer_size = std::env::var("LOGGER_BUFFER_SIZE")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("LOGGER_BUFFER_SIZE must be a positive integer")?
            .unwrap_or_else(TrackingConfig::default_logger_buffer_size);

        let page_size = std::env::var("DASHBOARD_PAGE_SIZE")
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("DASHBOARD_PAGE_SIZE must be a positive integer")?
            .unwrap_or(DashboardConfig::DEFAULT_PAGE_SIZE)
            .max(1);

        let mentions = match std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()) {
            Some(api_key) => {
                let interval_secs = std::env::var("MENTION_INTERVAL_SECS")
                    .ok()
                    .map(|v| v.parse::<u64>())
                    .transpose()
                    .context("MENTION_INTERVAL_SECS must be a positive integer")?
                    .unwrap_or_else(MentionsConfig::default_interval_secs);

                Some(MentionsConfig {
                    api_url: std::env::var("LLM_API_URL")
                        .unwrap_or_else(|_| MentionsConfig::DEFAULT_API_URL.to_string()),
                    api_key,
                    model: std::env::var("LLM_MODEL")
                        .unwrap_or_else(|_| MentionsConfig::DEFAULT_MODEL.to_string()),
                    brands: env_list("MENTION_BRANDS"),
                    interval_secs,
                })
            }
            None => None,
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            tracking_server: ServerConfig {
                host: tracking_host,
                port: tracking_port,
            },
            auth: AuthConfig {
                mode: auth_mode,
                api_keys: env_list("API_KEYS"),
            },
            frontend: FrontendConfig {
                static_dir: std::env::var("FRONTEND_STATIC_DIR").ok(),
                site_dir: std::env::var("SITE_DIR").ok(),
            },
            tracking: TrackingConfig {
                registry,
                extra_signatures: env_list("EXTRA_BOT_SIGNATURES"),
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
                geoip_city_db_path: std::env::var("GEOIP_CITY_DB_PATH").ok(),
                logger_buffer_size,
            },
            dashboard: DashboardConfig { page_size },
            mentions,
        })
    }
}
