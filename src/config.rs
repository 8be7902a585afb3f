use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_credentials_key")]
    pub credentials_encryption_key: String,

    /// Server-wide Places key, used when a search request carries none.
    #[serde(default)]
    pub google_maps_api_key: Option<String>,

    #[serde(default = "default_places_language")]
    pub places_language: String,

    #[serde(default = "default_places_region")]
    pub places_region: String,

    /// Shared Evolution gateway for users without their own credentials.
    #[serde(default)]
    pub evolution_api_url: Option<String>,

    #[serde(default)]
    pub evolution_api_key: Option<String>,

    #[serde(default)]
    pub n8n_webhook_url: Option<String>,

    #[serde(default = "default_min_delay")]
    pub dispatch_min_delay_secs: u64,

    #[serde(default = "default_max_delay")]
    pub dispatch_max_delay_secs: u64,

    #[serde(default = "default_retention")]
    pub dispatch_retention_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub pairing_poll_interval_secs: u64,

    #[serde(default = "default_pairing_timeout")]
    pub pairing_timeout_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    credentials_encryption_key: Option<String>,
    google_maps_api_key: Option<String>,
    places_language: Option<String>,
    places_region: Option<String>,
    evolution_api_url: Option<String>,
    evolution_api_key: Option<String>,
    n8n_webhook_url: Option<String>,
    dispatch_min_delay_secs: Option<u64>,
    dispatch_max_delay_secs: Option<u64>,
    dispatch_retention_secs: Option<u64>,
    pairing_poll_interval_secs: Option<u64>,
    pairing_timeout_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_credentials_key() -> String {
    // Development key. Override CREDENTIALS_ENCRYPTION_KEY in production.
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f".to_string()
}

fn default_places_language() -> String {
    "pt-BR".to_string()
}

fn default_places_region() -> String {
    "br".to_string()
}

fn default_min_delay() -> u64 {
    2
}

fn default_max_delay() -> u64 {
    5
}

fn default_retention() -> u64 {
    3600
}

fn default_poll_interval() -> u64 {
    3
}

fn default_pairing_timeout() -> u64 {
    120
}

fn default_http_timeout() -> u64 {
    30
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) => Self::read_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };

        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::merge(env_config, file_config)
    }

    fn read_file(path: &Path) -> Result<PartialServerConfig, String> {
        if !path.exists() {
            return Ok(PartialServerConfig::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
    }

    // Environment overrides file.
    fn merge(env: PartialServerConfig, file: PartialServerConfig) -> Result<Self, String> {
        let config = ServerConfig {
            database_url: env
                .database_url
                .or(file.database_url)
                .ok_or("DATABASE_URL is required")?,
            jwt_secret: env
                .jwt_secret
                .or(file.jwt_secret)
                .ok_or("JWT_SECRET is required")?,
            listen_addr: env
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            credentials_encryption_key: env
                .credentials_encryption_key
                .or(file.credentials_encryption_key)
                .unwrap_or_else(default_credentials_key),
            google_maps_api_key: env.google_maps_api_key.or(file.google_maps_api_key),
            places_language: env
                .places_language
                .or(file.places_language)
                .unwrap_or_else(default_places_language),
            places_region: env
                .places_region
                .or(file.places_region)
                .unwrap_or_else(default_places_region),
            evolution_api_url: env.evolution_api_url.or(file.evolution_api_url),
            evolution_api_key: env.evolution_api_key.or(file.evolution_api_key),
            n8n_webhook_url: env.n8n_webhook_url.or(file.n8n_webhook_url),
            dispatch_min_delay_secs: env
                .dispatch_min_delay_secs
                .or(file.dispatch_min_delay_secs)
                .unwrap_or_else(default_min_delay),
            dispatch_max_delay_secs: env
                .dispatch_max_delay_secs
                .or(file.dispatch_max_delay_secs)
                .unwrap_or_else(default_max_delay),
            dispatch_retention_secs: env
                .dispatch_retention_secs
                .or(file.dispatch_retention_secs)
                .unwrap_or_else(default_retention),
            pairing_poll_interval_secs: env
                .pairing_poll_interval_secs
                .or(file.pairing_poll_interval_secs)
                .unwrap_or_else(default_poll_interval),
            pairing_timeout_secs: env
                .pairing_timeout_secs
                .or(file.pairing_timeout_secs)
                .unwrap_or_else(default_pairing_timeout),
            http_timeout_secs: env
                .http_timeout_secs
                .or(file.http_timeout_secs)
                .unwrap_or_else(default_http_timeout),
        };

        if config.dispatch_min_delay_secs > config.dispatch_max_delay_secs {
            return Err(format!(
                "dispatch_min_delay_secs ({}) must not exceed dispatch_max_delay_secs ({})",
                config.dispatch_min_delay_secs, config.dispatch_max_delay_secs
            ));
        }

        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn pairing_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pairing_poll_interval_secs.max(1))
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing_timeout_secs)
    }

    pub fn dispatch_retention(&self) -> Duration {
        Duration::from_secs(self.dispatch_retention_secs)
    }

    /// The shared gateway pair, present only when both halves are configured.
    pub fn default_gateway(&self) -> Option<(&str, &str)> {
        match (&self.evolution_api_url, &self.evolution_api_key) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some((url.as_str(), key.as_str()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
impl ServerConfig {
    pub fn for_tests() -> Self {
        Self::merge(
            PartialServerConfig {
                database_url: Some("postgres://localhost/leadscout_test".to_string()),
                jwt_secret: Some("test-secret".to_string()),
                ..Default::default()
            },
            PartialServerConfig::default(),
        )
        .unwrap()
    }
}
