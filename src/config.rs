use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Share tokens shorter than this are rejected at load time.
pub const MIN_TOKEN_LENGTH: usize = 10;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub share: ShareConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub previous_secrets: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareConfig {
    /// Base URL of the client that renders `/share/<token>`
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_token_length")]
    pub token_length: usize,
    #[serde(default = "default_token_attempts")]
    pub token_attempts: u32,
    #[serde(default = "default_password_memory_kib")]
    pub password_memory_kib: u32,
    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
    #[serde(default = "default_password_parallelism")]
    pub password_parallelism: u32,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_db_path() -> String {
    "data/docshare.db".to_string()
}

fn default_upload_path() -> String {
    "data/uploads".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10 MiB
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_token_length() -> usize {
    MIN_TOKEN_LENGTH
}

fn default_token_attempts() -> u32 {
    5
}

// Argon2id parameters recommended by OWASP
fn default_password_memory_kib() -> u32 {
    19 * 1024
}

fn default_password_iterations() -> u32 {
    2
}

fn default_password_parallelism() -> u32 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_path: default_upload_path(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
            token_length: default_token_length(),
            token_attempts: default_token_attempts(),
            password_memory_kib: default_password_memory_kib(),
            password_iterations: default_password_iterations(),
            password_parallelism: default_password_parallelism(),
        }
    }
}

impl ShareConfig {
    /// Public URL a recipient opens for the given share token
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/share/{}", self.public_url.trim_end_matches('/'), token)
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.normalize();
        config.ensure_directories()?;
        config.ensure_jwt_secret()?;
        tracing::info!(
            "Share links: public_url={}, token_length={}",
            config.share.public_url,
            config.share.token_length
        );
        Ok(config)
    }

    /// Ensure a JWT secret exists, persisting a generated one
    fn ensure_jwt_secret(&mut self) -> anyhow::Result<()> {
        if !self.jwt.secret.trim().is_empty() {
            return Ok(());
        }

        let secret_path = Path::new("data/.jwt_secret");
        if secret_path.exists() {
            let secret = fs::read_to_string(secret_path)?;
            self.jwt.secret = secret.trim().to_string();
            tracing::info!("Loaded persisted JWT secret from data/.jwt_secret");
        } else {
            let secret = uuid::Uuid::new_v4().to_string();
            if let Some(parent) = secret_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(secret_path, &secret)?;
            self.jwt.secret = secret;
            tracing::info!("Generated and persisted new JWT secret to data/.jwt_secret");
        }
        Ok(())
    }

    /// Load configuration from conf.toml or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.toml", "config.toml", "data/conf.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: DS_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("DS_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("DS_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("DS_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Ok(val) = env::var("DS_CONF_STORAGE_UPLOAD_PATH") {
            self.storage.upload_path = val;
        }
        if let Ok(val) = env::var("DS_CONF_STORAGE_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = val.parse() {
                self.storage.max_upload_bytes = bytes;
            }
        }

        // JWT overrides
        if let Ok(val) = env::var("DS_CONF_JWT_SECRET") {
            self.jwt.secret = val;
        }
        if let Ok(val) = env::var("DS_CONF_JWT_PREVIOUS_SECRETS") {
            self.jwt.previous_secrets = val
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
        }

        // Share overrides
        if let Ok(val) = env::var("DS_CONF_SHARE_PUBLIC_URL") {
            if !val.trim().is_empty() {
                self.share.public_url = val;
            }
        }
        if let Ok(val) = env::var("DS_CONF_SHARE_TOKEN_LENGTH") {
            if let Ok(len) = val.parse() {
                self.share.token_length = len;
            }
        }
        if let Ok(val) = env::var("DS_CONF_SHARE_TOKEN_ATTEMPTS") {
            if let Ok(attempts) = val.parse() {
                self.share.token_attempts = attempts;
            }
        }
    }

    /// Clamp values that would weaken share links
    fn normalize(&mut self) {
        if self.share.token_length < MIN_TOKEN_LENGTH {
            tracing::warn!(
                "share.token_length={} is too short, using {}",
                self.share.token_length,
                MIN_TOKEN_LENGTH
            );
            self.share.token_length = MIN_TOKEN_LENGTH;
        }
        if self.share.token_attempts == 0 {
            self.share.token_attempts = 1;
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&self.storage.upload_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.share.token_length, MIN_TOKEN_LENGTH);
        assert_eq!(config.storage.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.jwt.secret.is_empty());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [share]
            public_url = "https://docs.example.com/"
            token_length = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.share.token_attempts, 5);
        assert_eq!(config.database.path, "data/docshare.db");

        let mut config = config;
        config.normalize();
        assert_eq!(config.share.token_length, MIN_TOKEN_LENGTH);
    }

    #[test]
    fn test_share_url() {
        let share = ShareConfig {
            public_url: "https://docs.example.com/".to_string(),
            ..ShareConfig::default()
        };
        assert_eq!(share.share_url("abc_DEF-12"), "https://docs.example.com/share/abc_DEF-12");
    }
}
