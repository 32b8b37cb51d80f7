//! Configuration loading.
//!
//! Sources are merged in this order (later sources override earlier):
//! 1. `AppConfig::default()`
//! 2. TOML file (`KEYSTONE_CONFIG`, else `keystone.toml` if present)
//! 3. `KEYSTONE_*` environment variables, `__` separating nested keys
//!    (e.g. `KEYSTONE_AUTH__SIGNING_SECRET`, `KEYSTONE_SERVER__BIND`)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keystone_auth::AuthConfig;

pub const ENV_PREFIX: &str = "KEYSTONE_";
pub const CONFIG_PATH_VAR: &str = "KEYSTONE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "keystone.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind must not be empty".to_string()));
        }
        if self.database.url.is_some() && self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// The TOML file that will be layered in, if one exists.
    pub fn config_file(&self) -> Option<PathBuf> {
        let path = self
            .config_path
            .clone()
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        path.exists().then_some(path)
    }

    /// The layered figment, before extraction.
    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Some(path) = self.config_file() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
    }

    /// Load and validate.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let config: AppConfig = self.figment().extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    const SECRET: &str = "a-signing-secret-of-at-least-32-bytes";

    #[test]
    fn defaults_require_a_signing_secret() {
        Jail::expect_with(|_jail| {
            let err = ConfigLoader::new().load().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_nested_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("KEYSTONE_AUTH__SIGNING_SECRET", SECRET);
            jail.set_env("KEYSTONE_AUTH__ACCESS_TOKEN_TTL_SECS", "60");
            jail.set_env("KEYSTONE_SERVER__BIND", "127.0.0.1:9000");

            let config = ConfigLoader::new().load().map_err(|e| e.to_string())?;
            assert_eq!(config.auth.signing_secret.as_bytes(), SECRET.as_bytes());
            assert_eq!(config.auth.access_token_ttl_secs, 60);
            assert_eq!(config.auth.refresh_secret_bytes, 64);
            assert_eq!(config.server.bind, "127.0.0.1:9000");
            assert!(config.database.url.is_none());
            Ok(())
        });
    }

    #[test]
    fn toml_file_is_layered_under_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "keystone.toml",
                &format!(
                    r#"
                    [auth]
                    signing_secret = "{SECRET}"
                    refresh_secret_bytes = 48

                    [database]
                    url = "postgres://localhost/keystone"

                    [logging]
                    json = false
                    "#
                ),
            )?;
            jail.set_env("KEYSTONE_AUTH__REFRESH_SECRET_BYTES", "32");

            let config = ConfigLoader::new().load().map_err(|e| e.to_string())?;
            assert_eq!(config.auth.refresh_secret_bytes, 32);
            assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/keystone"));
            assert!(!config.logging.json);
            Ok(())
        });
    }

    #[test]
    fn config_file_is_reported_only_when_present() {
        Jail::expect_with(|jail| {
            assert!(ConfigLoader::new().config_file().is_none());
            assert!(ConfigLoader::new().with_config_path("missing.toml").config_file().is_none());

            jail.create_file("custom.toml", "")?;
            jail.set_env("KEYSTONE_CONFIG", "custom.toml");
            assert_eq!(ConfigLoader::new().config_file(), Some(PathBuf::from("custom.toml")));
            Ok(())
        });
    }

    #[test]
    fn short_refresh_secret_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("KEYSTONE_AUTH__SIGNING_SECRET", SECRET);
            jail.set_env("KEYSTONE_AUTH__REFRESH_SECRET_BYTES", "8");
            assert!(matches!(ConfigLoader::new().load(), Err(ConfigError::Invalid(_))));
            Ok(())
        });
    }

    #[test]
    fn debug_output_redacts_secret() {
        let mut config = AppConfig::default();
        config.auth = AuthConfig::new(SECRET);
        let debug = format!("{config:?}");
        assert!(!debug.contains(SECRET));
    }
}
