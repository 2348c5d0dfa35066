//! # cb-config
//!
//! Layered settings for the civic-board binary.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `civic-board.toml` in the working directory (optional)
//! 3. `.env` file, loaded into the environment by `dotenvy`
//! 4. environment variables prefixed `CIVIC_BOARD__`, e.g. `CIVIC_BOARD__SERVER__PORT=9000`

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS; empty means same-origin only
    pub allowed_origins: Vec<String>,
    /// Marks the session cookie `Secure`; enable behind HTTPS
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory uploads are written to
    pub root: String,
    /// Public URL prefix the directory is served under
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    pub session_ttl_hours: i64,
    /// Created as an admin when the user table is empty
    pub bootstrap_admin_email: Option<String>,
    #[serde(default, deserialize_with = "secret")]
    pub bootstrap_admin_password: Option<SecretString>,
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainPageSettings {
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub main_page: MainPageSettings,
}

impl Settings {
    /// Loads `.env`, `civic-board.toml` and the environment on top of the defaults.
    pub fn load() -> Result<Self, SettingsError> {
        match dotenvy::dotenv() {
            Ok(path) => log::info!("Loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => log::warn!("Ignoring unreadable .env file: {err}"),
        }

        let builder = defaults()?
            .add_source(File::with_name("civic-board").required(false))
            .add_source(
                Environment::with_prefix("CIVIC_BOARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins"),
            );
        Self::build(builder)
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, SettingsError> {
        Self::build(defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.main_page.refresh_interval_secs == 0 {
            return Err(SettingsError::Invalid("main_page.refresh_interval_secs must be positive".into()));
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(SettingsError::Invalid("auth.session_ttl_hours must be positive".into()));
        }
        if !self.storage.url_prefix.starts_with('/') {
            return Err(SettingsError::Invalid("storage.url_prefix must start with '/'".into()));
        }
        if self.auth.bootstrap_admin_email.is_some() != self.auth.bootstrap_admin_password.is_some() {
            return Err(SettingsError::Invalid(
                "bootstrap admin needs both an email and a password".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, SettingsError> {
    Ok(Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.allowed_origins", Vec::<String>::new())?
        .set_default("server.secure_cookies", false)?
        .set_default("database.url", "sqlite:civic_board.db")?
        .set_default("storage.root", "./data/uploads")?
        .set_default("storage.url_prefix", "/static/uploads")?
        .set_default("storage.max_upload_bytes", 10 * 1024 * 1024)?
        .set_default("auth.session_ttl_hours", 12)?
        .set_default("main_page.refresh_interval_secs", 60)?)
}
