//! Layered configuration: optional files, then `LEAVE__*` environment variables.
use super::error::LeaveResult;
use super::session::SessionKeys;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "LEAVE";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    pub institution: InstitutionSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Directory holding the sled database
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstitutionSettings {
    /// Only addresses ending in `@<email_domain>` may hold accounts
    pub email_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// HMAC secret for session tokens
    pub secret: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/leave.db")
}

const fn default_ttl_hours() -> i64 {
    24
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
}

impl Settings {
    /// Load configuration.
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. `config/default.*`
    /// 2. `config/<LEAVE_ENV>.*` (LEAVE_ENV defaults to `development`)
    /// 3. environment variables such as `LEAVE__SESSION__SECRET`
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let env = std::env::var("LEAVE_ENV").unwrap_or_else(|_| "development".to_string());

        ::config::Config::builder()
            .add_source(::config::File::with_name("config/default").required(false))
            .add_source(::config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ::config::ConfigError> {
        ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    pub fn open_database(&self) -> LeaveResult<sled::Db> {
        tracing::debug!(path = %self.database.path.display(), "opening database");
        Ok(sled::open(&self.database.path)?)
    }

    pub fn session_keys(&self) -> SessionKeys {
        SessionKeys::new(
            self.session.secret.as_bytes(),
            chrono::Duration::hours(self.session.ttl_hours),
        )
    }
}
