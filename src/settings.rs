use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

/// Variables the bot's `.env` files already carry, and the keys they fill.
/// A `REFERRAL__*` variable for the same key takes precedence.
const LEGACY_ENV: [(&str, &str); 6] = [
    ("DB_HOST", "postgres.host"),
    ("DB_PORT", "postgres.port"),
    ("DB_NAME", "postgres.database"),
    ("DB_USER", "postgres.user"),
    ("DB_PASSWORD", "postgres.password"),
    ("CHANNEL_LINK", "channel.invite_link"),
];

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: u32,
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::NotFound(key.to_string()))
}

impl Postgres {
    /// Only the Postgres ledger needs credentials, so they are checked here
    /// rather than when the settings load.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(required(&self.database, "postgres.database")?)
            .username(required(&self.user, "postgres.user")?)
            .password(required(&self.password, "postgres.password")?))
    }
}

/// The channel new users are sent to after redeeming a code.
#[derive(Debug, Deserialize)]
pub struct Channel {
    pub invite_link: String,
}

#[derive(Debug, Deserialize)]
pub struct Codes {
    pub length: usize,
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub channel: Channel,
    pub codes: Codes,
    pub http: Http,
}

impl Settings {
    /// Loads `path` (optional) and then `REFERRAL__SECTION__KEY` environment
    /// variables on top of it, falling back to the legacy `DB_*` and
    /// `CHANNEL_LINK` names. A `.env` file is read first when present.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Self::load_with_env(path, |var| env::var(var).ok())
    }

    pub fn load_with_env(
        path: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("postgres.host", "localhost")?
            .set_default("postgres.port", 5432)?
            .set_default("postgres.max_connections", 5)?
            .set_default("codes.length", 15)?
            .set_default("codes.max_attempts", 5)?
            .set_default("http.listen", "0.0.0.0:8080")?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("REFERRAL").separator("__"));

        for (legacy, key) in LEGACY_ENV {
            let current = format!("REFERRAL__{}", key.replace('.', "__").to_uppercase());
            let value = lookup(&current).or_else(|| lookup(legacy));
            builder = builder.set_override_option(key, value)?;
        }

        builder.build()?.try_deserialize()
    }
}
