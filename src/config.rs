use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct AmqpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub pool_size: u32,
    /// Upper bound for bulk transactions (slot generation, toggle cascade, range delete).
    pub bulk_deadline: Duration,
    pub amqp: AmqpConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            host: or_default("HOST", "127.0.0.1")?,
            port: or_default("PORT", "8080")?,
            pool_size: or_default("DB_POOL_SIZE", "10")?,
            bulk_deadline: Duration::from_millis(or_default("BULK_DEADLINE_MS", "15000")?),
            amqp: AmqpConfig {
                enabled: or_default("AMQP_ENABLED", "true")?,
                host: or_default("AMQP_HOST", "localhost")?,
                port: or_default("AMQP_PORT", "5672")?,
                user: or_default("AMQP_USER", "guest")?,
                password: or_default("AMQP_PASSWORD", "guest")?,
            },
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn or_default<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse(key, &raw)
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
