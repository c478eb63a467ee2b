use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Shipping addresses mentioning this state are taxed CGST+SGST.
    pub seller_home_state: String,
    pub wholesale_discount_pct: BigDecimal,
    pub stock_decrement_timeout: Duration,
    pub db_pool_size: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let or_default =
            |name: &'static str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let port = parse("PORT", or_default("PORT", "8080"))?;
        let wholesale_discount_pct: BigDecimal =
            parse("WHOLESALE_DISCOUNT_PCT", or_default("WHOLESALE_DISCOUNT_PCT", "0"))?;
        if wholesale_discount_pct < BigDecimal::from(0) || wholesale_discount_pct > BigDecimal::from(100) {
            return Err(ConfigError::Invalid {
                name: "WHOLESALE_DISCOUNT_PCT",
                value: wholesale_discount_pct.to_string(),
            });
        }
        let timeout_ms: u64 = parse(
            "STOCK_DECREMENT_TIMEOUT_MS",
            or_default("STOCK_DECREMENT_TIMEOUT_MS", "2000"),
        )?;
        // Postgres reads a zero statement_timeout as "no limit".
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "STOCK_DECREMENT_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }
        let db_pool_size: u32 = parse("DB_POOL_SIZE", or_default("DB_POOL_SIZE", "10"))?;
        if db_pool_size == 0 {
            return Err(ConfigError::Invalid {
                name: "DB_POOL_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: or_default("HOST", "0.0.0.0"),
            port,
            seller_home_state: required("SELLER_HOME_STATE")?,
            wholesale_discount_pct,
            stock_decrement_timeout: Duration::from_millis(timeout_ms),
            db_pool_size,
        })
    }
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
