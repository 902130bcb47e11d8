use std::{env, str::FromStr};

/// Runtime settings, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub port: u16,
    /// Absolute login lifetime; activity does not extend it.
    pub session_ttl_secs: i64,
    pub duplicate_window_secs: i64,
    pub default_admin_username: String,
    pub default_admin_password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            port: parse_or(&lookup, "PORT", 3000)?,
            session_ttl_secs: parse_or(&lookup, "SESSION_TTL_SECS", 3600)?,
            duplicate_window_secs: parse_or(&lookup, "DUPLICATE_WINDOW_SECS", 60)?,
            default_admin_username: lookup("DEFAULT_ADMIN_USERNAME")
                .unwrap_or_else(|| "admin".to_string()),
            default_admin_password: lookup("DEFAULT_ADMIN_PASSWORD")
                .unwrap_or_else(|| "admin123".to_string()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
