use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use dotenvy::dotenv;
use std::{env, str::FromStr};

#[derive(Clone)]
pub struct Config {
    pub server_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub access_token_ttl: usize,

    // Session cookie
    pub cookie_domain: String,
    pub cookie_secure: bool,

    /// Zone used for "today" and for late/early classification.
    pub timezone: Tz,

    pub default_employee_password: String,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub log_dir: String,
    pub log_level: tracing::Level,
}

/// Reads `key` and parses it, falling back to `default` when unset.
fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow!("invalid value {:?} for {}: {}", raw, key, e))
}

/// DSN assembled from the split DB_* variables when DATABASE_URL is absent.
fn database_url_from_parts() -> String {
    let user = env::var("DB_USER").unwrap_or_else(|_| "root".to_string());
    let pass = env::var("DB_PASS").unwrap_or_default();
    let host = env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("DB_PORT").unwrap_or_else(|_| "3306".to_string());
    let name = env::var("DB_NAME").unwrap_or_else(|_| "manajemen_karyawan".to_string());

    if pass.is_empty() {
        format!("mysql://{}@{}:{}/{}", user, host, port, name)
    } else {
        format!("mysql://{}:{}@{}:{}/{}", user, pass, host, port, name)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow!("unknown time zone {:?}: {}", name, e))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => database_url_from_parts(),
        };

        let timezone_name =
            env::var("APP_TIMEZONE").unwrap_or_else(|_| "Asia/Singapore".to_string());

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", "10")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            access_token_ttl: env_or("ACCESS_TOKEN_TTL", "86400")?, // default 24h

            cookie_domain: env::var("COOKIE_DOMAIN").unwrap_or_else(|_| "localhost".to_string()),
            cookie_secure: env_or("COOKIE_SECURE", "false")?,

            timezone: parse_timezone(&timezone_name)?,

            default_employee_password: env::var("DEFAULT_EMPLOYEE_PASSWORD")
                .unwrap_or_else(|_| "password123".to_string()),

            rate_login_per_min: env_or("RATE_LOGIN_PER_MIN", "60")?,
            rate_protected_per_min: env_or("RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level: env_or("LOG_LEVEL", "debug")?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".to_string(),
            database_url: "mysql://root@127.0.0.1:3306/manajemen_karyawan_test".to_string(),
            db_max_connections: 2,
            jwt_secret: "test-secret".to_string(),
            access_token_ttl: 3600,
            cookie_domain: "localhost".to_string(),
            cookie_secure: false,
            timezone: chrono_tz::Asia::Singapore,
            default_employee_password: "password123".to_string(),
            rate_login_per_min: 60,
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            log_dir: "logs".to_string(),
            log_level: tracing::Level::DEBUG,
        }
    }
}
