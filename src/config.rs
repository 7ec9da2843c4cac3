use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

/// Runtime configuration, read once at startup.
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: require("DATABASE_URL"),
            bind_addr: try_load("BIND_ADDR", "127.0.0.1:8000"),
            jwt_secret: require("JWT_SECRET"),
            base_url: try_load("BASE_URL", "http://localhost:8000"),
        }
    }
}

fn require(key: &str) -> String {
    env::var(key)
        .map_err(|_| {
            log::error!("Environment variable {key} is not set");
        })
        .expect("Environment misconfigured!")
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            log::error!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
