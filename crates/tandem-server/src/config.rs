use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// The one cross-origin caller allowed; any origin when unset.
    pub cors_origin: Option<String>,
    pub db_path: PathBuf,
    pub feed_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = get("TANDEM_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("PORT")
            .unwrap_or_else(|| "4000".into())
            .parse()
            .context("PORT must be a port number")?;
        let cors_origin = get("CORS_ORIGIN").filter(|o| !o.is_empty());
        let db_path = get("TANDEM_DB_PATH").unwrap_or_else(|| "tandem.db".into()).into();
        let poll_ms: u64 = get("TANDEM_FEED_POLL_MS")
            .unwrap_or_else(|| "500".into())
            .parse()
            .context("TANDEM_FEED_POLL_MS must be a number of milliseconds")?;

        Ok(Self {
            host,
            port,
            cors_origin,
            db_path,
            feed_poll_interval: Duration::from_millis(poll_ms),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.cors_origin, None);
        assert_eq!(config.db_path, PathBuf::from("tandem.db"));
        assert_eq!(config.feed_poll_interval, Duration::from_millis(500));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:4000");
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TANDEM_HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("CORS_ORIGIN", "https://app.example.com"),
            ("TANDEM_FEED_POLL_MS", "50"),
        ]))
        .unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.cors_origin.as_deref(), Some("https://app.example.com"));
        assert_eq!(config.feed_poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn malformed_port_is_an_error() {
        assert!(Config::from_lookup(lookup(&[("PORT", "http")])).is_err());
    }
}
