use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::client::{base_uri, ClientOptions, Credentials, Target};
use crate::error::ConfigError;

/// Site and operating configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub credentials: Credentials,
    /// Locale code used in the site URL, e.g. `ca`
    pub country_code: String,
    pub target: Target,
    pub base_url: String,
    /// Pause between poll cycles
    pub refresh_delay: Duration,
    /// Pause after a failed cycle or login before trying again
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    /// Consecutive failed cycles after which the session is presumed dead
    pub max_consecutive_failures: u32,
    pub bind_addr: SocketAddr,
    pub log_json: bool,
}

impl BotConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing identifiers fail here, before any loop is started.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let email = required("EMAIL")?;
        let password = required("PASSWORD")?;
        let country_code = required("COUNTRY_CODE")?;
        let schedule_id = required("SCHEDULE_ID")?;
        let facility_id = required("FACILITY_ID")?;

        for (name, value) in [("SCHEDULE_ID", &schedule_id), ("FACILITY_ID", &facility_id)] {
            if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigError::Invalid {
                    name,
                    reason: format!("expected an alphanumeric id, got {:?}", value),
                });
            }
        }

        let base_url = lookup("BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| base_uri(&country_code));

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: format!("not a socket address: {:?}", raw),
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        Ok(Self {
            credentials: Credentials::new(email, password),
            country_code,
            target: Target {
                schedule_id,
                facility_id,
            },
            base_url,
            refresh_delay: Duration::from_secs(parse_or(&lookup, "REFRESH_DELAY", 3)?),
            retry_delay: Duration::from_secs(parse_or(&lookup, "RETRY_DELAY_SECS", 5)?),
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?),
            max_consecutive_failures: parse_or(&lookup, "MAX_CONSECUTIVE_FAILURES", 3)?,
            bind_addr,
            log_json: lookup("LOG_JSON")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.request_timeout,
            ..ClientOptions::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name,
                reason: format!("must be a valid number, got {:?}", raw),
            })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        vars(&[
            ("EMAIL", "me@example.com"),
            ("PASSWORD", "hunter2"),
            ("COUNTRY_CODE", "ca"),
            ("SCHEDULE_ID", "12345678"),
            ("FACILITY_ID", "94"),
        ])
    }

    #[test]
    fn test_defaults() {
        let env = complete();
        let config = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.base_url, "https://ais.usvisa-info.com/en-ca/niv");
        assert_eq!(config.refresh_delay, Duration::from_secs(3));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.target.facility_id, "94");
        assert!(!config.log_json);
    }

    #[test]
    fn test_missing_identifier_fails_fast() {
        let mut env = complete();
        env.remove("FACILITY_ID");
        let err = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("FACILITY_ID")));

        let mut env = complete();
        env.insert("SCHEDULE_ID".to_string(), "  ".to_string());
        let err = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SCHEDULE_ID")));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut env = complete();
        env.insert("REFRESH_DELAY".to_string(), "soon".to_string());
        let err = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REFRESH_DELAY", .. }));

        let mut env = complete();
        env.insert("SCHEDULE_ID".to_string(), "../123".to_string());
        assert!(BotConfig::from_lookup(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut env = complete();
        env.insert("REFRESH_DELAY".to_string(), "60".to_string());
        env.insert("BASE_URL".to_string(), "http://127.0.0.1:8080/en-ca/niv".to_string());
        env.insert("BIND_ADDR".to_string(), "0.0.0.0:4000".to_string());
        env.insert("LOG_JSON".to_string(), "true".to_string());
        let config = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.refresh_delay, Duration::from_secs(60));
        assert_eq!(config.base_url, "http://127.0.0.1:8080/en-ca/niv");
        assert_eq!(config.bind_addr.port(), 4000);
        assert!(config.log_json);
    }

    #[test]
    fn test_password_not_in_debug() {
        let env = complete();
        let config = BotConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
