use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::fanout::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("You need to add the {0} to the env")]
    Missing(&'static str),
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Mongo { uri: String, database: String },
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: String,
    pub backend: BackendKind,
    pub import_retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("EZBILL_BACKEND").as_deref() {
            None | Some("mongo") => BackendKind::Mongo {
                uri: lookup("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?,
                database: lookup("EZBILL_DATABASE").unwrap_or_else(|| "EzBill".to_string()),
            },
            Some("memory") => BackendKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "EZBILL_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let defaults = RetryPolicy::default();
        let import_retry = RetryPolicy {
            attempts: parse(&lookup, "EZBILL_IMPORT_ATTEMPTS")?.unwrap_or(defaults.attempts),
            delay: parse(&lookup, "EZBILL_IMPORT_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        };

        Ok(Config {
            bind: lookup("EZBILL_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            backend,
            import_retry,
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
