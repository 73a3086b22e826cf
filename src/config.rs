//! Worker configuration from the environment (and `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::client::AdtConnector;
use crate::error::ConfigError;
use crate::twin::DEFAULT_SENSOR_MODEL;

#[derive(Debug, Clone)]
pub struct Config {
    pub event_hub_connection_string: String,
    pub event_hub_name: String,
    /// `None` selects the default consumer group.
    pub consumer_group: Option<String>,
    pub adt_instance_url: String,
    pub adt_access_token: String,
    pub adt_api_version: String,
    pub sensor_model: String,
    pub request_timeout: Duration,
    /// Upper bound on events handed to one batch.
    pub max_batch_events: usize,
    /// Deliveries of a failing batch before the partition moves past it.
    pub max_redeliveries: usize,
    pub drain_only: bool,
}

impl Config {
    /// Read configuration, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Config {
            event_hub_connection_string: required("EVENT_HUB_CONNECTION_STRING")?,
            event_hub_name: required("EVENT_HUB_NAME")?,
            consumer_group: lookup("EVENT_HUB_CONSUMER_GROUP").filter(|v| !v.is_empty()),
            adt_instance_url: required("ADT_INSTANCE_URL")?,
            adt_access_token: required("ADT_ACCESS_TOKEN")?,
            adt_api_version: lookup("ADT_API_VERSION").unwrap_or_else(|| "2020-10-31".to_string()),
            sensor_model: lookup("ADT_SENSOR_MODEL")
                .unwrap_or_else(|| DEFAULT_SENSOR_MODEL.to_string()),
            request_timeout: Duration::from_secs(parsed(&lookup, "ADT_REQUEST_TIMEOUT_SECS", 30)?),
            max_batch_events: parsed(&lookup, "BATCH_MAX_EVENTS", 64)?,
            max_redeliveries: parsed(&lookup, "BATCH_MAX_REDELIVERIES", 5)?,
            drain_only: parsed(&lookup, "DRAIN_ONLY", false)?,
        })
    }

    pub fn connector(&self) -> AdtConnector {
        AdtConnector::new(&self.adt_instance_url, &self.adt_access_token)
            .api_version(&self.adt_api_version)
            .timeout(self.request_timeout)
    }
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
