use anyhow::Result;
use config::{Config as ConfigLoader, Environment, File};
use exam_gateway_api::{observability::LogConfig, security::DEFAULT_QUEUE_CAPACITY};
use exam_gateway_core::{EndpointPolicy, PolicyTable};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Without a database the gateway keeps counters in memory and writes
    /// security events to the log only.
    pub database_url: Option<String>,
    /// `production` turns on the `Secure` cookie attribute
    pub environment: String,
    pub log: LogConfig,
    pub event_queue_capacity: usize,
    /// Replaces the built-in policy table; must contain a `default` entry
    pub policies: Option<HashMap<String, EndpointPolicy>>,
    pub prune_interval_secs: u64,
    pub counter_retention_hours: i64,
}

impl Config {
    /// Layered load: `config/default`, `config/local`, then `EXAM_GATEWAY_*`
    /// environment variables (`__` separates nested keys).
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("EXAM_GATEWAY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn policy_table(&self) -> Result<PolicyTable> {
        match &self.policies {
            Some(policies) => Ok(PolicyTable::from_map(policies.clone())?),
            None => Ok(PolicyTable::standard()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            environment: "development".to_string(),
            log: LogConfig::default(),
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            policies: None,
            prune_interval_secs: 600,
            counter_retention_hours: 24,
        }
    }
}
