use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::{EventSet, FieldSet};

pub const HOST_KEY: &str = "notify_amqp_host";
pub const PORT_KEY: &str = "notify_amqp_port";
pub const USER_KEY: &str = "notify_amqp_user";
pub const PASSWORD_KEY: &str = "notify_amqp_password";
pub const EXCHANGE_KEY: &str = "notify_amqp_exchange";
pub const ROUTING_KEY_KEY: &str = "notify_amqp_routing_key";
pub const EVENTS_KEY: &str = "notify_events";
pub const FIELDS_KEY: &str = "notify_fields";

/// String keyed settings of a mail user, as handed over by the mail server.
pub type Settings = HashMap<String, String>;

#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub exchange: String,
    pub routing_key: String,
}

impl BrokerConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let host = required(settings, HOST_KEY)?;
        if host.trim().is_empty() {
            return Err(ConfigError::Malformed {
                key: HOST_KEY,
                value: host.to_string(),
                reason: "host is empty".into(),
            });
        }

        let raw_port = required(settings, PORT_KEY)?;
        let port = match raw_port.trim().parse::<u16>() {
            Ok(0) => Err("port 0 is not usable".to_string()),
            Ok(p) => Ok(p),
            Err(e) => Err(e.to_string()),
        }
        .map_err(|reason| ConfigError::Malformed {
            key: PORT_KEY,
            value: raw_port.to_string(),
            reason,
        })?;

        Ok(Self {
            host: host.trim().to_string(),
            port,
            user: required(settings, USER_KEY)?.to_string(),
            password: required(settings, PASSWORD_KEY)?.to_string(),
            exchange: required(settings, EXCHANGE_KEY)?.to_string(),
            routing_key: required(settings, ROUTING_KEY_KEY)?.to_string(),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"********")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .finish()
    }
}

fn required<'a>(settings: &'a Settings, key: &'static str) -> Result<&'a str, ConfigError> {
    settings
        .get(key)
        .map(String::as_str)
        .ok_or(ConfigError::Missing(key))
}

pub fn events_from_settings(settings: &Settings) -> Result<EventSet, ConfigError> {
    match settings.get(EVENTS_KEY) {
        None => Ok(EventSet::defaults()),
        Some(v) => EventSet::parse(v).map_err(|reason| ConfigError::Malformed {
            key: EVENTS_KEY,
            value: v.clone(),
            reason,
        }),
    }
}

pub fn fields_from_settings(settings: &Settings) -> Result<FieldSet, ConfigError> {
    match settings.get(FIELDS_KEY) {
        None => Ok(FieldSet::defaults()),
        Some(v) => FieldSet::parse(v).map_err(|reason| ConfigError::Malformed {
            key: FIELDS_KEY,
            value: v.clone(),
            reason,
        }),
    }
}

/// Service configuration file
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Settings shared by every user
    #[serde(default)]
    pub settings: Settings,

    /// Per user overrides of `settings`
    #[serde(default)]
    pub users: HashMap<String, Settings>,
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settings_for(&self, username: &str) -> Settings {
        let mut merged = self.settings.clone();
        if let Some(overrides) = self.users.get(username) {
            merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

pub fn read_config(config_file: PathBuf) -> Result<NotifyConfig> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

fn default_timeout_secs() -> u64 {
    10
}
