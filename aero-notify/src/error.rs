use std::time::Duration;

/// A broker setting is absent or cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("setting `{key}` has invalid value `{value}`: {reason}")]
    Malformed {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("broker configuration is unusable: {0}")]
    Configuration(#[from] ConfigError),
    #[error("unable to connect to broker {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: aero_amqp::Error,
    },
    #[error("publish to exchange `{exchange}` with routing key `{routing_key}` failed: {source}")]
    Publish {
        exchange: String,
        routing_key: String,
        #[source]
        source: aero_amqp::Error,
    },
    #[error("broker {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("no broker connection is open")]
    NotConnected,
    #[error("unable to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}
