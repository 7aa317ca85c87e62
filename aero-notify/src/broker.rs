use async_trait::async_trait;

use aero_amqp::types::Tuning;
use aero_amqp::{ConnectOptions, Connection};

use crate::config::BrokerConfig;
use crate::error::NotifyError;

/// Channel used for publishing, the only one we ever open.
pub const CHANNEL: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Authenticating,
    ChannelOpening,
    Ready,
    ChannelClosing,
    Disconnecting,
}

/// Opens links to a broker. Swapped in tests for a recording fake.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerLink>, NotifyError>;
}

/// An established connection with its publishing channel.
#[async_trait]
pub trait BrokerLink: Send {
    fn state(&self) -> LinkState;

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), NotifyError>;

    /// Never fails: errors are logged, resources are released anyway.
    async fn close(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct AmqpConnector {
    pub tuning: Tuning,
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerLink>, NotifyError> {
        let mut options = ConnectOptions::new(
            config.host.as_str(),
            config.port,
            config.user.as_str(),
            config.password.as_str(),
        );
        options.tuning = self.tuning.clone();

        let link = AmqpLink::establish(&options, config.address()).await?;
        Ok(Box::new(link))
    }
}

pub struct AmqpLink {
    conn: Option<Connection>,
    state: LinkState,
    address: String,
}

impl AmqpLink {
    async fn establish(options: &ConnectOptions, address: String) -> Result<Self, NotifyError> {
        let mut link = Self {
            conn: None,
            state: LinkState::Disconnected,
            address,
        };

        link.transition(LinkState::Connecting);
        let mut conn = match Connection::connect(options).await {
            Ok(c) => c,
            Err(e) => {
                link.transition(LinkState::Disconnected);
                return Err(link.connect_error(e));
            }
        };

        link.transition(LinkState::Authenticating);
        if let Err(e) = conn.login(options).await {
            link.transition(LinkState::Disconnected);
            return Err(link.connect_error(e));
        }

        link.transition(LinkState::ChannelOpening);
        if let Err(e) = conn.open_channel(CHANNEL).await {
            // The connection is up, say goodbye unless the broker already did
            let gone = matches!(
                e,
                aero_amqp::Error::ConnectionClosed(_) | aero_amqp::Error::Io(_)
            );
            if !gone {
                link.transition(LinkState::Disconnecting);
                if let Err(close_err) = conn.close().await {
                    tracing::debug!(address = %link.address, err = %close_err, "unable to close half open connection");
                }
            }
            link.transition(LinkState::Disconnected);
            return Err(link.connect_error(e));
        }

        link.conn = Some(conn);
        link.transition(LinkState::Ready);
        Ok(link)
    }

    fn transition(&mut self, next: LinkState) {
        tracing::trace!(address = %self.address, from = ?self.state, to = ?next, "broker link");
        self.state = next;
    }

    fn connect_error(&self, source: aero_amqp::Error) -> NotifyError {
        NotifyError::Connect {
            address: self.address.clone(),
            source,
        }
    }
}

#[async_trait]
impl BrokerLink for AmqpLink {
    fn state(&self) -> LinkState {
        self.state
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), NotifyError> {
        let conn = match (self.state, self.conn.as_mut()) {
            (LinkState::Ready, Some(conn)) => conn,
            _ => return Err(NotifyError::NotConnected),
        };

        conn.publish(CHANNEL, exchange, routing_key, false, false, payload)
            .await
            .map_err(|source| NotifyError::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                source,
            })
    }

    async fn close(&mut self) {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                self.transition(LinkState::Disconnected);
                return;
            }
        };

        self.transition(LinkState::ChannelClosing);
        let connection_gone = match conn.close_channel(CHANNEL).await {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(address = %self.address, err = %e, "channel close failed");
                matches!(
                    e,
                    aero_amqp::Error::ConnectionClosed(_) | aero_amqp::Error::Io(_)
                )
            }
        };

        self.transition(LinkState::Disconnecting);
        if !connection_gone {
            if let Err(e) = conn.close().await {
                tracing::warn!(address = %self.address, err = %e, "connection close failed");
            }
        }
        self.transition(LinkState::Disconnected);
    }
}
