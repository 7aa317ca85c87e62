use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::broker::BrokerLink;
use crate::config::{events_from_settings, fields_from_settings, BrokerConfig};
use crate::error::{ConfigError, NotifyError};
use crate::event::{EventSet, FieldSet};
use crate::host::MailUser;
use crate::registry::Registry;

/// Notification state of one mail user, created when the user logs in.
///
/// The session itself never holds a broker connection: each commit gets
/// its own [`BrokerHandle`] from `broker_handle`.
pub struct UserSession {
    username: String,
    broker: Result<BrokerConfig, ConfigError>,
    events: EventSet,
    fields: FieldSet,
    registry: Arc<Registry>,
    open_links: AtomicUsize,
}

impl UserSession {
    pub fn from_user(registry: Arc<Registry>, user: &MailUser) -> Arc<Self> {
        let broker = BrokerConfig::from_settings(&user.settings);
        if let Err(e) = &broker {
            tracing::error!(user = %user.username, err = %e, "notifications disabled for this user");
        }

        let events = events_from_settings(&user.settings).unwrap_or_else(|e| {
            tracing::warn!(user = %user.username, err = %e, "using default events");
            EventSet::defaults()
        });
        let fields = fields_from_settings(&user.settings).unwrap_or_else(|e| {
            tracing::warn!(user = %user.username, err = %e, "using default fields");
            FieldSet::defaults()
        });

        tracing::debug!(user = %user.username, %events, %fields, "notification session created");
        Arc::new(Self {
            username: user.username.clone(),
            broker,
            events,
            fields,
            registry,
            open_links: AtomicUsize::new(0),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn broker(&self) -> Result<&BrokerConfig, &ConfigError> {
        self.broker.as_ref()
    }

    pub fn events(&self) -> EventSet {
        self.events
    }

    pub fn fields(&self) -> FieldSet {
        self.fields
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// True while at least one handle of this session holds a link.
    pub fn is_connected(&self) -> bool {
        self.open_links.load(Ordering::Acquire) > 0
    }

    /// A handle without any link, `connect` opens one.
    pub fn broker_handle(self: &Arc<Self>) -> BrokerHandle {
        BrokerHandle {
            session: self.clone(),
            link: None,
        }
    }
}

/// Broker link owned by a single commit.
///
/// Links are never shared nor reused. Dropping the handle releases its link
/// even when `disconnect` did not run, e.g. when the commit future is
/// cancelled: the socket is then closed without the AMQP goodbye.
pub struct BrokerHandle {
    session: Arc<UserSession>,
    link: Option<Box<dyn BrokerLink>>,
}

impl BrokerHandle {
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Opens a fresh link, closing the one held before if any.
    pub async fn connect(&mut self) -> Result<(), NotifyError> {
        let session = self.session.clone();
        let config = session.broker.as_ref().map_err(|e| e.clone())?;

        self.disconnect().await;

        let connector = session.registry.connector().clone();
        let opened = bounded(
            session.registry.timeout(),
            "connect",
            connector.connect(config),
        )
        .await?;
        tracing::debug!(user = %session.username, address = %config.address(), "connected to broker");

        session.open_links.fetch_add(1, Ordering::AcqRel);
        self.link = Some(opened);
        Ok(())
    }

    pub async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), NotifyError> {
        let timeout = self.session.registry.timeout();
        let link = self.link.as_mut().ok_or(NotifyError::NotConnected)?;

        let res = bounded(timeout, "publish", link.publish(exchange, routing_key, payload)).await;
        if let Err(NotifyError::Timeout { .. }) = &res {
            // The stream may be left in the middle of a frame
            self.release();
        }
        res
    }

    /// Closes the link if there is one; calling it twice is harmless.
    pub async fn disconnect(&mut self) {
        if let Some(mut link) = self.release() {
            let timeout = self.session.registry.timeout();
            if tokio::time::timeout(timeout, link.close()).await.is_err() {
                tracing::warn!(user = %self.session.username, ?timeout, "broker close timed out, dropping the connection");
            }
        }
    }

    fn release(&mut self) -> Option<Box<dyn BrokerLink>> {
        let link = self.link.take();
        if link.is_some() {
            self.session.open_links.fetch_sub(1, Ordering::AcqRel);
        }
        link
    }
}

impl Drop for BrokerHandle {
    fn drop(&mut self) {
        if self.release().is_some() {
            tracing::warn!(user = %self.session.username, "broker link dropped before being closed");
        }
    }
}

async fn bounded<T, F>(after: Duration, operation: &'static str, fut: F) -> Result<T, NotifyError>
where
    F: Future<Output = Result<T, NotifyError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(NotifyError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HOST_KEY, PORT_KEY};
    use crate::event::Event;
    use crate::test_support::{broker_settings, RecordingConnector};

    fn alice(connector: &Arc<RecordingConnector>, timeout: Duration) -> Arc<UserSession> {
        let registry = Registry::new(connector.clone(), timeout);
        UserSession::from_user(registry, &MailUser::new("alice", broker_settings()))
    }

    #[tokio::test]
    async fn connect_publish_disconnect() {
        let connector = RecordingConnector::new();
        let session = alice(&connector, Duration::from_secs(1));
        let mut handle = session.broker_handle();

        assert!(matches!(
            handle.publish("mail", "events", b"{}").await,
            Err(NotifyError::NotConnected)
        ));

        handle.connect().await.unwrap();
        assert!(handle.is_connected());
        assert!(session.is_connected());

        handle.publish("mail", "events", b"{}").await.unwrap();
        assert_eq!(
            connector.published(),
            vec![("mail".to_string(), "events".to_string(), b"{}".to_vec())]
        );

        handle.disconnect().await;
        handle.disconnect().await;
        assert!(!handle.is_connected());
        assert!(!session.is_connected());
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn disconnect_without_connect() {
        let connector = RecordingConnector::new();
        let session = alice(&connector, Duration::from_secs(1));

        let mut handle = session.broker_handle();
        handle.disconnect().await;
        handle.disconnect().await;

        assert!(!handle.is_connected());
        assert!(!session.is_connected());
        assert_eq!(connector.connects(), 0);
        assert_eq!(connector.closes(), 0);
    }

    #[tokio::test]
    async fn reconnect_opens_a_fresh_link() {
        let connector = RecordingConnector::new();
        let session = alice(&connector, Duration::from_secs(1));

        let mut handle = session.broker_handle();
        handle.connect().await.unwrap();
        handle.connect().await.unwrap();
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.closes(), 1);

        handle.disconnect().await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn handles_do_not_share_links() {
        let connector = RecordingConnector::new();
        let session = alice(&connector, Duration::from_secs(1));

        let mut first = session.broker_handle();
        let mut second = session.broker_handle();
        first.connect().await.unwrap();
        second.connect().await.unwrap();
        assert_eq!(connector.connects(), 2);

        first.disconnect().await;
        assert!(session.is_connected());
        second.publish("mail", "events", b"{}").await.unwrap();

        second.disconnect().await;
        assert!(!session.is_connected());
        assert_eq!(connector.closes(), 2);
    }

    #[tokio::test]
    async fn dropped_handle_releases_its_link() {
        let connector = RecordingConnector::new();
        let session = alice(&connector, Duration::from_secs(1));

        let mut handle = session.broker_handle();
        handle.connect().await.unwrap();
        drop(handle);

        assert!(!session.is_connected());
        assert_eq!(connector.closes(), 0);
        assert_eq!(connector.abandoned(), 1);
    }

    #[tokio::test]
    async fn unusable_configuration() {
        let connector = RecordingConnector::new();
        let registry = Registry::new(connector.clone(), Duration::from_secs(1));
        let mut settings = broker_settings();
        settings.remove(HOST_KEY);
        settings.insert(PORT_KEY.into(), "nope".into());
        settings.insert("notify_events".into(), "copy bogus".into());

        let session = UserSession::from_user(registry, &MailUser::new("bob", settings));
        assert!(session.broker().is_err());
        assert_eq!(session.events(), EventSet::defaults());
        assert!(!session.events().contains(Event::Copy));

        let mut handle = session.broker_handle();
        assert!(matches!(
            handle.connect().await,
            Err(NotifyError::Configuration(ConfigError::Missing(HOST_KEY)))
        ));
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_broker_times_out() {
        let connector = RecordingConnector::new();
        connector.stall_connect(Duration::from_secs(60));
        let session = alice(&connector, Duration::from_secs(2));

        let mut handle = session.broker_handle();
        match handle.connect().await {
            Err(NotifyError::Timeout { operation, after }) => {
                assert_eq!(operation, "connect");
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(!session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn publish_timeout_drops_the_link() {
        let connector = RecordingConnector::new();
        connector.stall_publish(Duration::from_secs(60));
        let session = alice(&connector, Duration::from_secs(2));

        let mut handle = session.broker_handle();
        handle.connect().await.unwrap();
        assert!(matches!(
            handle.publish("mail", "events", b"{}").await,
            Err(NotifyError::Timeout {
                operation: "publish",
                ..
            })
        ));
        assert!(!handle.is_connected());
        assert!(!session.is_connected());
        assert_eq!(connector.abandoned(), 1);
    }
}
