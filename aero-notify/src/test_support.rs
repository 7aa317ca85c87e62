//! In-memory broker used by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::{BrokerLink, Connector, LinkState};
use crate::config::*;
use crate::error::NotifyError;

pub type Published = (String, String, Vec<u8>);

#[derive(Default)]
struct Recorded {
    connects: usize,
    closes: usize,
    abandoned: usize,
    publish_calls: usize,
    published: Vec<Published>,
    refuse_connect: bool,
    stall_connect: Option<Duration>,
    stall_publish: Option<Duration>,
    fail_publish_at: Option<usize>,
}

#[derive(Default)]
pub struct RecordingConnector {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connects(&self) -> usize {
        self.inner.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    /// Links dropped without `close`.
    pub fn abandoned(&self) -> usize {
        self.inner.lock().unwrap().abandoned
    }

    pub fn published(&self) -> Vec<Published> {
        self.inner.lock().unwrap().published.clone()
    }

    pub fn refuse_connect(&self) {
        self.inner.lock().unwrap().refuse_connect = true;
    }

    pub fn stall_connect(&self, delay: Duration) {
        self.inner.lock().unwrap().stall_connect = Some(delay);
    }

    /// Only the next publish call waits.
    pub fn stall_publish(&self, delay: Duration) {
        self.inner.lock().unwrap().stall_publish = Some(delay);
    }

    /// The publish call with this index, starting at 0, fails.
    pub fn fail_publish_at(&self, index: usize) {
        self.inner.lock().unwrap().fail_publish_at = Some(index);
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerLink>, NotifyError> {
        let (refuse, stall) = {
            let mut rec = self.inner.lock().unwrap();
            (rec.refuse_connect, rec.stall_connect.take())
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if refuse {
            return Err(NotifyError::Connect {
                address: config.address(),
                source: aero_amqp::Error::Io(std::io::ErrorKind::ConnectionRefused.into()),
            });
        }

        self.inner.lock().unwrap().connects += 1;
        Ok(Box::new(RecordingLink {
            inner: self.inner.clone(),
            state: LinkState::Ready,
        }))
    }
}

struct RecordingLink {
    inner: Arc<Mutex<Recorded>>,
    state: LinkState,
}

#[async_trait]
impl BrokerLink for RecordingLink {
    fn state(&self) -> LinkState {
        self.state
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), NotifyError> {
        let stall = self.inner.lock().unwrap().stall_publish.take();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let mut rec = self.inner.lock().unwrap();
        let call = rec.publish_calls;
        rec.publish_calls += 1;
        if rec.fail_publish_at == Some(call) {
            return Err(NotifyError::Publish {
                exchange: exchange.into(),
                routing_key: routing_key.into(),
                source: aero_amqp::Error::Io(std::io::ErrorKind::BrokenPipe.into()),
            });
        }
        rec.published
            .push((exchange.into(), routing_key.into(), payload.to_vec()));
        Ok(())
    }

    async fn close(&mut self) {
        self.inner.lock().unwrap().closes += 1;
        self.state = LinkState::Disconnected;
    }
}

impl Drop for RecordingLink {
    fn drop(&mut self) {
        if self.state != LinkState::Disconnected {
            if let Ok(mut rec) = self.inner.lock() {
                rec.abandoned += 1;
            }
        }
    }
}

pub fn broker_settings() -> Settings {
    [
        (HOST_KEY, "mq.example.com"),
        (PORT_KEY, "5672"),
        (USER_KEY, "guest"),
        (PASSWORD_KEY, "guest"),
        (EXCHANGE_KEY, "mail"),
        (ROUTING_KEY_KEY, "events"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
