#![allow(dead_code)]
//! A broker speaking just enough AMQP 0-9-1 to accept publications.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::io::BufStream;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::bytes::BytesMut;

use aero_amqp::transport::{read_frame, read_protocol_header, write_frames};
use aero_amqp::types::*;
use aero_notify::config::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Number of content body frames the body was split in
    pub body_frames: usize,
}

#[derive(Debug, Default)]
pub struct BrokerLog {
    /// SASL responses received, `\0user\0password`
    pub logins: Vec<Vec<u8>>,
    pub deliveries: Vec<Delivery>,
    /// Publications to an exchange that does not exist
    pub rejected: Vec<Delivery>,
    pub channels_opened: usize,
    pub connections_closed: usize,
}

#[derive(Debug, Clone)]
pub struct BrokerBehavior {
    pub frame_max: u32,
    /// Exchanges that exist, publishing elsewhere closes the channel with 404
    pub exchanges: Vec<String>,
    pub refuse_login: bool,
    pub refuse_channel: bool,
}

impl Default for BrokerBehavior {
    fn default() -> Self {
        Self {
            frame_max: DEFAULT_FRAME_MAX,
            exchanges: vec!["mail".into()],
            refuse_login: false,
            refuse_channel: false,
        }
    }
}

pub struct FakeBroker {
    pub addr: SocketAddr,
    log: Arc<Mutex<BrokerLog>>,
}

impl FakeBroker {
    pub async fn start(behavior: BrokerBehavior) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let log = Arc::new(Mutex::new(BrokerLog::default()));

        let server_log = log.clone();
        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!(err=%e, "fake broker accept failed");
                        return;
                    }
                };
                let conn = BrokerConn {
                    stream: BufStream::new(socket),
                    buf: BytesMut::new(),
                    behavior: behavior.clone(),
                    log: server_log.clone(),
                };
                tokio::spawn(async move {
                    if let Err(e) = conn.run().await {
                        tracing::debug!(err=%e, "fake broker connection ended");
                    }
                });
            }
        });

        Ok(Self { addr, log })
    }

    pub fn log<T>(&self, f: impl FnOnce(&BrokerLog) -> T) -> T {
        f(&self.log.lock().unwrap())
    }

    /// Settings of a user publishing to this broker
    pub fn settings(&self, exchange: &str, routing_key: &str) -> Settings {
        settings_for(self.addr.port(), exchange, routing_key)
    }
}

pub fn settings_for(port: u16, exchange: &str, routing_key: &str) -> Settings {
    [
        (HOST_KEY, "127.0.0.1".to_string()),
        (PORT_KEY, port.to_string()),
        (USER_KEY, "guest".to_string()),
        (PASSWORD_KEY, "guest".to_string()),
        (EXCHANGE_KEY, exchange.to_string()),
        (ROUTING_KEY_KEY, routing_key.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// A port nobody listens on
pub async fn closed_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

struct Pending {
    exchange: String,
    routing_key: String,
    body_size: Option<u64>,
    body: Vec<u8>,
    body_frames: usize,
}

struct BrokerConn {
    stream: BufStream<TcpStream>,
    buf: BytesMut,
    behavior: BrokerBehavior,
    log: Arc<Mutex<BrokerLog>>,
}

impl BrokerConn {
    async fn send(&mut self, channel: u16, method: Method) -> Result<()> {
        write_frames(&mut self.stream, &[Frame::method(channel, method)], &mut self.buf).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame> {
        Ok(read_frame(&mut self.stream, self.behavior.frame_max).await?)
    }

    async fn recv_method(&mut self) -> Result<Method> {
        match self.recv().await?.payload {
            FramePayload::Method(m) => Ok(m),
            other => bail!("expected a method, got {}", other.name()),
        }
    }

    async fn run(mut self) -> Result<()> {
        read_protocol_header(&mut self.stream).await?;

        let mut props = FieldTable::new();
        props.insert("product", FieldValue::LongString(b"FakeMQ".to_vec()));
        props.insert("version", FieldValue::LongString(b"3.12.0".to_vec()));
        self.send(
            0,
            Method::ConnectionStart {
                version_major: 0,
                version_minor: 9,
                server_properties: props,
                mechanisms: b"AMQPLAIN PLAIN".to_vec(),
                locales: b"en_US".to_vec(),
            },
        )
        .await?;

        match self.recv_method().await? {
            Method::ConnectionStartOk { response, .. } => {
                self.log.lock().unwrap().logins.push(response)
            }
            other => bail!("expected connection.start-ok, got {}", other.name()),
        }

        if self.behavior.refuse_login {
            let reason = CloseReason {
                reply_code: 403,
                reply_text: "ACCESS_REFUSED - Login was refused".into(),
                class_id: 0,
                method_id: 0,
            };
            self.send(0, Method::ConnectionClose(reason)).await?;
            // connection.close-ok, then the client hangs up
            let _ = self.recv().await;
            return Ok(());
        }

        self.send(
            0,
            Method::ConnectionTune(Tuning {
                channel_max: 2047,
                frame_max: self.behavior.frame_max,
                heartbeat: 60,
            }),
        )
        .await?;
        match self.recv_method().await? {
            Method::ConnectionTuneOk(_) => (),
            other => bail!("expected connection.tune-ok, got {}", other.name()),
        }
        match self.recv_method().await? {
            Method::ConnectionOpen { .. } => self.send(0, Method::ConnectionOpenOk).await?,
            other => bail!("expected connection.open, got {}", other.name()),
        }

        let mut pending: Option<Pending> = None;
        let mut closing_channel = false;
        loop {
            let frame = self.recv().await?;
            let channel = frame.channel;
            match frame.payload {
                FramePayload::Method(Method::ChannelOpen) if self.behavior.refuse_channel => {
                    let reason = CloseReason {
                        reply_code: 403,
                        reply_text: "ACCESS_REFUSED - no access to this vhost".into(),
                        class_id: 20,
                        method_id: 10,
                    };
                    closing_channel = true;
                    self.send(channel, Method::ChannelClose(reason)).await?;
                }
                FramePayload::Method(Method::ChannelOpen) => {
                    self.log.lock().unwrap().channels_opened += 1;
                    self.send(channel, Method::ChannelOpenOk).await?;
                }
                FramePayload::Method(Method::BasicPublish {
                    exchange,
                    routing_key,
                    ..
                }) => {
                    pending = Some(Pending {
                        exchange,
                        routing_key,
                        body_size: None,
                        body: vec![],
                        body_frames: 0,
                    })
                }
                FramePayload::Header(header) => match pending.as_mut() {
                    Some(p) => p.body_size = Some(header.body_size),
                    None => bail!("content header without basic.publish"),
                },
                FramePayload::Body(part) => match pending.as_mut() {
                    Some(p) => {
                        p.body.extend_from_slice(&part);
                        p.body_frames += 1;
                    }
                    None => bail!("content body without basic.publish"),
                },
                FramePayload::Method(Method::ChannelClose(_)) if closing_channel => (),
                FramePayload::Method(Method::ChannelCloseOk) => closing_channel = false,
                FramePayload::Method(Method::ChannelClose(_)) => {
                    self.send(channel, Method::ChannelCloseOk).await?
                }
                FramePayload::Method(Method::ConnectionClose(_)) => {
                    self.log.lock().unwrap().connections_closed += 1;
                    self.send(0, Method::ConnectionCloseOk).await?;
                    return Ok(());
                }
                FramePayload::Heartbeat => (),
                FramePayload::Method(other) => bail!("unexpected {}", other.name()),
            }

            let complete = matches!(
                &pending,
                Some(p) if p.body_size == Some(p.body.len() as u64)
            );
            if complete {
                if let Some(p) = pending.take() {
                    self.deliver(channel, p, &mut closing_channel).await?;
                }
            }
        }
    }

    async fn deliver(&mut self, channel: u16, p: Pending, closing: &mut bool) -> Result<()> {
        let delivery = Delivery {
            exchange: p.exchange,
            routing_key: p.routing_key,
            body: p.body,
            body_frames: p.body_frames,
        };

        if self.behavior.exchanges.contains(&delivery.exchange) {
            self.log.lock().unwrap().deliveries.push(delivery);
            return Ok(());
        }

        let reason = CloseReason {
            reply_code: 404,
            reply_text: format!(
                "NOT_FOUND - no exchange '{}' in vhost '/'",
                delivery.exchange
            ),
            class_id: 60,
            method_id: 40,
        };
        self.log.lock().unwrap().rejected.push(delivery);
        *closing = true;
        self.send(channel, Method::ChannelClose(reason)).await
    }
}
