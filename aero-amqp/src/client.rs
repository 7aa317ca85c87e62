use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio_util::bytes::BytesMut;

use super::error::{Error, Result};
use super::transport::{read_frame, write_frames};
use super::types::*;

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub password: String,
    pub tuning: Tuning,
    pub client_properties: FieldTable,
}

impl ConnectOptions {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            virtual_host: DEFAULT_VHOST.into(),
            username: username.into(),
            password: password.into(),
            tuning: Tuning::default(),
            client_properties: default_client_properties(),
        }
    }
}

pub fn default_client_properties() -> FieldTable {
    let mut props = FieldTable::new();
    props.insert("product", FieldValue::LongString(b"aero-amqp".to_vec()));
    props.insert(
        "version",
        FieldValue::LongString(env!("CARGO_PKG_VERSION").as_bytes().to_vec()),
    );
    props.insert("platform", FieldValue::LongString(b"Rust".to_vec()));
    props.insert("capabilities", FieldValue::Table(FieldTable::new()));
    props
}

/// SASL PLAIN initial response (RFC 4616), without authorization identity
pub fn plain_response(username: &str, password: &str) -> Vec<u8> {
    let mut resp = Vec::with_capacity(username.len() + password.len() + 2);
    resp.push(0);
    resp.extend_from_slice(username.as_bytes());
    resp.push(0);
    resp.extend_from_slice(password.as_bytes());
    resp
}

/// A client connection to an AMQP 0-9-1 broker.
///
/// Calls are sequential: each method waiting for a reply reads frames until
/// it gets one, so the connection must not be shared between tasks.
pub struct Connection {
    stream: BufStream<TcpStream>,
    tuning: Tuning,
    server_properties: FieldTable,
    write_buf: BytesMut,
}

impl Connection {
    /// TCP connect, protocol negotiation, PLAIN login and virtual host opening.
    pub async fn open(options: &ConnectOptions) -> Result<Self> {
        let mut conn = Self::connect(options).await?;
        conn.login(options).await?;
        Ok(conn)
    }

    /// Only opens the socket, `login` must be called before anything else.
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let socket = TcpStream::connect((options.host.as_str(), options.port)).await?;
        socket.set_nodelay(true)?;

        Ok(Self {
            stream: BufStream::new(socket),
            tuning: Tuning {
                frame_max: FRAME_MIN_SIZE,
                ..options.tuning.clone()
            },
            server_properties: FieldTable::new(),
            write_buf: BytesMut::new(),
        })
    }

    pub async fn login(&mut self, options: &ConnectOptions) -> Result<()> {
        self.stream.write_all(PROTOCOL_HEADER).await?;
        self.stream.flush().await?;

        let mechanisms = match self.recv_method(0).await? {
            Method::ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms,
                ..
            } => {
                if (version_major, version_minor) != (0, 9) {
                    return Err(Error::ProtocolVersion {
                        major: version_major,
                        minor: version_minor,
                    });
                }
                self.server_properties = server_properties;
                mechanisms
            }
            other => return Err(unexpected("connection.start", &other)),
        };
        tracing::debug!(
            product = ?self.server_properties.get_str("product"),
            version = ?self.server_properties.get_str("version"),
            "broker greeting"
        );

        let plain_offered = mechanisms
            .split(|c| *c == b' ')
            .any(|m| m == MECHANISM_PLAIN.as_bytes());
        if !plain_offered {
            return Err(Error::Mechanism(
                String::from_utf8_lossy(&mechanisms).into_owned(),
            ));
        }

        self.send(
            0,
            Method::ConnectionStartOk {
                client_properties: options.client_properties.clone(),
                mechanism: MECHANISM_PLAIN.into(),
                response: plain_response(&options.username, &options.password),
                locale: DEFAULT_LOCALE.into(),
            },
        )
        .await?;

        // A login failure shows up here as a connection.close
        let server_tuning = match self.recv_method(0).await? {
            Method::ConnectionTune(t) => t,
            other => return Err(unexpected("connection.tune", &other)),
        };
        let tuning = options.tuning.negotiate(&server_tuning);
        tracing::debug!(?tuning, "tuned connection");

        self.send_all(&[
            Frame::method(0, Method::ConnectionTuneOk(tuning.clone())),
            Frame::method(
                0,
                Method::ConnectionOpen {
                    virtual_host: options.virtual_host.clone(),
                },
            ),
        ])
        .await?;
        self.tuning = tuning;

        match self.recv_method(0).await? {
            Method::ConnectionOpenOk => Ok(()),
            other => Err(unexpected("connection.open-ok", &other)),
        }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn server_properties(&self) -> &FieldTable {
        &self.server_properties
    }

    pub async fn open_channel(&mut self, channel: u16) -> Result<()> {
        self.send(channel, Method::ChannelOpen).await?;
        match self.recv_method(channel).await? {
            Method::ChannelOpenOk => Ok(()),
            other => Err(unexpected("channel.open-ok", &other)),
        }
    }

    /// Sends a message without waiting for any acknowledgement: a broker
    /// refusing it closes the channel, which is reported by the next call
    /// waiting for a reply on this channel.
    pub async fn publish(
        &mut self,
        channel: u16,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        immediate: bool,
        body: &[u8],
    ) -> Result<()> {
        let mut frames = vec![
            Frame::method(
                channel,
                Method::BasicPublish {
                    exchange: exchange.into(),
                    routing_key: routing_key.into(),
                    mandatory,
                    immediate,
                },
            ),
            Frame {
                channel,
                payload: FramePayload::Header(ContentHeader::basic(body.len() as u64)),
            },
        ];

        let chunk = self.tuning.max_body_chunk().unwrap_or(body.len().max(1));
        frames.extend(body.chunks(chunk).map(|part| Frame {
            channel,
            payload: FramePayload::Body(part.to_vec()),
        }));

        self.send_all(&frames).await
    }

    pub async fn close_channel(&mut self, channel: u16) -> Result<()> {
        self.send(channel, Method::ChannelClose(CloseReason::normal()))
            .await?;
        match self.recv_method(channel).await? {
            Method::ChannelCloseOk => Ok(()),
            other => Err(unexpected("channel.close-ok", &other)),
        }
    }

    /// Closes the connection then the socket. The socket is released even
    /// if the broker does not answer properly.
    pub async fn close(mut self) -> Result<()> {
        let res = self.close_handshake().await;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(err=%e, "socket shutdown failed");
        }
        res
    }

    async fn close_handshake(&mut self) -> Result<()> {
        self.send(0, Method::ConnectionClose(CloseReason::normal()))
            .await?;
        match self.recv_method(0).await? {
            Method::ConnectionCloseOk => Ok(()),
            other => Err(unexpected("connection.close-ok", &other)),
        }
    }

    async fn send(&mut self, channel: u16, method: Method) -> Result<()> {
        self.send_all(&[Frame::method(channel, method)]).await
    }

    async fn send_all(&mut self, frames: &[Frame]) -> Result<()> {
        write_frames(&mut self.stream, frames, &mut self.write_buf).await
    }

    /// Waits for the next method on `channel`.
    ///
    /// Heartbeats and frames addressed to other channels are skipped. A close
    /// initiated by the broker is acknowledged and turned into an error.
    async fn recv_method(&mut self, channel: u16) -> Result<Method> {
        loop {
            let frame = read_frame(&mut self.stream, self.tuning.frame_max).await?;
            match frame.payload {
                FramePayload::Method(Method::ConnectionClose(reason)) => {
                    if let Err(e) = self.send(0, Method::ConnectionCloseOk).await {
                        tracing::debug!(err=%e, "unable to acknowledge connection.close");
                    }
                    return Err(Error::ConnectionClosed(reason));
                }
                FramePayload::Heartbeat => continue,
                _ if frame.channel != channel => {
                    tracing::debug!(
                        channel = frame.channel,
                        frame = frame.payload.name(),
                        "skipping frame for another channel"
                    );
                    continue;
                }
                FramePayload::Method(Method::ChannelClose(reason)) => {
                    self.send(channel, Method::ChannelCloseOk).await?;
                    return Err(Error::ChannelClosed { channel, reason });
                }
                FramePayload::Method(method) => return Ok(method),
                other => {
                    return Err(Error::UnexpectedFrame {
                        channel,
                        kind: other.name(),
                    })
                }
            }
        }
    }
}

fn unexpected(expected: &'static str, received: &Method) -> Error {
    Error::UnexpectedMethod {
        expected,
        received: received.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_response_layout() {
        assert_eq!(plain_response("guest", "guest"), b"\0guest\0guest".to_vec());
    }

    #[test]
    fn tuning_negotiation() {
        let client = Tuning::default();

        let server = Tuning {
            channel_max: 0,
            frame_max: 65_536,
            heartbeat: 60,
        };
        let tuned = client.negotiate(&server);
        assert_eq!(tuned.channel_max, DEFAULT_CHANNEL_MAX);
        assert_eq!(tuned.frame_max, 65_536);
        assert_eq!(tuned.heartbeat, 0);

        let unlimited = Tuning {
            channel_max: 0,
            frame_max: 0,
            heartbeat: 0,
        };
        assert_eq!(unlimited.negotiate(&unlimited).max_body_chunk(), None);
        assert_eq!(tuned.max_body_chunk(), Some(65_528));
    }
}
