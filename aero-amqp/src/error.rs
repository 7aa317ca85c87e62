use super::types::CloseReason;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to decode frame: {0}")]
    Decode(String),
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),
    #[error("short string of {0} bytes does not fit in 255 bytes")]
    ShortStringTooLong(usize),
    #[error("frame of {0} bytes exceeds the allowed maximum")]
    FrameTooLarge(usize),
    #[error("expected {expected}, received {received}")]
    UnexpectedMethod {
        expected: &'static str,
        received: &'static str,
    },
    #[error("unexpected {kind} frame on channel {channel}")]
    UnexpectedFrame { channel: u16, kind: &'static str },
    #[error("broker speaks AMQP {major}-{minor}, only 0-9-1 is supported")]
    ProtocolVersion { major: u8, minor: u8 },
    #[error("broker does not offer the PLAIN mechanism (offered: {0})")]
    Mechanism(String),
    #[error("connection closed by broker: {0}")]
    ConnectionClosed(CloseReason),
    #[error("channel {channel} closed by broker: {reason}")]
    ChannelClosed { channel: u16, reason: CloseReason },
}

impl Error {
    /// The reason sent by the broker when it is the one closing.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::ConnectionClosed(reason) => Some(reason),
            Self::ChannelClosed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
