use std::fmt;

/// Sent by the client right after the TCP connection is established.
pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";

pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;
pub const FRAME_END: u8 = 0xCE;

/// type (1 byte) + channel (2 bytes) + size (4 bytes)
pub const FRAME_HEADER_SIZE: usize = 7;
/// Frame header plus the frame-end octet
pub const FRAME_OVERHEAD: u32 = 8;
/// Largest frame a peer may send before tuning is done
pub const FRAME_MIN_SIZE: u32 = 4096;

// Same defaults as librabbitmq
pub const DEFAULT_CHANNEL_MAX: u16 = 2047;
pub const DEFAULT_FRAME_MAX: u32 = 131_072;
pub const DEFAULT_HEARTBEAT: u16 = 0;

pub const MECHANISM_PLAIN: &str = "PLAIN";
pub const DEFAULT_LOCALE: &str = "en_US";
pub const DEFAULT_VHOST: &str = "/";

pub const CLASS_CONNECTION: u16 = 10;
pub const CLASS_CHANNEL: u16 = 20;
pub const CLASS_BASIC: u16 = 60;

pub const CONNECTION_START: (u16, u16) = (CLASS_CONNECTION, 10);
pub const CONNECTION_START_OK: (u16, u16) = (CLASS_CONNECTION, 11);
pub const CONNECTION_TUNE: (u16, u16) = (CLASS_CONNECTION, 30);
pub const CONNECTION_TUNE_OK: (u16, u16) = (CLASS_CONNECTION, 31);
pub const CONNECTION_OPEN: (u16, u16) = (CLASS_CONNECTION, 40);
pub const CONNECTION_OPEN_OK: (u16, u16) = (CLASS_CONNECTION, 41);
pub const CONNECTION_CLOSE: (u16, u16) = (CLASS_CONNECTION, 50);
pub const CONNECTION_CLOSE_OK: (u16, u16) = (CLASS_CONNECTION, 51);
pub const CHANNEL_OPEN: (u16, u16) = (CLASS_CHANNEL, 10);
pub const CHANNEL_OPEN_OK: (u16, u16) = (CLASS_CHANNEL, 11);
pub const CHANNEL_CLOSE: (u16, u16) = (CLASS_CHANNEL, 40);
pub const CHANNEL_CLOSE_OK: (u16, u16) = (CLASS_CHANNEL, 41);
pub const BASIC_PUBLISH: (u16, u16) = (CLASS_BASIC, 40);

pub const REPLY_SUCCESS: u16 = 200;

/// Maps an AMQP reply code to the constant name used by the protocol
/// documentation and by brokers in their logs.
pub fn reply_code_name(code: u16) -> &'static str {
    match code {
        200 => "REPLY_SUCCESS",
        311 => "CONTENT_TOO_LARGE",
        312 => "NO_ROUTE",
        313 => "NO_CONSUMERS",
        320 => "CONNECTION_FORCED",
        402 => "INVALID_PATH",
        403 => "ACCESS_REFUSED",
        404 => "NOT_FOUND",
        405 => "RESOURCE_LOCKED",
        406 => "PRECONDITION_FAILED",
        501 => "FRAME_ERROR",
        502 => "SYNTAX_ERROR",
        503 => "COMMAND_INVALID",
        504 => "CHANNEL_ERROR",
        505 => "UNEXPECTED_FRAME",
        506 => "RESOURCE_ERROR",
        530 => "NOT_ALLOWED",
        540 => "NOT_IMPLEMENTED",
        541 => "INTERNAL_ERROR",
        _ => "UNKNOWN_REPLY_CODE",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `t`
    Bool(bool),
    /// `b`
    I8(i8),
    /// `B`
    U8(u8),
    /// `s`
    I16(i16),
    /// `u`
    U16(u16),
    /// `I`
    I32(i32),
    /// `i`
    U32(u32),
    /// `l`
    I64(i64),
    /// `T`, seconds since the epoch
    Timestamp(u64),
    /// `S`
    LongString(Vec<u8>),
    /// `F`
    Table(FieldTable),
    /// `V`
    Void,
    /// `x`
    Bytes(Vec<u8>),
}

/// Ordered list of (name, value) pairs; peers do not rely on ordering but we
/// keep it so encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldTable(pub Vec<(String, FieldValue)>);

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        self.0.retain(|(k, _)| k != &key);
        self.0.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Convenience accessor for the `S` entries brokers use in their
    /// server-properties (product, version, platform...)
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(FieldValue::LongString(v)) => Some(String::from_utf8_lossy(v).into_owned()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            channel_max: DEFAULT_CHANNEL_MAX,
            frame_max: DEFAULT_FRAME_MAX,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

impl Tuning {
    /// Both sides propose limits, 0 meaning "no limit": the lowest
    /// non-zero proposal wins. The heartbeat is the client's decision.
    pub fn negotiate(&self, server: &Tuning) -> Tuning {
        fn lowest<T: Ord + Default + Copy>(a: T, b: T) -> T {
            let zero = T::default();
            match (a == zero, b == zero) {
                (true, _) => b,
                (_, true) => a,
                _ => a.min(b),
            }
        }

        Tuning {
            channel_max: lowest(self.channel_max, server.channel_max),
            frame_max: lowest(self.frame_max, server.frame_max),
            heartbeat: self.heartbeat,
        }
    }

    /// Largest content body chunk that fits in a single frame.
    pub fn max_body_chunk(&self) -> Option<usize> {
        match self.frame_max {
            0 => None,
            n => Some(n.saturating_sub(FRAME_OVERHEAD).max(1) as usize),
        }
    }
}

/// Arguments of `connection.close` and `channel.close`
#[derive(Debug, Clone, PartialEq)]
pub struct CloseReason {
    pub reply_code: u16,
    pub reply_text: String,
    /// Class and method of the frame that caused the close, 0 if none
    pub class_id: u16,
    pub method_id: u16,
}

impl CloseReason {
    pub fn normal() -> Self {
        Self {
            reply_code: REPLY_SUCCESS,
            reply_text: "Goodbye".into(),
            class_id: 0,
            method_id: 0,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.reply_code == REPLY_SUCCESS
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.reply_code,
            reply_code_name(self.reply_code),
            self.reply_text
        )?;
        if self.class_id != 0 || self.method_id != 0 {
            write!(
                f,
                " (caused by method {}.{})",
                self.class_id, self.method_id
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    ConnectionStart {
        version_major: u8,
        version_minor: u8,
        server_properties: FieldTable,
        /// Space separated list of SASL mechanisms
        mechanisms: Vec<u8>,
        locales: Vec<u8>,
    },
    ConnectionStartOk {
        client_properties: FieldTable,
        mechanism: String,
        /// Opaque SASL response, `\0user\0password` for PLAIN
        response: Vec<u8>,
        locale: String,
    },
    ConnectionTune(Tuning),
    ConnectionTuneOk(Tuning),
    ConnectionOpen {
        virtual_host: String,
    },
    ConnectionOpenOk,
    ConnectionClose(CloseReason),
    ConnectionCloseOk,
    ChannelOpen,
    ChannelOpenOk,
    ChannelClose(CloseReason),
    ChannelCloseOk,
    BasicPublish {
        exchange: String,
        routing_key: String,
        mandatory: bool,
        immediate: bool,
    },
    /// A method we do not implement, its arguments are skipped
    Other {
        class_id: u16,
        method_id: u16,
    },
}

impl Method {
    pub fn id(&self) -> (u16, u16) {
        match self {
            Self::ConnectionStart { .. } => CONNECTION_START,
            Self::ConnectionStartOk { .. } => CONNECTION_START_OK,
            Self::ConnectionTune(_) => CONNECTION_TUNE,
            Self::ConnectionTuneOk(_) => CONNECTION_TUNE_OK,
            Self::ConnectionOpen { .. } => CONNECTION_OPEN,
            Self::ConnectionOpenOk => CONNECTION_OPEN_OK,
            Self::ConnectionClose(_) => CONNECTION_CLOSE,
            Self::ConnectionCloseOk => CONNECTION_CLOSE_OK,
            Self::ChannelOpen => CHANNEL_OPEN,
            Self::ChannelOpenOk => CHANNEL_OPEN_OK,
            Self::ChannelClose(_) => CHANNEL_CLOSE,
            Self::ChannelCloseOk => CHANNEL_CLOSE_OK,
            Self::BasicPublish { .. } => BASIC_PUBLISH,
            Self::Other {
                class_id,
                method_id,
            } => (*class_id, *method_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionStart { .. } => "connection.start",
            Self::ConnectionStartOk { .. } => "connection.start-ok",
            Self::ConnectionTune(_) => "connection.tune",
            Self::ConnectionTuneOk(_) => "connection.tune-ok",
            Self::ConnectionOpen { .. } => "connection.open",
            Self::ConnectionOpenOk => "connection.open-ok",
            Self::ConnectionClose(_) => "connection.close",
            Self::ConnectionCloseOk => "connection.close-ok",
            Self::ChannelOpen => "channel.open",
            Self::ChannelOpenOk => "channel.open-ok",
            Self::ChannelClose(_) => "channel.close",
            Self::ChannelCloseOk => "channel.close-ok",
            Self::BasicPublish { .. } => "basic.publish",
            Self::Other { .. } => "unsupported method",
        }
    }
}

/// Content header without any property: we never send message properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    pub class_id: u16,
    pub body_size: u64,
    pub property_flags: u16,
}

impl ContentHeader {
    pub fn basic(body_size: u64) -> Self {
        Self {
            class_id: CLASS_BASIC,
            body_size,
            property_flags: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Method(Method),
    Header(ContentHeader),
    Body(Vec<u8>),
    Heartbeat,
}

impl FramePayload {
    pub fn kind(&self) -> u8 {
        match self {
            Self::Method(_) => FRAME_METHOD,
            Self::Header(_) => FRAME_HEADER,
            Self::Body(_) => FRAME_BODY,
            Self::Heartbeat => FRAME_HEARTBEAT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Method(m) => m.name(),
            Self::Header(_) => "content header",
            Self::Body(_) => "content body",
            Self::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channel: u16,
    pub payload: FramePayload,
}

impl Frame {
    pub fn method(channel: u16, method: Method) -> Self {
        Self {
            channel,
            payload: FramePayload::Method(method),
        }
    }
}
