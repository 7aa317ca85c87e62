use tokio_util::bytes::{BufMut, BytesMut};

use super::error::{Error, Result};
use super::types::*;

pub trait Encode {
    fn encode(&self, out: &mut BytesMut) -> Result<()>;
}

fn short_bytes(out: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u8::try_from(data.len()).map_err(|_| Error::ShortStringTooLong(data.len()))?;
    out.put_u8(len);
    out.put_slice(data);
    Ok(())
}

fn short_str(out: &mut BytesMut, data: &str) -> Result<()> {
    short_bytes(out, data.as_bytes())
}

fn long_bytes(out: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| Error::FrameTooLarge(data.len()))?;
    out.put_u32(len);
    out.put_slice(data);
    Ok(())
}

fn close_args(out: &mut BytesMut, reason: &CloseReason) -> Result<()> {
    out.put_u16(reason.reply_code);
    short_str(out, &reason.reply_text)?;
    out.put_u16(reason.class_id);
    out.put_u16(reason.method_id);
    Ok(())
}

fn tune_args(out: &mut BytesMut, tuning: &Tuning) {
    out.put_u16(tuning.channel_max);
    out.put_u32(tuning.frame_max);
    out.put_u16(tuning.heartbeat);
}

impl Encode for FieldValue {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        match self {
            Self::Bool(v) => {
                out.put_u8(b't');
                out.put_u8(u8::from(*v));
            }
            Self::I8(v) => {
                out.put_u8(b'b');
                out.put_i8(*v);
            }
            Self::U8(v) => {
                out.put_u8(b'B');
                out.put_u8(*v);
            }
            Self::I16(v) => {
                out.put_u8(b's');
                out.put_i16(*v);
            }
            Self::U16(v) => {
                out.put_u8(b'u');
                out.put_u16(*v);
            }
            Self::I32(v) => {
                out.put_u8(b'I');
                out.put_i32(*v);
            }
            Self::U32(v) => {
                out.put_u8(b'i');
                out.put_u32(*v);
            }
            Self::I64(v) => {
                out.put_u8(b'l');
                out.put_i64(*v);
            }
            Self::Timestamp(v) => {
                out.put_u8(b'T');
                out.put_u64(*v);
            }
            Self::LongString(v) => {
                out.put_u8(b'S');
                long_bytes(out, v)?;
            }
            Self::Table(t) => {
                out.put_u8(b'F');
                t.encode(out)?;
            }
            Self::Void => out.put_u8(b'V'),
            Self::Bytes(v) => {
                out.put_u8(b'x');
                long_bytes(out, v)?;
            }
        }
        Ok(())
    }
}

impl Encode for FieldTable {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let mut entries = BytesMut::new();
        for (name, value) in self.0.iter() {
            short_str(&mut entries, name)?;
            value.encode(&mut entries)?;
        }
        long_bytes(out, &entries)
    }
}

impl Encode for Method {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let (class_id, method_id) = self.id();
        out.put_u16(class_id);
        out.put_u16(method_id);

        match self {
            Self::ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms,
                locales,
            } => {
                out.put_u8(*version_major);
                out.put_u8(*version_minor);
                server_properties.encode(out)?;
                long_bytes(out, mechanisms)?;
                long_bytes(out, locales)?;
            }
            Self::ConnectionStartOk {
                client_properties,
                mechanism,
                response,
                locale,
            } => {
                client_properties.encode(out)?;
                short_str(out, mechanism)?;
                long_bytes(out, response)?;
                short_str(out, locale)?;
            }
            Self::ConnectionTune(tuning) | Self::ConnectionTuneOk(tuning) => tune_args(out, tuning),
            Self::ConnectionOpen { virtual_host } => {
                short_str(out, virtual_host)?;
                // reserved: capabilities (shortstr) and insist (bit)
                short_str(out, "")?;
                out.put_u8(0);
            }
            Self::ConnectionOpenOk => short_str(out, "")?,
            Self::ConnectionClose(reason) | Self::ChannelClose(reason) => close_args(out, reason)?,
            Self::ConnectionCloseOk | Self::ChannelCloseOk => (),
            Self::ChannelOpen => short_str(out, "")?,
            Self::ChannelOpenOk => long_bytes(out, &[])?,
            Self::BasicPublish {
                exchange,
                routing_key,
                mandatory,
                immediate,
            } => {
                // reserved: ticket
                out.put_u16(0);
                short_str(out, exchange)?;
                short_str(out, routing_key)?;
                let mut bits = 0u8;
                if *mandatory {
                    bits |= 0x01;
                }
                if *immediate {
                    bits |= 0x02;
                }
                out.put_u8(bits);
            }
            Self::Other { .. } => (),
        }
        Ok(())
    }
}

impl Encode for ContentHeader {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        out.put_u16(self.class_id);
        // weight, unused
        out.put_u16(0);
        out.put_u64(self.body_size);
        out.put_u16(self.property_flags);
        Ok(())
    }
}

impl Encode for Frame {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let mut payload = BytesMut::new();
        match &self.payload {
            FramePayload::Method(m) => m.encode(&mut payload)?,
            FramePayload::Header(h) => h.encode(&mut payload)?,
            FramePayload::Body(b) => payload.put_slice(b),
            FramePayload::Heartbeat => (),
        }
        let size = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge(payload.len()))?;

        out.put_u8(self.payload.kind());
        out.put_u16(self.channel);
        out.put_u32(size);
        out.put_slice(&payload);
        out.put_u8(FRAME_END);
        Ok(())
    }
}
