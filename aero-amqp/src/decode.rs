use nom::{
    combinator::{all_consuming, map, map_res, rest},
    error::{Error as NomError, ErrorKind},
    multi::{length_data, many0},
    number::complete::{be_i16, be_i32, be_i64, be_i8, be_u16, be_u32, be_u64, be_u8},
    sequence::{pair, tuple},
    IResult,
};

use super::error::{Error, Result};
use super::types::*;

/// Decodes the payload of a frame once its header and frame-end marker
/// have been stripped by the transport.
pub fn frame_payload(kind: u8, payload: &[u8]) -> Result<FramePayload> {
    let res = match kind {
        FRAME_METHOD => all_consuming(method)(payload).map(|(_, m)| FramePayload::Method(m)),
        FRAME_HEADER => content_header(payload).map(|(_, h)| FramePayload::Header(h)),
        FRAME_BODY => return Ok(FramePayload::Body(payload.to_vec())),
        FRAME_HEARTBEAT => return Ok(FramePayload::Heartbeat),
        other => return Err(Error::UnknownFrameType(other)),
    };
    res.map_err(|e| Error::Decode(e.to_string()))
}

/// type, channel, size
pub fn frame_header(input: &[u8]) -> IResult<&[u8], (u8, u16, u32)> {
    tuple((be_u8, be_u16, be_u32))(input)
}

// ---------------------

fn short_bytes(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u8)(input)
}

fn short_str(input: &[u8]) -> IResult<&[u8], String> {
    map_res(short_bytes, |b| std::str::from_utf8(b).map(str::to_string))(input)
}

fn long_bytes(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u32)(input)
}

fn field_value(input: &[u8]) -> IResult<&[u8], FieldValue> {
    let (input, kind) = be_u8(input)?;
    match kind {
        b't' => map(be_u8, |v| FieldValue::Bool(v != 0))(input),
        b'b' => map(be_i8, FieldValue::I8)(input),
        b'B' => map(be_u8, FieldValue::U8)(input),
        b's' => map(be_i16, FieldValue::I16)(input),
        b'u' => map(be_u16, FieldValue::U16)(input),
        b'I' => map(be_i32, FieldValue::I32)(input),
        b'i' => map(be_u32, FieldValue::U32)(input),
        b'l' => map(be_i64, FieldValue::I64)(input),
        b'T' => map(be_u64, FieldValue::Timestamp)(input),
        b'S' => map(long_bytes, |v| FieldValue::LongString(v.to_vec()))(input),
        b'x' => map(long_bytes, |v| FieldValue::Bytes(v.to_vec()))(input),
        b'F' => map(field_table, FieldValue::Table)(input),
        b'V' => Ok((input, FieldValue::Void)),
        _ => Err(nom::Err::Failure(NomError::new(input, ErrorKind::Switch))),
    }
}

pub fn field_table(input: &[u8]) -> IResult<&[u8], FieldTable> {
    let (input, raw) = long_bytes(input)?;
    let (_, entries) = all_consuming(many0(pair(short_str, field_value)))(raw)?;
    Ok((input, FieldTable(entries)))
}

fn tuning(input: &[u8]) -> IResult<&[u8], Tuning> {
    map(
        tuple((be_u16, be_u32, be_u16)),
        |(channel_max, frame_max, heartbeat)| Tuning {
            channel_max,
            frame_max,
            heartbeat,
        },
    )(input)
}

fn close_reason(input: &[u8]) -> IResult<&[u8], CloseReason> {
    map(
        tuple((be_u16, short_str, be_u16, be_u16)),
        |(reply_code, reply_text, class_id, method_id)| CloseReason {
            reply_code,
            reply_text,
            class_id,
            method_id,
        },
    )(input)
}

fn connection_start(input: &[u8]) -> IResult<&[u8], Method> {
    map(
        tuple((be_u8, be_u8, field_table, long_bytes, long_bytes)),
        |(version_major, version_minor, server_properties, mechanisms, locales)| {
            Method::ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms: mechanisms.to_vec(),
                locales: locales.to_vec(),
            }
        },
    )(input)
}

fn connection_start_ok(input: &[u8]) -> IResult<&[u8], Method> {
    map(
        tuple((field_table, short_str, long_bytes, short_str)),
        |(client_properties, mechanism, response, locale)| Method::ConnectionStartOk {
            client_properties,
            mechanism,
            response: response.to_vec(),
            locale,
        },
    )(input)
}

fn connection_open(input: &[u8]) -> IResult<&[u8], Method> {
    map(
        tuple((short_str, short_bytes, be_u8)),
        |(virtual_host, _capabilities, _insist)| Method::ConnectionOpen { virtual_host },
    )(input)
}

fn basic_publish(input: &[u8]) -> IResult<&[u8], Method> {
    map(
        tuple((be_u16, short_str, short_str, be_u8)),
        |(_ticket, exchange, routing_key, bits)| Method::BasicPublish {
            exchange,
            routing_key,
            mandatory: bits & 0x01 != 0,
            immediate: bits & 0x02 != 0,
        },
    )(input)
}

pub fn method(input: &[u8]) -> IResult<&[u8], Method> {
    let (input, (class_id, method_id)) = tuple((be_u16, be_u16))(input)?;
    match (class_id, method_id) {
        CONNECTION_START => connection_start(input),
        CONNECTION_START_OK => connection_start_ok(input),
        CONNECTION_TUNE => map(tuning, Method::ConnectionTune)(input),
        CONNECTION_TUNE_OK => map(tuning, Method::ConnectionTuneOk)(input),
        CONNECTION_OPEN => connection_open(input),
        CONNECTION_OPEN_OK => map(short_bytes, |_| Method::ConnectionOpenOk)(input),
        CONNECTION_CLOSE => map(close_reason, Method::ConnectionClose)(input),
        CONNECTION_CLOSE_OK => Ok((input, Method::ConnectionCloseOk)),
        CHANNEL_OPEN => map(short_bytes, |_| Method::ChannelOpen)(input),
        CHANNEL_OPEN_OK => map(long_bytes, |_| Method::ChannelOpenOk)(input),
        CHANNEL_CLOSE => map(close_reason, Method::ChannelClose)(input),
        CHANNEL_CLOSE_OK => Ok((input, Method::ChannelCloseOk)),
        BASIC_PUBLISH => basic_publish(input),
        _ => map(rest, |_| Method::Other {
            class_id,
            method_id,
        })(input),
    }
}

/// Property list is not decoded, we never ask for message delivery.
pub fn content_header(input: &[u8]) -> IResult<&[u8], ContentHeader> {
    let (input, (class_id, _weight, body_size, property_flags)) =
        tuple((be_u16, be_u16, be_u64, be_u16))(input)?;
    let (input, _properties) = rest(input)?;
    Ok((
        input,
        ContentHeader {
            class_id,
            body_size,
            property_flags,
        },
    ))
}
