use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::bytes::BytesMut;

use super::decode;
use super::encode::Encode;
use super::error::{Error, Result};
use super::types::*;

/// Reads exactly one frame. `frame_max` is the negotiated limit (header and
/// frame-end included). 0 leaves the limit unnegotiated, frames are then
/// capped at `DEFAULT_FRAME_MAX`.
pub async fn read_frame<R>(reader: &mut R, frame_max: u32) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let (_, (kind, channel, size)) =
        decode::frame_header(&header).map_err(|e| Error::Decode(e.to_string()))?;

    let limit = if frame_max == 0 {
        DEFAULT_FRAME_MAX
    } else {
        frame_max
    };
    if size > limit.saturating_sub(FRAME_OVERHEAD) {
        return Err(Error::FrameTooLarge(size as usize));
    }

    let mut payload = vec![0u8; size as usize + 1];
    reader.read_exact(&mut payload).await?;
    let end = payload.pop();
    if end != Some(FRAME_END) {
        return Err(Error::Decode(format!(
            "invalid frame end marker {:02X?}",
            end
        )));
    }

    let payload = decode::frame_payload(kind, &payload)?;
    tracing::trace!(channel, frame = payload.name(), "received frame");
    Ok(Frame { channel, payload })
}

/// Encodes all frames in `buf` and sends them in a single write.
pub async fn write_frames<W>(writer: &mut W, frames: &[Frame], buf: &mut BytesMut) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    buf.clear();
    for frame in frames.iter() {
        tracing::trace!(channel = frame.channel, frame = frame.payload.name(), "sent frame");
        frame.encode(buf)?;
    }
    writer.write_all(buf).await?;
    writer.flush().await?;
    buf.clear();
    Ok(())
}

/// Server side of the protocol negotiation.
pub async fn read_protocol_header<R>(reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).await?;
    if &header != PROTOCOL_HEADER {
        return Err(Error::ProtocolVersion {
            major: header[6],
            minor: header[7],
        });
    }
    Ok(())
}
