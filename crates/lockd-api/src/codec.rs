//! Length-prefixed frame codec
//!
//! A frame is a six digit, zero padded ASCII decimal header giving the body
//! length, followed by exactly that many bytes of JSON body. A leading `+`
//! in place of the first zero is accepted, as older clients format the length
//! with a sign. [`read_packet`] reads one frame at a time straight from a
//! stream; [`decode_frame`] works on a caller-owned receive buffer.

use std::io::ErrorKind;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::model::{FRAME_HEADER_LEN, MAX_BODY_LEN, Packet};

/// Errors produced while reading or writing frames
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame header: {0:?}")]
    InvalidHeader(String),

    #[error("frame body of {0} bytes exceeds the 999999 byte limit")]
    FrameTooLarge(usize),

    #[error("malformed packet body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("empty packet body")]
    EmptyBody,
}

/// Outcome of decoding the front of a receive buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was removed from the buffer
    Packet(Packet),
    /// A frame declared an empty body; nothing after it is read
    EndOfStream,
    /// The buffer does not hold a complete frame yet
    Incomplete,
}

/// Encode a packet into a complete frame (header + body)
pub fn encode_frame(packet: &Packet) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(packet)?;
    if body.len() > MAX_BODY_LEN {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    buf.put_slice(format!("{:06}", body.len()).as_bytes());
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Parse the declared body length from a frame header
pub fn parse_header(header: &[u8]) -> Result<usize, CodecError> {
    let digits = match header {
        [b'+', rest @ ..] => rest,
        _ => header,
    };

    if header.len() != FRAME_HEADER_LEN
        || digits.is_empty()
        || !digits.iter().all(u8::is_ascii_digit)
    {
        return Err(CodecError::InvalidHeader(
            String::from_utf8_lossy(header).into_owned(),
        ));
    }

    Ok(digits
        .iter()
        .fold(0usize, |acc, digit| acc * 10 + (digit - b'0') as usize))
}

/// Remove the next complete frame from `buf`
///
/// Leaves `buf` untouched when the frame is incomplete or ends the stream.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Decoded, CodecError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(Decoded::Incomplete);
    }

    let declared = parse_header(&buf[..FRAME_HEADER_LEN])?;
    if declared == 0 {
        return Ok(Decoded::EndOfStream);
    }

    let frame_len = FRAME_HEADER_LEN + declared;
    if buf.len() < frame_len {
        buf.reserve(frame_len - buf.len());
        return Ok(Decoded::Incomplete);
    }

    buf.advance(FRAME_HEADER_LEN);
    let body = buf.split_to(declared);
    decode_body(&body).map(Decoded::Packet)
}

/// Decode a frame body into a packet
///
/// Only the first JSON value of the body is considered; trailing bytes are
/// ignored.
pub fn decode_body(body: &[u8]) -> Result<Packet, CodecError> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<Packet>()
        .next()
        .ok_or(CodecError::EmptyBody)?
        .map_err(CodecError::from)
}

/// Read the next packet from the stream
///
/// Returns `Ok(None)` when the stream ends, including when it ends part way
/// through a header or a body, or when a frame declares an empty body.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    if !read_full(reader, &mut header).await? {
        return Ok(None);
    }

    let declared = parse_header(&header)?;
    if declared == 0 {
        return Ok(None);
    }

    let mut body = vec![0u8; declared];
    if !read_full(reader, &mut body).await? {
        return Ok(None);
    }

    decode_body(&body).map(Some)
}

/// Write one packet as a frame and flush it
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// Fill `buf` completely; `false` means the peer closed before it was full.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, CodecError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
