//! Wire envelope encoding/decoding
//!
//! Each frame is a 2-byte big-endian header followed by the payload. Bit 15
//! of the header is the zlib-compression flag; bits 14..0 are the payload
//! length, so a payload is at most 32767 bytes on the wire. The sender
//! compresses and keeps whichever encoding is smaller; a message that fits
//! neither way cannot be framed at all.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Maximum on-wire payload size (15-bit length field).
pub const MAX_PAYLOAD_SIZE: usize = 0x7FFF;

/// Header bit marking a zlib-compressed payload.
pub const COMPRESSED_FLAG: u16 = 0x8000;

/// Sanity limit on the inflated size of a compressed payload.
const MAX_INFLATED_SIZE: usize = 1024 * 1024;

/// Frame a raw payload: header plus (possibly compressed) body, ready to
/// write to a stream.
pub fn encode_frame(raw: &[u8]) -> Result<Vec<u8>> {
    let compressed = compress(raw)?;
    let (flag, body) = if compressed.len() < raw.len() {
        (COMPRESSED_FLAG, compressed)
    } else {
        (0, raw.to_vec())
    };

    if body.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::FrameTooLarge(body.len()));
    }

    let header = flag | body.len() as u16;
    let mut frame = Vec::with_capacity(2 + body.len());
    frame.extend_from_slice(&header.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Recover the raw payload from a frame body given its header.
pub fn decode_payload(header: u16, body: Vec<u8>) -> Result<Vec<u8>> {
    if header & COMPRESSED_FLAG != 0 {
        inflate(&body)
    } else {
        Ok(body)
    }
}

fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

fn inflate(body: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(body).take(MAX_INFLATED_SIZE as u64 + 1);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| Error::Protocol(format!("inflate failed: {e}")))?;
    if raw.len() > MAX_INFLATED_SIZE {
        return Err(Error::Protocol(format!(
            "inflated payload exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(raw)
}

/// Write one message as a frame.
pub async fn write_frame<W, M>(writer: &mut W, msg: &M) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let raw = serde_json::to_vec(msg)
        .map_err(|e| Error::Protocol(format!("serialization failed: {e}")))?;
    let frame = encode_frame(&raw)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message from a frame.
pub async fn read_frame<R, M>(reader: &mut R) -> Result<M>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let mut header_buf = [0u8; 2];
    reader.read_exact(&mut header_buf).await.map_err(eof_is_closed)?;
    let header = u16::from_be_bytes(header_buf);
    let len = (header & !COMPRESSED_FLAG) as usize;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(eof_is_closed)?;

    let raw = decode_payload(header, body)?;
    serde_json::from_slice(&raw).map_err(|e| Error::Protocol(format!("invalid message: {e}")))
}

fn eof_is_closed(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}
