//! Wire framing: the `DLCM` length-prefixed frame and the `read_all` primitive
//! used everywhere a fixed number of bytes must be read off a stream.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// The four magic bytes that open every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"DLCM";

/// Header size: 4-byte magic + 4-byte little-endian length.
pub const HEADER_LEN: usize = 8;

/// Read exactly `buf.len()` bytes, issuing repeated reads until the buffer is
/// full or the stream ends. An EOF with some bytes already read is reported as
/// `UnexpectedEof` so callers can distinguish a clean close from a truncated
/// read.
pub async fn read_all<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                if filled == 0 {
                    "connection closed by remote"
                } else {
                    "truncated read"
                },
            )));
        }
        filled += n;
    }
    Ok(())
}

/// Append one encoded frame (`DLCM` + LE length + payload) to `out`.
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&FRAME_MAGIC);
    let mut len_bytes = [0u8; 4];
    LittleEndian::write_u32(&mut len_bytes, payload.len() as u32);
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(payload);
}

/// Encode a single frame into a fresh buffer.
pub fn encode_frame_owned(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    encode_frame(payload, &mut out);
    out
}

/// Write one frame directly to an async writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let framed = encode_frame_owned(payload);
    writer.write_all(&framed).await?;
    Ok(())
}

/// Decode one frame from the reader: a header (magic + length) followed by
/// exactly that many payload bytes.
pub async fn decode_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes> {
    let mut header = [0u8; HEADER_LEN];
    read_all(reader, &mut header).await?;
    if header[..4] != FRAME_MAGIC {
        return Err(Error::protocol(format!(
            "bad frame magic: expected {:?}, got {:?}",
            FRAME_MAGIC,
            &header[..4]
        )));
    }
    let len = LittleEndian::read_u32(&header[4..]) as usize;
    let mut payload = vec![0u8; len];
    read_all(reader, &mut payload).await?;
    Ok(Bytes::from(payload))
}
