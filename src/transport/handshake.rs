//! The v1 handshake: `DLC\x01` + name length + name from the client, `DLCS`
//! from the server. v0 (`DLC\x00`, no client name) is deprecated and not
//! accepted.

use byteorder::{ByteOrder, LittleEndian};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::frame::read_all;
use crate::error::{Error, Result};

const HELLO_MAGIC: [u8; 4] = *b"DLC\x01";
const ACK_MAGIC: [u8; 4] = *b"DLCS";

pub mod client {
    use super::*;

    /// Send `HandshakeHello` and wait for `HandshakeAck`. Fails with
    /// `Error::Protocol` if the reply isn't exactly `"DLCS"`.
    pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, name: &str) -> Result<()> {
        let name_bytes = name.as_bytes();
        let mut hello = Vec::with_capacity(8 + name_bytes.len());
        hello.extend_from_slice(&HELLO_MAGIC);
        let mut len_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut len_bytes, name_bytes.len() as u32);
        hello.extend_from_slice(&len_bytes);
        hello.extend_from_slice(name_bytes);
        stream.write_all(&hello).await?;

        let mut reply = [0u8; 4];
        read_all(stream, &mut reply).await?;
        if reply != ACK_MAGIC {
            return Err(Error::protocol(format!("expected 'DLCS', got {:?}", reply)));
        }
        Ok(())
    }
}

pub mod server {
    use super::*;

    /// The client identity carried by a successful hello.
    #[derive(Debug)]
    pub struct Hello {
        pub name: String,
    }

    /// Read `HandshakeHello`, validate the magic/version, and reply with
    /// `HandshakeAck`.
    pub async fn accept<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> Result<Hello> {
        let mut magic = [0u8; 4];
        read_all(stream, &mut magic).await?;
        if magic != HELLO_MAGIC {
            return Err(Error::protocol(format!(
                "expected 'DLC\\x01', got {:?}",
                magic
            )));
        }
        let mut len_bytes = [0u8; 4];
        read_all(stream, &mut len_bytes).await?;
        let name_len = LittleEndian::read_u32(&len_bytes) as usize;
        let mut name_buf = vec![0u8; name_len];
        read_all(stream, &mut name_buf).await?;
        let name = String::from_utf8_lossy(&name_buf).into_owned();

        stream.write_all(&ACK_MAGIC).await?;
        Ok(Hello { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn hello_ack_round_trips() {
        let (mut client_stream, mut server_stream) = duplex(4096);
        let server = tokio::spawn(async move { server::accept(&mut server_stream).await });
        client::run(&mut client_stream, "agent-7").await.unwrap();
        let hello = server.await.unwrap().unwrap();
        assert_eq!(hello.name, "agent-7");
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let (mut client_stream, mut server_stream) = duplex(4096);
        tokio::spawn(async move {
            client_stream.write_all(b"DLC\x00").await.unwrap();
            client_stream.write_all(&[0, 0, 0, 0]).await.unwrap();
        });
        let err = server::accept(&mut server_stream).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
