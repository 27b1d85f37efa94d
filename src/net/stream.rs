//! Framing of DNS messages on stream transports.
//!
//! On TCP, each message is preceded by its length as a 16 bit unsigned
//! integer in network byte order as described in [RFC 1035, section
//! 4.2.2].
//!
//! [RFC 1035, section 4.2.2]: https://tools.ietf.org/html/rfc1035#section-4.2.2

use std::io;
use std::vec::Vec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads the next message from a stream.
///
/// Returns `Ok(None)` if the stream was closed cleanly before the first
/// octet of a new message. A stream closed in the middle of a message is
/// an error.
pub async fn read_message<R>(sock: &mut R) -> Result<Option<Vec<u8>>, io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 2];
    match sock.read(&mut len[..1]).await? {
        0 => return Ok(None),
        _ => {
            sock.read_exact(&mut len[1..]).await?;
        }
    }
    let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len))];
    sock.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Writes a message to a stream.
pub async fn write_message<W>(sock: &mut W, message: &[u8]) -> Result<(), io::Error>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(message.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "message too long")
    })?;
    let mut buf = Vec::with_capacity(message.len() + 2);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(message);
    sock.write_all(&buf).await?;
    sock.flush().await
}

//============ Testing =======================================================
