//! Transport module - the byte streams a host runs over.
//!
//! A host needs one reader and one writer. Provides:
//! - process stdin/stdout ([`stdio`])
//! - any duplex stream split into halves ([`split_stream`])

mod stdio;

pub use stdio::{stdio, Stdio};

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

/// Split a duplex stream (socket, pipe, `tokio::io::duplex`) into halves.
pub fn split_stream<S>(stream: S) -> (ReadHalf<S>, WriteHalf<S>)
where
    S: AsyncRead + AsyncWrite,
{
    tokio::io::split(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_split_stream_halves_are_independent() {
        let (near, far) = tokio::io::duplex(64);
        let (mut near_read, mut near_write) = split_stream(near);
        let (mut far_read, mut far_write) = split_stream(far);

        near_write.write_all(b"ping").await.unwrap();
        far_write.write_all(b"pong").await.unwrap();

        let mut buf = [0u8; 4];
        far_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        near_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
