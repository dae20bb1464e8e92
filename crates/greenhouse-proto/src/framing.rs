// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed framing for TCP connections.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use crate::protocol::{ProtocolError, WireMessage};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Framing and transport errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Empty frame")]
    Empty,

    #[error("Frame too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("Connection closed before a reply was received")]
    Closed,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl FrameError {
    /// True for errors caused by the transport rather than message content.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed | Self::Timeout(_))
    }
}

/// Run `fut` with a deadline, mapping expiry to [`FrameError::Timeout`].
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, FrameError>
where
    F: std::future::Future<Output = Result<T, FrameError>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| FrameError::Timeout(deadline))?
}

/// A TCP stream carrying length-prefixed frames.
pub struct FramedStream {
    stream: TcpStream,
    peer_addr: SocketAddr,
    max_frame_size: usize,
    read_buffer: Vec<u8>,
}

impl FramedStream {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, max_frame_size: usize) -> Self {
        Self {
            stream,
            peer_addr,
            max_frame_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Connect to `addr` within `deadline`.
    pub async fn connect(
        addr: SocketAddr,
        max_frame_size: usize,
        deadline: Duration,
    ) -> Result<Self, FrameError> {
        let stream = with_deadline(deadline, async {
            TcpStream::connect(addr).await.map_err(FrameError::from)
        })
        .await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, addr, max_frame_size))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one raw frame.
    ///
    /// Returns `Ok(None)` if the peer closed the connection between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Err(FrameError::Empty);
        }
        if len > self.max_frame_size {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.stream.read_exact(&mut self.read_buffer).await?;

        Ok(Some(self.read_buffer.clone()))
    }

    /// Write one raw frame and flush.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.is_empty() {
            return Err(FrameError::Empty);
        }
        if payload.len() > self.max_frame_size {
            return Err(FrameError::TooLarge {
                len: payload.len(),
                max: self.max_frame_size,
            });
        }

        let len = payload.len() as u32;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read and decode one message.
    pub async fn read_message<T: WireMessage>(&mut self) -> Result<Option<T>, FrameError> {
        match self.read_frame().await? {
            Some(frame) => Ok(Some(T::decode(&frame)?)),
            None => Ok(None),
        }
    }

    /// Encode and send one message.
    pub async fn send_message<T: WireMessage>(&mut self, msg: &T) -> Result<(), FrameError> {
        let bytes = msg.encode()?;
        self.write_frame(&bytes).await
    }

    /// Close the write half.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.stream.shutdown().await.map_err(FrameError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, Feature};
    use tokio::net::TcpListener;

    async fn pair(max: usize) -> (FramedStream, FramedStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = FramedStream::connect(addr, max, Duration::from_secs(2));
        let (accepted, client) = tokio::join!(listener.accept(), client);
        let (stream, peer) = accepted.unwrap();
        (client.unwrap(), FramedStream::new(stream, peer, max))
    }

    #[tokio::test]
    async fn test_message_over_socket() {
        let (mut client, mut server) = pair(1024).await;

        let cmd = Command::get_sensor(Feature::Humidity);
        client.send_message(&cmd).await.unwrap();

        let received: Command = server.read_message().await.unwrap().unwrap();
        assert_eq!(received, cmd);
    }

    #[tokio::test]
    async fn test_graceful_close_returns_none() {
        let (mut client, mut server) = pair(1024).await;
        client.shutdown().await.unwrap();
        assert!(server.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = pair(16).await;

        // Write the header by hand so the sender-side check is bypassed.
        client.stream.write_all(&1000u32.to_be_bytes()).await.unwrap();

        let err = server.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { len: 1000, max: 16 }));
    }

    #[tokio::test]
    async fn test_write_rejects_oversized_payload() {
        let (mut client, _server) = pair(4).await;
        let err = client.write_frame(b"too long").await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let err = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, FrameError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, FrameError::Timeout(_)));
        assert!(err.is_transport());
    }
}
