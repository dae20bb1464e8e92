// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot request helpers.
//!
//! Every helper opens a fresh connection, exchanges a single message (and
//! at most one reply) and closes it. The whole exchange is bounded by the
//! supplied deadline.

use crate::framing::{with_deadline, FrameError, FramedStream};
use crate::protocol::{Command, StatusSnapshot, WireMessage};
use crate::DEFAULT_MAX_FRAME_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// Send a raw frame and return the raw reply frame.
pub async fn request_raw(
    addr: SocketAddr,
    frame: &[u8],
    deadline: Duration,
) -> Result<Vec<u8>, FrameError> {
    with_deadline(deadline, async {
        let mut stream = FramedStream::connect(addr, DEFAULT_MAX_FRAME_SIZE, deadline).await?;
        stream.write_frame(frame).await?;
        let reply = stream.read_frame().await?.ok_or(FrameError::Closed)?;
        let _ = stream.shutdown().await;
        Ok(reply)
    })
    .await
}

/// Send a command and decode the reply.
pub async fn send_command(
    addr: SocketAddr,
    command: &Command,
    deadline: Duration,
) -> Result<StatusSnapshot, FrameError> {
    let reply = request_raw(addr, &command.encode()?, deadline).await?;
    Ok(StatusSnapshot::decode(&reply)?)
}

/// Push a snapshot without waiting for a reply.
pub async fn push_snapshot(
    addr: SocketAddr,
    snapshot: &StatusSnapshot,
    deadline: Duration,
) -> Result<(), FrameError> {
    with_deadline(deadline, async {
        let mut stream = FramedStream::connect(addr, DEFAULT_MAX_FRAME_SIZE, deadline).await?;
        stream.send_message(snapshot).await?;
        stream.shutdown().await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Feature;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_command_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let mut conn = FramedStream::new(stream, peer, 1024);
            let cmd: Command = conn.read_message().await.unwrap().unwrap();
            let reply = StatusSnapshot::text(format!("got {}", cmd.verb));
            conn.send_message(&reply).await.unwrap();
        });

        let reply = send_command(
            addr,
            &Command::get_sensor(Feature::Light),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(reply.response_text, "got GET");
    }

    #[tokio::test]
    async fn test_peer_closes_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let mut conn = FramedStream::new(stream, peer, 1024);
            let _ = conn.read_frame().await;
        });

        let err = request_raw(addr, b"{}", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Closed));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = request_raw(addr, b"{}", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
