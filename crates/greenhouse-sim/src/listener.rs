// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-device command listener.
//!
//! Each connection carries exactly one command and one reply.

use crate::greenhouse::Greenhouse;
use greenhouse_proto::framing::with_deadline;
use greenhouse_proto::{Command, FrameError, FramedStream, StatusSnapshot, WireMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Serve commands for the device at `index` until shutdown.
pub(crate) async fn run_device_listener(
    listener: TcpListener,
    greenhouse: Arc<Greenhouse>,
    index: usize,
    max_message_size: usize,
    io_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = greenhouse
        .status(index)
        .map(|s| s.name)
        .unwrap_or_default();
    if let Ok(addr) = listener.local_addr() {
        info!("{} listening on {}", name, addr);
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let greenhouse = greenhouse.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_request(
                                stream,
                                peer_addr,
                                &greenhouse,
                                index,
                                max_message_size,
                                io_timeout,
                            )
                            .await
                            {
                                warn!("Command from {} failed: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("{} accept error: {}", name, e),
                }
            }
            _ = shutdown.changed() => {
                debug!("{} listener shutting down", name);
                break;
            }
        }
    }
}

async fn handle_request(
    stream: TcpStream,
    peer_addr: SocketAddr,
    greenhouse: &Greenhouse,
    index: usize,
    max_message_size: usize,
    io_timeout: Duration,
) -> Result<(), FrameError> {
    let mut conn = FramedStream::new(stream, peer_addr, max_message_size);

    let frame = with_deadline(io_timeout, conn.read_frame()).await?;
    let Some(frame) = frame else {
        return Ok(());
    };

    let reply = match Command::decode(&frame) {
        Ok(command) => {
            debug!(
                "{} {} value={} from {}",
                command.verb, command.actuator, command.value, peer_addr
            );
            greenhouse
                .apply_command(index, &command)
                .unwrap_or_else(|| StatusSnapshot::text("Unknown device"))
        }
        Err(e) => StatusSnapshot::text(format!("Invalid command: {}", e)),
    };

    with_deadline(io_timeout, conn.send_message(&reply)).await?;
    let _ = conn.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_devices;
    use greenhouse_proto::{client, Feature, STATUS_UPDATED};

    async fn serve(name: &str) -> (SocketAddr, Arc<Greenhouse>, usize, watch::Sender<bool>) {
        let greenhouse = Arc::new(Greenhouse::from_specs(&default_devices()));
        let index = greenhouse.index_of(name).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        tokio::spawn(run_device_listener(
            listener,
            greenhouse.clone(),
            index,
            64 * 1024,
            Duration::from_secs(2),
            rx,
        ));
        (addr, greenhouse, index, tx)
    }

    #[tokio::test]
    async fn test_set_over_tcp() {
        let (addr, greenhouse, index, _tx) = serve("Heater").await;

        let reply = client::send_command(
            addr,
            &Command::set_actuator(Feature::Temperature, "Heater", 30.0),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        assert_eq!(reply.response_text, STATUS_UPDATED);
        let status = greenhouse.status(index).unwrap();
        assert!(status.on);
        assert_eq!(status.value, 30.0);
    }

    #[tokio::test]
    async fn test_get_over_tcp() {
        let (addr, _greenhouse, _index, _tx) = serve("Humidity").await;

        let reply = client::send_command(
            addr,
            &Command::get_sensor(Feature::Humidity),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        assert_eq!(reply.statuses.len(), 1);
        assert_eq!(reply.statuses[0].human_state, "60.0 %");
    }

    #[tokio::test]
    async fn test_garbage_gets_reply() {
        let (addr, _greenhouse, _index, _tx) = serve("Lamps").await;

        let reply = client::request_raw(addr, b"garbage", Duration::from_secs(2))
            .await
            .unwrap();
        let reply = StatusSnapshot::decode(&reply).unwrap();
        assert!(reply.response_text.starts_with("Invalid command"));
    }

    #[tokio::test]
    async fn test_silent_client_is_dropped_after_io_timeout() {
        use tokio::io::AsyncReadExt;

        let greenhouse = Arc::new(Greenhouse::from_specs(&default_devices()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_tx, rx) = watch::channel(false);
        tokio::spawn(run_device_listener(
            listener,
            greenhouse,
            0,
            64 * 1024,
            Duration::from_millis(200),
            rx,
        ));

        let mut silent = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 8];
        let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
