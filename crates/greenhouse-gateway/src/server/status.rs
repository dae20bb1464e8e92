// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Status cache and the ingest endpoint that feeds it.

use greenhouse_proto::framing::with_deadline;
use greenhouse_proto::{FrameError, FramedStream, StatusSnapshot};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{debug, info, warn};

/// Most recent status snapshot.
///
/// Readers get an `Arc` to a complete snapshot; a replacement swaps the
/// pointer, so a reader never sees entries from two different snapshots.
#[derive(Debug, Default)]
pub struct StatusCache {
    current: RwLock<Arc<StatusSnapshot>>,
    version: AtomicU64,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot. Returns the new version.
    pub async fn replace(&self, snapshot: StatusSnapshot) -> u64 {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.current.write().await;
        *guard = snapshot;
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current snapshot.
    pub async fn current(&self) -> Arc<StatusSnapshot> {
        self.current.read().await.clone()
    }

    /// Number of replacements so far (0 = never fed).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Status ingest settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IngestLimits {
    pub max_message_size: usize,
    /// Deadline for each snapshot read, header included.
    pub read_timeout: Duration,
}

/// Accept status pushes until shutdown.
///
/// Each reporter connection holds a permit from `permits`.
pub(crate) async fn run_status_listener(
    listener: TcpListener,
    cache: Arc<StatusCache>,
    permits: Arc<Semaphore>,
    limits: IngestLimits,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Status ingest listening on {}", addr);
    }

    loop {
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };

        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let cache = cache.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ingest(stream, peer_addr, &cache, limits).await {
                                warn!("Status push from {} failed: {}", peer_addr, e);
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => warn!("Status accept error: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Status listener shutting down");
}

/// Read snapshots from one reporter connection until it closes.
async fn ingest(
    stream: TcpStream,
    peer_addr: SocketAddr,
    cache: &StatusCache,
    limits: IngestLimits,
) -> Result<(), FrameError> {
    let mut conn = FramedStream::new(stream, peer_addr, limits.max_message_size);

    while let Some(snapshot) =
        with_deadline(limits.read_timeout, conn.read_message::<StatusSnapshot>()).await?
    {
        let entries = snapshot.statuses.len();
        let version = cache.replace(snapshot).await;
        debug!(
            "Status snapshot v{} from {} ({} entries)",
            version, peer_addr, entries
        );
    }

    Ok(())
}
