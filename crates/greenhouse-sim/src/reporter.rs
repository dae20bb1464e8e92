// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic status push to the gateway.

use crate::backoff::Backoff;
use crate::greenhouse::Greenhouse;
use greenhouse_proto::client;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Reporter timing.
#[derive(Debug, Clone, Copy)]
pub struct ReportSchedule {
    pub interval: Duration,
    pub retry: Duration,
    pub io_timeout: Duration,
}

/// Push a full snapshot every `interval`; after a failure retry with
/// backoff starting at `retry` until a push succeeds.
pub(crate) async fn run_reporter(
    greenhouse: Arc<Greenhouse>,
    gateway: SocketAddr,
    schedule: ReportSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();
    let mut backoff = Backoff::new(schedule.retry, schedule.interval.max(schedule.retry) * 4);
    let mut delay = schedule.interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                debug!("Reporter shutting down");
                break;
            }
        }

        let snapshot = greenhouse.snapshot();
        match client::push_snapshot(gateway, &snapshot, schedule.io_timeout).await {
            Ok(()) => {
                debug!("Pushed {} statuses to {}", snapshot.statuses.len(), gateway);
                backoff.reset();
                delay = schedule.interval;
            }
            Err(e) => {
                delay = backoff.next_delay(&mut rng);
                warn!(
                    "Status push to {} failed: {} (retry in {:?})",
                    gateway, e, delay
                );
            }
        }
    }
}
