// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Jittered exponential backoff for unbounded retry loops.

use rand::Rng;
use std::time::Duration;

/// Retry delay generator.
///
/// The nominal delay doubles after each failure up to `max`. Each returned
/// delay is drawn uniformly from `[nominal / 2, nominal]` so that many
/// devices restarting together spread out.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Nominal (unjittered) delay for the next retry.
    pub fn nominal(&self) -> Duration {
        let factor = 1u32 << self.attempt.min(16);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before the next retry.
    pub fn next_delay<R: Rng>(&mut self, rng: &mut R) -> Duration {
        let nominal = self.nominal();
        self.attempt = self.attempt.saturating_add(1);

        let half = nominal / 2;
        let spread = (nominal - half).as_millis() as u64;
        half + Duration::from_millis(rng.gen_range(0..=spread))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_nominal_doubles_until_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let mut rng = StdRng::seed_from_u64(1);

        let nominals: Vec<_> = (0..5)
            .map(|_| {
                let n = backoff.nominal();
                backoff.next_delay(&mut rng);
                n.as_secs()
            })
            .collect();

        assert_eq!(nominals, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_delay_within_jitter_window() {
        let mut backoff = Backoff::new(Duration::from_millis(800), Duration::from_secs(60));
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..10 {
            let nominal = backoff.nominal();
            let delay = backoff.next_delay(&mut rng);
            assert!(delay >= nominal / 2 && delay <= nominal);
        }
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let mut rng = StdRng::seed_from_u64(3);
        backoff.next_delay(&mut rng);
        backoff.next_delay(&mut rng);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.nominal(), Duration::from_secs(1));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            backoff.next_delay(&mut rng);
        }
        assert_eq!(backoff.nominal(), Duration::from_secs(60));
    }
}
