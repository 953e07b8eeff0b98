// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cancellable waits.
//!
//! Every pause in a run (round pacing, error backoff, inter-topic jitter)
//! goes through [`Pacer::pause`], which races the sleep against a run-scoped
//! [`CancellationToken`]. An operator stop therefore lands within one wait
//! instead of after a multi-minute backoff.

use crate::config::PauseRange;
use crate::error::Cancelled;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Pacer {
    token: CancellationToken,
}

impl Pacer {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// A pacer that is never cancelled.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail fast if the run was stopped between waits.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn pause(&self, duration: Duration) -> Result<(), Cancelled> {
        if duration.is_zero() {
            return self.check();
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Sleep for a duration drawn from `range`. Returns the drawn duration.
    pub async fn jitter(&self, range: PauseRange) -> Result<Duration, Cancelled> {
        let duration = range.sample();
        self.pause(duration).await?;
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pause_completes() {
        let pacer = Pacer::detached();
        let start = tokio::time::Instant::now();
        pacer.pause(Duration::from_secs(600)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_long_pause() {
        let token = CancellationToken::new();
        let pacer = Pacer::new(token.clone());
        let start = tokio::time::Instant::now();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        });

        let result = pacer.pause(Duration::from_secs(600)).await;
        canceller.await.unwrap();
        assert_eq!(result, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_zero_pause_reports_cancellation() {
        let pacer = Pacer::detached();
        assert!(pacer.pause(Duration::ZERO).await.is_ok());
        pacer.token().cancel();
        assert_eq!(pacer.pause(Duration::ZERO).await, Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_returns_drawn_duration() {
        let pacer = Pacer::detached();
        let d = pacer.jitter(PauseRange::millis(100, 200)).await.unwrap();
        assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
    }
}
