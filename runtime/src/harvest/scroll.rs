// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scroll strategy rotator.

use crate::config::PauseRange;
use crate::error::Cancelled;
use crate::pacing::Pacer;
use crate::surface::{ScrollStrategy, Surface};

/// Apply `order[index % order.len()]`. Driver errors count as `false`.
pub async fn advance<S: Surface + ?Sized>(
    surface: &mut S,
    order: &[ScrollStrategy],
    index: usize,
) -> bool {
    let Some(&strategy) = order.get(index % order.len().max(1)) else {
        return false;
    };
    match surface.advance_view(strategy).await {
        Ok(ok) => {
            tracing::debug!(%strategy, ok, "advanced view");
            ok
        }
        Err(e) => {
            tracing::warn!(%strategy, "scroll action failed: {e}");
            false
        }
    }
}

/// Which strategy to try next.
///
/// Each unproductive round moves to the next strategy. A productive round
/// rewinds to the strategy that produced it, so a working technique is
/// retried first after the next stall.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rotation {
    next: usize,
    last_used: Option<usize>,
}

impl Rotation {
    /// Index to use for this unproductive round; advances the cursor.
    pub fn take(&mut self, len: usize) -> usize {
        let index = self.next % len.max(1);
        self.last_used = Some(index);
        self.next = index + 1;
        index
    }

    /// The previous round produced new content.
    pub fn productive(&mut self) {
        if let Some(index) = self.last_used {
            self.next = index;
        }
    }

    pub fn peek(&self, len: usize) -> usize {
        self.next % len.max(1)
    }
}

/// Try every strategy once, pausing between them.
pub async fn sweep<S: Surface + ?Sized>(
    surface: &mut S,
    order: &[ScrollStrategy],
    pacer: &Pacer,
    step: PauseRange,
) -> Result<usize, Cancelled> {
    let mut applied = 0;
    for index in 0..order.len() {
        if advance(surface, order, index).await {
            applied += 1;
        }
        pacer.jitter(step).await?;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::memory::{FeedScript, MemorySurface};

    #[test]
    fn test_rotation_cycles_on_repeated_failure() {
        let mut rotation = Rotation::default();
        let picked: Vec<usize> = (0..6).map(|_| rotation.take(4)).collect();
        assert_eq!(picked, [0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_rotation_rewinds_to_productive_strategy() {
        let mut rotation = Rotation::default();
        assert_eq!(rotation.take(4), 0);
        assert_eq!(rotation.take(4), 1);
        rotation.productive();
        assert_eq!(rotation.peek(4), 1);
        assert_eq!(rotation.take(4), 1);
        assert_eq!(rotation.take(4), 2);
    }

    #[test]
    fn test_rotation_productive_before_any_scroll() {
        let mut rotation = Rotation::default();
        rotation.productive();
        assert_eq!(rotation.take(3), 0);
    }

    #[tokio::test]
    async fn test_advance_records_strategy() {
        let mut surface = MemorySurface::new(FeedScript::default());
        let order = ScrollStrategy::ALL;
        assert!(advance(&mut surface, &order, 5).await);
        assert_eq!(surface.scroll_log(), [ScrollStrategy::LastUnit]);
    }

    #[tokio::test]
    async fn test_sweep_tries_every_strategy() {
        let mut surface = MemorySurface::new(FeedScript::default());
        let applied = sweep(
            &mut surface,
            &ScrollStrategy::ALL,
            &Pacer::detached(),
            PauseRange::fixed(0),
        )
        .await
        .unwrap();
        assert_eq!(applied, 4);
        assert_eq!(surface.scroll_log(), ScrollStrategy::ALL);
    }
}
