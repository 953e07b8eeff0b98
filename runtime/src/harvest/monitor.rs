// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error/backoff monitor.
//!
//! The host signals rate limiting with a coarse error page and no retry-after
//! hint. The monitor classifies page text against known markers and turns
//! consecutive error pages into a verdict: back off for a fixed long pause,
//! or give up on the topic once the ceiling is exceeded.

use crate::config::PauseRange;
use std::time::Duration;

/// Classification of one page snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageHealth {
    Healthy,
    /// The page shows `marker`.
    TransientError { marker: String },
}

/// What the topic loop should do after observing a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    /// Sleep, refresh, and re-read without spending a scroll attempt.
    BackOff { consecutive: u32, pause: Duration },
    /// Ceiling exceeded; abort the topic and keep partial results.
    Abort { consecutive: u32 },
}

/// Scan page text for the first matching transient-error marker.
pub fn classify(page_text: &str, markers: &[String]) -> PageHealth {
    markers
        .iter()
        .find(|m| !m.is_empty() && page_text.contains(m.as_str()))
        .map(|m| PageHealth::TransientError { marker: m.clone() })
        .unwrap_or(PageHealth::Healthy)
}

/// Tracks consecutive error pages within one topic pass.
#[derive(Debug, Clone)]
pub struct ErrorMonitor {
    markers: Vec<String>,
    ceiling: u32,
    backoff: PauseRange,
    consecutive: u32,
}

impl ErrorMonitor {
    pub fn new(markers: Vec<String>, ceiling: u32, backoff: PauseRange) -> Self {
        Self {
            markers,
            ceiling,
            backoff,
            consecutive: 0,
        }
    }

    pub fn classify(&self, page_text: &str) -> PageHealth {
        classify(page_text, &self.markers)
    }

    /// Fold one observation into the counter and decide.
    ///
    /// A healthy page resets the streak.
    pub fn observe(&mut self, health: &PageHealth) -> Verdict {
        match health {
            PageHealth::Healthy => {
                self.consecutive = 0;
                Verdict::Proceed
            }
            PageHealth::TransientError { .. } => {
                self.consecutive += 1;
                if self.consecutive > self.ceiling {
                    Verdict::Abort {
                        consecutive: self.consecutive,
                    }
                } else {
                    Verdict::BackOff {
                        consecutive: self.consecutive,
                        pause: self.backoff.sample(),
                    }
                }
            }
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
