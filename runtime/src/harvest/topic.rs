// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Topic collection loop.
//!
//! One topic pass is a small state machine:
//!
//! ```text
//! Searching ─▶ Scanning ─▶ ExtractingNew ─▶ Deciding ─┬─▶ Stopped
//!                 ▲  │ error page                     │
//!                 │  └── back off, refresh ──┐        │
//!                 └──────────────────────────┴────────┘ pause / scroll
//! ```
//!
//! Stopping conditions, first match wins:
//!
//! 1. `collected` reaches the max quota.
//! 2. The search step fails (returned as [`TopicError::Navigation`]).
//! 3. Consecutive error pages exceed their ceiling (partial results kept).
//! 4. Consecutive unproductive rounds exceed their ceiling: stop if the min
//!    quota is met, otherwise run one final sweep over every strategy, read
//!    once more, and stop regardless.
//!
//! A round is productive only if the novelty filter accepted at least one
//! fingerprint. Units that fail extraction never count.

use crate::config::HarvestConfig;
use crate::error::TopicError;
use crate::harvest::extract::extract;
use crate::harvest::monitor::{ErrorMonitor, PageHealth, Verdict};
use crate::harvest::novelty::{Fingerprint, SeenSet};
use crate::harvest::scroll::{self, Rotation};
use crate::model::ContentUnit;
use crate::pacing::Pacer;
use crate::progress::{Progress, ProgressEventKind};
use crate::surface::{locate_first, Surface};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Why a topic pass stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QuotaReached,
    SearchFailed,
    ErrorCeiling,
    /// Feed stalled after the min quota was met.
    MinimumSatisfied,
    /// Feed stalled under the min quota, even after the final sweep.
    Exhausted,
    Cancelled,
}

impl StopReason {
    /// Whether the pass ended on one of its success paths.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::QuotaReached | Self::MinimumSatisfied)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaReached => write!(f, "quota reached"),
            Self::SearchFailed => write!(f, "search failed"),
            Self::ErrorCeiling => write!(f, "too many error pages"),
            Self::MinimumSatisfied => write!(f, "feed stalled, minimum met"),
            Self::Exhausted => write!(f, "feed exhausted under quota"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Mutable state of one topic pass. Dropped when the pass ends, except for
/// `collected`, which moves into the outcome.
#[derive(Debug, Default)]
pub struct TopicRunState {
    pub collected: Vec<ContentUnit>,
    pub seen: SeenSet,
    pub consecutive_no_new: u32,
    pub consecutive_error_pages: u32,
    pub rounds: u32,
    rotation: Rotation,
}

/// Result of a finished topic pass.
#[derive(Debug)]
pub struct TopicOutcome {
    pub topic: String,
    pub units: Vec<ContentUnit>,
    pub reason: StopReason,
    pub rounds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Searching,
    Scanning,
    ExtractingNew,
    Deciding { new_units: usize },
    FinalSweep,
    Stopped(StopReason),
}

/// Runs topic passes against a surface.
pub struct TopicCollector<'a> {
    config: &'a HarvestConfig,
    pacer: &'a Pacer,
}

impl<'a> TopicCollector<'a> {
    pub fn new(config: &'a HarvestConfig, pacer: &'a Pacer) -> Self {
        Self { config, pacer }
    }

    /// Run one topic pass to a stopping condition.
    ///
    /// Cancellation is not an error here: the pass stops with
    /// [`StopReason::Cancelled`] and keeps what it collected.
    pub async fn run<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        topic: &str,
        progress: &mut Progress,
    ) -> Result<TopicOutcome, TopicError> {
        let mut state = TopicRunState::default();
        let reason = match self.drive(surface, topic, &mut state, progress).await {
            Ok(reason) => reason,
            Err(TopicError::Cancelled) => {
                warn!(topic, collected = state.collected.len(), "topic pass cancelled");
                StopReason::Cancelled
            }
            Err(e) => return Err(e),
        };

        info!(
            topic,
            collected = state.collected.len(),
            rounds = state.rounds,
            %reason,
            "topic pass finished"
        );
        Ok(TopicOutcome {
            topic: topic.to_string(),
            units: state.collected,
            reason,
            rounds: state.rounds,
        })
    }

    async fn drive<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        topic: &str,
        state: &mut TopicRunState,
        progress: &mut Progress,
    ) -> Result<StopReason, TopicError> {
        let quota = self.config.quota;
        let limits = self.config.limits;
        let pacing = &self.config.pacing;
        let order = &self.config.scroll.order;
        let mut monitor = ErrorMonitor::new(
            self.config.monitor.error_markers.clone(),
            limits.error_page_limit,
            pacing.error_backoff,
        );

        let mut phase = Phase::Searching;
        loop {
            phase = match phase {
                Phase::Searching => {
                    self.search(surface, topic).await?;
                    Phase::Scanning
                }

                Phase::Scanning => {
                    self.pacer.check()?;
                    let health = match surface.page_text().await {
                        Ok(text) => monitor.classify(&text),
                        Err(e) => {
                            debug!(topic, "page text unavailable: {e}");
                            PageHealth::Healthy
                        }
                    };
                    let verdict = monitor.observe(&health);
                    state.consecutive_error_pages = monitor.consecutive();
                    match (verdict, health) {
                        (Verdict::Proceed, _) => Phase::ExtractingNew,
                        (Verdict::BackOff { consecutive, pause }, PageHealth::TransientError { marker }) => {
                            warn!(
                                topic,
                                consecutive,
                                %marker,
                                pause_secs = pause.as_secs(),
                                "error page, backing off"
                            );
                            progress.emit(ProgressEventKind::ErrorPage {
                                topic: topic.to_string(),
                                consecutive,
                                marker,
                            });
                            self.pacer.pause(pause).await?;
                            if let Err(e) = surface.refresh().await {
                                warn!(topic, "refresh after backoff failed: {e}");
                            }
                            Phase::Scanning
                        }
                        (Verdict::Abort { consecutive }, _) => {
                            error!(
                                topic,
                                consecutive,
                                collected = state.collected.len(),
                                "persistent error page, aborting topic"
                            );
                            Phase::Stopped(StopReason::ErrorCeiling)
                        }
                        (Verdict::BackOff { .. }, PageHealth::Healthy) => Phase::ExtractingNew,
                    }
                }

                Phase::ExtractingNew => {
                    let new_units = self.extract_new(surface, state).await;
                    Phase::Deciding { new_units }
                }

                Phase::Deciding { new_units } => {
                    state.rounds += 1;
                    debug!(
                        topic,
                        round = state.rounds,
                        new_units,
                        collected = state.collected.len(),
                        "round complete"
                    );
                    progress.emit(ProgressEventKind::RoundCompleted {
                        topic: topic.to_string(),
                        round: state.rounds,
                        new_units,
                        collected: state.collected.len(),
                    });

                    if state.collected.len() >= quota.max_per_topic {
                        Phase::Stopped(StopReason::QuotaReached)
                    } else if new_units > 0 {
                        state.consecutive_no_new = 0;
                        state.rotation.productive();
                        self.pacer.jitter(pacing.after_new_content).await?;
                        Phase::Scanning
                    } else {
                        state.consecutive_no_new += 1;
                        if state.consecutive_no_new > limits.scroll_retry_limit {
                            if state.collected.len() >= quota.min_per_topic {
                                info!(
                                    topic,
                                    collected = state.collected.len(),
                                    min = quota.min_per_topic,
                                    "feed stalled with minimum reached"
                                );
                                Phase::Stopped(StopReason::MinimumSatisfied)
                            } else {
                                Phase::FinalSweep
                            }
                        } else {
                            let index = state.rotation.take(order.len());
                            scroll::advance(surface, order, index).await;
                            self.pacer.jitter(pacing.after_scroll).await?;
                            Phase::Scanning
                        }
                    }
                }

                Phase::FinalSweep => {
                    warn!(
                        topic,
                        collected = state.collected.len(),
                        min = quota.min_per_topic,
                        "feed stalled under minimum, final sweep"
                    );
                    self.pacer.jitter(pacing.before_final_sweep).await?;
                    scroll::sweep(surface, order, self.pacer, pacing.sweep_step).await?;

                    let healthy = match surface.page_text().await {
                        Ok(text) => monitor.classify(&text) == PageHealth::Healthy,
                        Err(_) => true,
                    };
                    let new_units = if healthy {
                        self.extract_new(surface, state).await
                    } else {
                        0
                    };
                    state.rounds += 1;
                    progress.emit(ProgressEventKind::RoundCompleted {
                        topic: topic.to_string(),
                        round: state.rounds,
                        new_units,
                        collected: state.collected.len(),
                    });

                    if state.collected.len() >= quota.max_per_topic {
                        Phase::Stopped(StopReason::QuotaReached)
                    } else if state.collected.len() >= quota.min_per_topic {
                        Phase::Stopped(StopReason::MinimumSatisfied)
                    } else {
                        Phase::Stopped(StopReason::Exhausted)
                    }
                }

                Phase::Stopped(reason) => return Ok(reason),
            };
        }
    }

    /// Navigate to the topic's search view and wait for it to render.
    async fn search<S: Surface + ?Sized>(&self, surface: &mut S, topic: &str) -> Result<(), TopicError> {
        let url = self.config.surface.search_url_for(topic);
        info!(topic, %url, "searching topic");

        surface
            .navigate(&url)
            .await
            .map_err(|e| TopicError::Navigation {
                topic: topic.to_string(),
                reason: format!("{e:#}"),
            })?;

        let ready = &self.config.surface.search_ready_selectors;
        if !ready.is_empty() && locate_first(surface, ready).await.is_none() {
            return Err(TopicError::Navigation {
                topic: topic.to_string(),
                reason: "search results did not render".into(),
            });
        }
        Ok(())
    }

    /// Run the extractor and novelty filter over the rendered units.
    ///
    /// Returns how many units were recorded. Never pushes past the max quota.
    async fn extract_new<S: Surface + ?Sized>(&self, surface: &S, state: &mut TopicRunState) -> usize {
        let units = match surface.rendered_units().await {
            Ok(units) => units,
            Err(e) => {
                warn!("reading rendered units failed: {e}");
                return 0;
            }
        };

        let max = self.config.quota.max_per_topic;
        let width = self.config.novelty.fingerprint_width;
        let mut recorded = 0;
        for unit in &units {
            if state.collected.len() >= max {
                break;
            }
            let Some(content) = extract(unit, &self.config.locators).await else {
                continue;
            };
            let fingerprint = Fingerprint::of(&content.body, width);
            if !state.seen.is_novel(&fingerprint) {
                continue;
            }
            state.seen.record(fingerprint);
            state.collected.push(content);
            recorded += 1;
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PacingConfig, PauseRange};
    use crate::surface::memory::{FeedScript, Frame, MemorySurface, UnitRecord};
    use crate::surface::ScrollStrategy;

    fn config(max: usize, min: usize) -> HarvestConfig {
        let mut config = HarvestConfig::default();
        config.topics = vec!["#a".into()];
        config.quota.max_per_topic = max;
        config.quota.min_per_topic = min;
        config.pacing = PacingConfig::immediate();
        config
    }

    fn bodies(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("{prefix} post number {i}")).collect()
    }

    async fn run_topic(config: &HarvestConfig, script: FeedScript) -> (TopicOutcome, MemorySurface) {
        let pacer = Pacer::detached();
        let mut surface = MemorySurface::new(script);
        let outcome = TopicCollector::new(config, &pacer)
            .run(&mut surface, "#a", &mut Progress::silent())
            .await
            .unwrap();
        (outcome, surface)
    }

    #[tokio::test]
    async fn test_stops_exactly_at_quota() {
        let config = config(10, 5);
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![
                Frame::units(bodies("a", 0..4)),
                Frame::units(bodies("a", 2..8)),
                Frame::units(bodies("a", 6..12)),
            ],
        );
        let (outcome, _) = run_topic(&config, script).await;
        assert_eq!(outcome.reason, StopReason::QuotaReached);
        assert_eq!(outcome.units.len(), 10);
        assert_eq!(outcome.units[9].body, "a post number 9");
    }

    #[tokio::test]
    async fn test_overlapping_frames_are_deduplicated() {
        let config = config(20, 5);
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![
                Frame::units(["first post", "second post"]),
                Frame::units(["second   post", "third post"]),
            ],
        );
        let (outcome, _) = run_topic(&config, script).await;
        let got: Vec<&str> = outcome.units.iter().map(|u| u.body.as_str()).collect();
        assert_eq!(got, ["first post", "second post", "third post"]);
        assert_eq!(outcome.reason, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn test_stall_with_minimum_met() {
        let config = config(10, 5);
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![Frame::units(bodies("a", 0..3)), Frame::units(bodies("a", 3..7))],
        );
        let (outcome, surface) = run_topic(&config, script).await;
        assert_eq!(outcome.reason, StopReason::MinimumSatisfied);
        assert_eq!(outcome.units.len(), 7);
        // One scroll to reach frame 2, then the retry ceiling (6) of scrolls
        // before the seventh unproductive round stops the pass.
        assert_eq!(surface.scroll_log().len(), 1 + 6);
    }

    #[tokio::test]
    async fn test_under_minimum_runs_final_sweep() {
        let config = config(10, 5);
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![Frame::units(bodies("a", 0..2))],
        );
        let (outcome, surface) = run_topic(&config, script).await;
        assert_eq!(outcome.reason, StopReason::Exhausted);
        assert_eq!(outcome.units.len(), 2);
        let log = surface.scroll_log();
        assert_eq!(log.len(), 6 + ScrollStrategy::ALL.len());
        assert_eq!(&log[6..], ScrollStrategy::ALL);
    }

    #[tokio::test]
    async fn test_final_sweep_can_still_collect() {
        let mut config = config(10, 5);
        config.limits.scroll_retry_limit = 1;
        let script = FeedScript::default()
            .topic(
                &config.surface,
                "#a",
                vec![Frame::units(bodies("a", 0..2)), Frame::units(bodies("a", 2..7))],
            )
            .stuck(ScrollStrategy::PixelStep);
        let (outcome, _) = run_topic(&config, script).await;
        assert_eq!(outcome.units.len(), 7);
        assert_eq!(outcome.reason, StopReason::MinimumSatisfied);
    }

    #[tokio::test]
    async fn test_rotation_moves_past_stuck_strategy() {
        let config = config(4, 1);
        let script = FeedScript::default()
            .topic(
                &config.surface,
                "#a",
                vec![Frame::units(["one"]), Frame::units(["two"]), Frame::units(["three", "four"])],
            )
            .stuck(ScrollStrategy::PixelStep);
        let (outcome, surface) = run_topic(&config, script).await;
        assert_eq!(outcome.reason, StopReason::QuotaReached);
        assert_eq!(
            surface.scroll_log(),
            [
                ScrollStrategy::PixelStep,
                ScrollStrategy::LastUnit,
                ScrollStrategy::LastUnit,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_pages_back_off_then_recover() {
        let config = config(3, 1);
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![
                Frame::error("Something went wrong. Try reloading."),
                Frame::error("Something went wrong. Try reloading."),
                Frame::units(["one", "two", "three"]),
            ],
        );
        let (outcome, surface) = run_topic(&config, script).await;
        assert_eq!(outcome.reason, StopReason::QuotaReached);
        assert_eq!(surface.refreshes(), 2);
        assert!(surface.scroll_log().is_empty());
    }

    #[tokio::test]
    async fn test_error_ceiling_keeps_partial_results() {
        let config = config(10, 5);
        let mut frames = vec![Frame::units(["one", "two"])];
        frames.extend((0..5).map(|_| Frame::error("Something went wrong")));
        let script = FeedScript::default().topic(&config.surface, "#a", frames);
        let (outcome, surface) = run_topic(&config, script).await;
        assert_eq!(outcome.reason, StopReason::ErrorCeiling);
        assert_eq!(outcome.units.len(), 2);
        assert_eq!(surface.refreshes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_backoff_is_long_pause() {
        let mut config = config(1, 1);
        config.pacing.error_backoff = PauseRange::secs(600, 600);
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![Frame::error("Something went wrong"), Frame::units(["one"])],
        );
        let start = tokio::time::Instant::now();
        let (outcome, _) = run_topic(&config, script).await;
        assert_eq!(outcome.reason, StopReason::QuotaReached);
        assert!(start.elapsed() >= std::time::Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_unresolvable_units_do_not_count_as_new() {
        let config = config(10, 0);
        let blank = UnitRecord {
            body: Some("   ".into()),
            primary: Some("5".into()),
            ..Default::default()
        };
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![Frame::Units {
                units: vec![blank.clone(), blank],
            }],
        );
        let (outcome, surface) = run_topic(&config, script).await;
        assert!(outcome.units.is_empty());
        assert_eq!(outcome.reason, StopReason::MinimumSatisfied);
        assert_eq!(surface.scroll_log().len(), 6);
    }

    #[tokio::test]
    async fn test_search_failure_is_navigation_error() {
        let config = config(10, 5);
        let script = FeedScript::default().failing_topic(&config.surface, "#a");
        let pacer = Pacer::detached();
        let mut surface = MemorySurface::new(script);
        let err = TopicCollector::new(&config, &pacer)
            .run(&mut surface, "#a", &mut Progress::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, TopicError::Navigation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pass_keeps_units() {
        let mut config = config(10, 5);
        config.pacing.after_new_content = PauseRange::secs(1, 1);
        config.pacing.after_scroll = PauseRange::secs(1, 1);
        let script = FeedScript::default().topic(
            &config.surface,
            "#a",
            vec![Frame::units(["one", "two"])],
        );
        let pacer = Pacer::detached();
        let mut surface = MemorySurface::new(script);
        let (tx, mut rx) = crate::progress::channel();
        let mut progress = Progress::new(Some(tx), "t");

        let collector = TopicCollector::new(&config, &pacer);
        let run = collector.run(&mut surface, "#a", &mut progress);
        tokio::pin!(run);
        // Cancel as soon as the first round has been reported.
        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome.unwrap(),
                event = rx.recv() => {
                    if matches!(event, Ok(ref e) if matches!(e.event, ProgressEventKind::RoundCompleted { .. })) {
                        pacer.token().cancel();
                    }
                }
            }
        };
        assert_eq!(outcome.reason, StopReason::Cancelled);
        assert_eq!(outcome.units.len(), 2);
    }
}
