// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Multi-topic orchestrator.
//!
//! Owns the surface for the whole run and drives one topic pass at a time.
//! After every topic, successful or not, the cumulative result is written
//! to the checkpoint. A failing topic never ends the run; only the
//! authentication probe is fatal.

use crate::checkpoint::CheckpointStore;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, TopicError};
use crate::harvest::topic::{StopReason, TopicCollector};
use crate::model::CumulativeResult;
use crate::pacing::Pacer;
use crate::progress::{Progress, ProgressEventKind, ProgressSender};
use crate::surface::{locate_first, Surface};
use serde::Serialize;
use tracing::{error, info, warn};

/// How one topic ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSummary {
    pub topic: String,
    pub collected: usize,
    pub reason: StopReason,
}

/// Everything a finished (or cancelled) run produced.
#[derive(Debug)]
pub struct RunReport {
    pub cumulative: CumulativeResult,
    pub topics: Vec<TopicSummary>,
    /// The run stopped early on operator request.
    pub cancelled: bool,
}

pub struct Orchestrator<S: Surface> {
    config: HarvestConfig,
    surface: S,
    store: CheckpointStore,
    pacer: Pacer,
    progress: Progress,
}

impl<S: Surface> Orchestrator<S> {
    /// Validate `config` and take ownership of the surface.
    pub fn new(config: HarvestConfig, surface: S, pacer: Pacer) -> Result<Self, HarvestError> {
        config.validate()?;
        let store = CheckpointStore::new(config.checkpoint.path.clone());
        Ok(Self {
            config,
            surface,
            store,
            pacer,
            progress: Progress::silent(),
        })
    }

    /// Publish progress events for this run on `tx`.
    pub fn with_progress(mut self, tx: ProgressSender, run_id: impl Into<String>) -> Self {
        self.progress = Progress::new(Some(tx), run_id);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Confirm the session is authenticated by locating an element that
    /// only renders for a signed-in user.
    pub async fn verify_session(&mut self) -> Result<(), HarvestError> {
        let home = self.config.surface.home_url.clone();
        if let Err(e) = self.surface.navigate(&home).await {
            error!(url = %home, "authentication probe could not load home page: {e:#}");
            return Err(HarvestError::Authentication(format!(
                "could not load {home}: {e:#}"
            )));
        }

        match locate_first(&self.surface, &self.config.surface.auth_probe_selectors).await {
            Some(selector) => {
                info!(%selector, "session authenticated");
                Ok(())
            }
            None => {
                error!(url = %home, "no authenticated-only element found");
                Err(HarvestError::Authentication(format!(
                    "no authenticated-only element found at {home}"
                )))
            }
        }
    }

    /// Load the previous cumulative result. Any read failure starts empty.
    pub fn load_checkpoint(&self) -> CumulativeResult {
        match self.store.load() {
            Ok(units) => {
                if !units.is_empty() {
                    info!(
                        path = %self.store.path().display(),
                        rows = units.len(),
                        "resuming from checkpoint"
                    );
                }
                CumulativeResult::seeded(units)
            }
            Err(e) => {
                warn!("checkpoint unreadable, starting empty: {e}");
                CumulativeResult::new()
            }
        }
    }

    /// Harvest `topics` in order.
    ///
    /// Returns `Err` only for the authentication probe. Cancellation ends the
    /// run after the current topic's partial result has been checkpointed.
    pub async fn run(&mut self, topics: &[String]) -> Result<RunReport, HarvestError> {
        self.verify_session().await?;

        let mut cumulative = self.load_checkpoint();
        self.progress.emit(ProgressEventKind::RunStarted {
            topics: topics.len(),
            seeded: cumulative.len(),
        });

        let mut summaries = Vec::with_capacity(topics.len());
        let mut cancelled = false;

        for (index, topic) in topics.iter().enumerate() {
            if self.pacer.is_cancelled() {
                cancelled = true;
                break;
            }
            info!(topic = %topic, index = index + 1, total = topics.len(), "starting topic");
            self.progress.emit(ProgressEventKind::TopicStarted {
                topic: topic.clone(),
            });

            let collector = TopicCollector::new(&self.config, &self.pacer);
            let result = collector
                .run(&mut self.surface, topic, &mut self.progress)
                .await;

            let summary = match result {
                Ok(outcome) => {
                    cancelled = outcome.reason == StopReason::Cancelled;
                    let summary = TopicSummary {
                        topic: outcome.topic,
                        collected: outcome.units.len(),
                        reason: outcome.reason,
                    };
                    cumulative.absorb(outcome.units);
                    summary
                }
                Err(TopicError::Cancelled) => {
                    cancelled = true;
                    TopicSummary {
                        topic: topic.clone(),
                        collected: 0,
                        reason: StopReason::Cancelled,
                    }
                }
                Err(e) => {
                    warn!(topic = %topic, "topic failed, continuing: {e}");
                    self.progress.emit(ProgressEventKind::Warning {
                        message: e.to_string(),
                    });
                    TopicSummary {
                        topic: topic.clone(),
                        collected: 0,
                        reason: StopReason::SearchFailed,
                    }
                }
            };
            self.progress.emit(ProgressEventKind::TopicFinished {
                topic: summary.topic.clone(),
                collected: summary.collected,
                reason: summary.reason,
            });
            let failed = summary.reason == StopReason::SearchFailed;
            summaries.push(summary);

            self.persist(&cumulative);

            if cancelled {
                break;
            }
            if index + 1 < topics.len() {
                let range = if failed {
                    self.config.pacing.after_topic_failure
                } else {
                    self.config.pacing.between_topics
                };
                match self.pacer.jitter(range).await {
                    Ok(waited) => info!(
                        waited_secs = waited.as_secs(),
                        next = %topics[index + 1],
                        "paused before next topic"
                    ),
                    Err(_) => {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if cancelled {
            warn!(total = cumulative.len(), "run cancelled");
        } else {
            info!(total = cumulative.len(), "run finished");
        }
        self.progress.emit(ProgressEventKind::RunFinished {
            total: cumulative.len(),
            cancelled,
        });

        Ok(RunReport {
            cumulative,
            topics: summaries,
            cancelled,
        })
    }

    fn persist(&mut self, cumulative: &CumulativeResult) {
        match self.store.save(cumulative.units()) {
            Ok(()) => {
                info!(
                    path = %self.store.path().display(),
                    total = cumulative.len(),
                    "checkpoint saved"
                );
                self.progress.emit(ProgressEventKind::CheckpointWritten {
                    total: cumulative.len(),
                });
            }
            Err(e) => {
                warn!("checkpoint write failed, keeping in-memory state: {e}");
                self.progress.emit(ProgressEventKind::Warning {
                    message: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PacingConfig, PauseRange};
    use crate::surface::memory::{FeedScript, Frame, MemorySurface};
    use std::path::Path;

    fn config(dir: &Path) -> HarvestConfig {
        let mut config = HarvestConfig::default();
        config.topics = vec!["#a".into(), "#b".into()];
        config.quota.max_per_topic = 10;
        config.quota.min_per_topic = 2;
        config.pacing = PacingConfig::immediate();
        config.checkpoint.path = dir.join("out.jsonl");
        config
    }

    fn topics() -> Vec<String> {
        vec!["#a".into(), "#b".into()]
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal_before_any_topic() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let home = config.surface.home_url.clone();
        let surface = MemorySurface::new(FeedScript::default().unauthenticated());
        let mut orchestrator = Orchestrator::new(config, surface, Pacer::detached()).unwrap();

        let err = orchestrator.run(&topics()).await.unwrap_err();
        assert!(matches!(err, HarvestError::Authentication(_)));
        assert_eq!(orchestrator.surface().navigations(), [home]);
        assert!(!dir.path().join("out.jsonl").exists());
    }

    #[tokio::test]
    async fn test_navigation_failure_does_not_touch_cumulative() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let script = FeedScript::default()
            .failing_topic(&config.surface, "#a")
            .topic(&config.surface, "#b", vec![Frame::units(["b1 #b", "b2 #b"])]);
        let mut orchestrator =
            Orchestrator::new(config, MemorySurface::new(script), Pacer::detached()).unwrap();

        let report = orchestrator.run(&topics()).await.unwrap();
        assert_eq!(report.topics[0].reason, StopReason::SearchFailed);
        assert_eq!(report.topics[0].collected, 0);
        assert_eq!(report.topics[1].collected, 2);
        assert_eq!(report.cumulative.len(), 2);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let script = FeedScript::default()
            .topic(&config.surface, "#a", vec![Frame::units(["a1", "a2"])])
            .topic(&config.surface, "#b", vec![Frame::units(["b1", "b2"])]);
        let store = CheckpointStore::new(config.checkpoint.path.clone());
        let mut orchestrator =
            Orchestrator::new(config, MemorySurface::new(script), Pacer::detached()).unwrap();

        let first = orchestrator.run(&topics()[..1]).await.unwrap();
        assert_eq!(first.cumulative.len(), 2);

        let second = orchestrator.run(&topics()[1..]).await.unwrap();
        let bodies: Vec<&str> = second.cumulative.units().iter().map(|u| u.body.as_str()).collect();
        assert_eq!(bodies, ["a1", "a2", "b1", "b2"]);
        assert_eq!(store.load().unwrap(), second.cumulative.into_units());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::write(&config.checkpoint.path, "{ truncated").unwrap();
        let script =
            FeedScript::default().topic(&config.surface, "#a", vec![Frame::units(["a1", "a2"])]);
        let mut orchestrator =
            Orchestrator::new(config, MemorySurface::new(script), Pacer::detached()).unwrap();

        let report = orchestrator.run(&topics()[..1]).await.unwrap();
        assert_eq!(report.cumulative.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.quota.min_per_topic = 50;
        let result = Orchestrator::new(config, MemorySurface::new(FeedScript::default()), Pacer::detached());
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }

    #[tokio::test]
    async fn test_progress_events_bracket_each_topic() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let script = FeedScript::default()
            .topic(&config.surface, "#a", vec![Frame::units(["a1", "a2"])])
            .topic(&config.surface, "#b", vec![Frame::units(["b1", "b2"])]);
        let (tx, mut rx) = crate::progress::channel();
        let mut orchestrator = Orchestrator::new(config, MemorySurface::new(script), Pacer::detached())
            .unwrap()
            .with_progress(tx, "run-1");
        orchestrator.run(&topics()).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event.event {
                ProgressEventKind::RoundCompleted { .. } => {}
                ProgressEventKind::RunStarted { .. } => kinds.push("run-start"),
                ProgressEventKind::TopicStarted { .. } => kinds.push("topic-start"),
                ProgressEventKind::TopicFinished { .. } => kinds.push("topic-end"),
                ProgressEventKind::CheckpointWritten { .. } => kinds.push("checkpoint"),
                ProgressEventKind::RunFinished { .. } => kinds.push("run-end"),
                _ => kinds.push("other"),
            }
        }
        assert_eq!(
            kinds,
            [
                "run-start",
                "topic-start",
                "topic-end",
                "checkpoint",
                "topic-start",
                "topic-end",
                "checkpoint",
                "run-end"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_inter_topic_pause() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.pacing.between_topics = PauseRange::secs(120, 120);
        let script = FeedScript::default()
            .topic(&config.surface, "#a", vec![Frame::units(["a1", "a2"])])
            .topic(&config.surface, "#b", vec![Frame::units(["b1", "b2"])]);
        let pacer = Pacer::detached();
        let (tx, mut rx) = crate::progress::channel();
        let mut orchestrator = Orchestrator::new(config, MemorySurface::new(script), pacer.clone())
            .unwrap()
            .with_progress(tx, "run-2");

        let topics = topics();
        let run = orchestrator.run(&topics);
        tokio::pin!(run);
        let report = loop {
            tokio::select! {
                report = &mut run => break report.unwrap(),
                event = rx.recv() => {
                    if matches!(event, Ok(ref e) if matches!(e.event, ProgressEventKind::CheckpointWritten { .. })) {
                        pacer.token().cancel();
                    }
                }
            }
        };
        assert!(report.cancelled);
        assert_eq!(report.topics.len(), 1);
        assert_eq!(report.cumulative.len(), 2);
        let saved = CheckpointStore::new(dir.path().join("out.jsonl")).load().unwrap();
        assert_eq!(saved.len(), 2);
    }
}
