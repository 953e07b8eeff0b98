// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for harvest telemetry.
//!
//! The orchestrator and topic loop emit `ProgressEvent`s through a
//! `tokio::sync::broadcast` channel to every subscriber (CLI renderer,
//! tests). When no subscriber exists, events are silently dropped.

use crate::harvest::topic::StopReason;
use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// The run passed the authentication probe and loaded its checkpoint.
    RunStarted { topics: usize, seeded: usize },
    /// A topic pass began.
    TopicStarted { topic: String },
    /// One scan/extract/decide round finished.
    RoundCompleted {
        topic: String,
        round: u32,
        new_units: usize,
        collected: usize,
    },
    /// The page showed a transient error marker.
    ErrorPage {
        topic: String,
        consecutive: u32,
        marker: String,
    },
    /// A topic pass stopped.
    TopicFinished {
        topic: String,
        collected: usize,
        reason: StopReason,
    },
    /// The cumulative result was written to disk.
    CheckpointWritten { total: usize },
    /// A non-fatal warning occurred.
    Warning { message: String },
    /// The run is over.
    RunFinished { total: usize, cancelled: bool },
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emitter bound to one run: stamps the run id and sequence number.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<ProgressSender>,
    run_id: String,
    seq: u64,
}

impl Progress {
    pub fn new(tx: Option<ProgressSender>, run_id: impl Into<String>) -> Self {
        Self {
            tx,
            run_id: run_id.into(),
            seq: 0,
        }
    }

    /// An emitter with no channel; every event is dropped.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Emit an event, ignoring send errors (no receivers listening).
    pub fn emit(&mut self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            self.seq += 1;
            let _ = sender.send(ProgressEvent {
                run_id: self.run_id.clone(),
                seq: self.seq,
                event,
            });
        }
    }
}

/// Render an event as one human-readable line.
pub fn describe(event: &ProgressEventKind) -> String {
    match event {
        ProgressEventKind::RunStarted { topics, seeded } => {
            format!("run started: {topics} topic(s), {seeded} unit(s) from checkpoint")
        }
        ProgressEventKind::TopicStarted { topic } => format!("[{topic}] searching"),
        ProgressEventKind::RoundCompleted {
            topic,
            round,
            new_units,
            collected,
        } => format!("[{topic}] round {round}: +{new_units} (total {collected})"),
        ProgressEventKind::ErrorPage {
            topic,
            consecutive,
            marker,
        } => format!("[{topic}] error page #{consecutive} ({marker:?}), backing off"),
        ProgressEventKind::TopicFinished {
            topic,
            collected,
            reason,
        } => format!("[{topic}] done: {collected} unit(s), {reason}"),
        ProgressEventKind::CheckpointWritten { total } => {
            format!("checkpoint saved ({total} unit(s))")
        }
        ProgressEventKind::Warning { message } => format!("warning: {message}"),
        ProgressEventKind::RunFinished { total, cancelled } => {
            if *cancelled {
                format!("run cancelled with {total} unit(s) saved")
            } else {
                format!("run finished: {total} unit(s)")
            }
        }
    }
}
