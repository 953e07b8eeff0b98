// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the harvest engine.
//!
//! Per-field resolution failures never surface as errors (they are `Option`
//! values inside the extractor), and per-round surface failures are absorbed
//! by the topic loop. What remains here is what crosses a boundary.

use std::path::PathBuf;

/// Run-level failures surfaced by the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    /// The post-bootstrap probe did not find an authenticated-only element.
    #[error("Authentication check failed: {0}")]
    Authentication(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Surface error: {0}")]
    Surface(#[from] anyhow::Error),
}

/// Topic-level failures, caught by the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum TopicError {
    /// Searching for the topic failed before any unit was read.
    #[error("Navigation failed for {topic}: {reason}")]
    Navigation { topic: String, reason: String },

    #[error("Topic pass cancelled")]
    Cancelled,
}

/// Checkpoint persistence failures.
#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Failed to encode checkpoint row: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raised by a pacing wait when the run-scoped token fires.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait interrupted by cancellation")]
pub struct Cancelled;

impl From<Cancelled> for TopicError {
    fn from(_: Cancelled) -> Self {
        TopicError::Cancelled
    }
}

impl From<Cancelled> for HarvestError {
    fn from(_: Cancelled) -> Self {
        HarvestError::Cancelled
    }
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;
