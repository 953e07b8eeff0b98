// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvested records and the cumulative result sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Engagement signals attached to a unit, in display order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    /// Approval signal (likes).
    pub primary: u64,
    /// Amplification signal (reposts).
    pub secondary: u64,
    /// Discussion signal (replies).
    pub tertiary: u64,
}

/// One harvested post.
///
/// Built once by the extractor and never mutated afterwards. Serializes as a
/// flat row so the checkpoint stays tabular.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Display name of the author; empty when unresolved.
    #[serde(default)]
    pub author: String,
    /// Publication time; `None` when unresolved or unparseable.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Post text. Never blank.
    pub body: String,
    #[serde(flatten)]
    pub engagement: EngagementCounts,
    /// `#word` tokens found in the body.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// `@word` tokens found in the body.
    #[serde(default)]
    pub mentions: BTreeSet<String>,
}

/// Ordered sequence of units across every topic processed so far.
///
/// Only ever grows by appending a finished topic's units, so every persisted
/// snapshot is a prefix of the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CumulativeResult {
    units: Vec<ContentUnit>,
}

impl CumulativeResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a previously checkpointed sequence.
    pub fn seeded(units: Vec<ContentUnit>) -> Self {
        Self { units }
    }

    /// Absorb one topic's collected units at the end.
    pub fn absorb(&mut self, units: Vec<ContentUnit>) {
        self.units.extend(units);
    }

    pub fn units(&self) -> &[ContentUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn into_units(self) -> Vec<ContentUnit> {
        self.units
    }
}
