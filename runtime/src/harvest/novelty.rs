// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Novelty filter: duplicate suppression within one topic pass.
//!
//! A fingerprint is the whitespace-normalized body truncated to a fixed
//! number of characters. Two distinct posts sharing that prefix collide and
//! the later one is dropped; that is never an error. Fingerprints are not
//! persisted and say nothing about duplicates across topics.

use std::collections::HashSet;
use std::fmt;

/// Short derived key for one unit's body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Normalize whitespace in `body` and keep the first `width` characters.
    pub fn of(body: &str, width: usize) -> Self {
        let normalized = body.split_whitespace().collect::<Vec<_>>().join(" ");
        Self(normalized.chars().take(width).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprints recorded during one topic pass. Only ever grows.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<Fingerprint>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `fingerprint` has not been recorded in this pass.
    pub fn is_novel(&self, fingerprint: &Fingerprint) -> bool {
        !fingerprint.is_empty() && !self.seen.contains(fingerprint)
    }

    /// Record `fingerprint`. Returns `false` if it was already present.
    pub fn record(&mut self, fingerprint: Fingerprint) -> bool {
        self.seen.insert(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
