// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tagharvest runtime library: a resilient collector for tag-search
//! infinite-scroll feeds.
//!
//! One browser session is driven through a sequence of topics. Each topic
//! pass scans rendered units, extracts and deduplicates them, rotates scroll
//! strategies when the feed stalls, and backs off on rate-limit pages. The
//! cumulative result is checkpointed after every topic.

#![allow(clippy::new_without_default)]

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod harvest;
pub mod model;
pub mod pacing;
pub mod progress;
pub mod surface;
