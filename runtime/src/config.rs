// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest configuration.
//!
//! A single immutable [`HarvestConfig`] is built at startup (TOML file,
//! then defaults, then CLI overrides), validated once, and handed to the
//! orchestrator by value. Nothing reads configuration from ambient state
//! after that point.
//!
//! ```toml
//! topics = ["#nifty50", "#sensex"]
//!
//! [quota]
//! max_per_topic = 20
//! min_per_topic = 10
//!
//! [pacing.between_topics]
//! min_ms = 15000
//! max_ms = 180000
//!
//! [surface]
//! headless = true
//! profile_dir = "/home/me/.config/tagharvest/profile"
//! ```

use crate::error::HarvestError;
use crate::harvest::extract::LocatorTable;
use crate::surface::ScrollStrategy;
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Topics (tags) to harvest, processed in this order.
    pub topics: Vec<String>,
    pub quota: QuotaConfig,
    pub limits: LimitsConfig,
    pub pacing: PacingConfig,
    pub novelty: NoveltyConfig,
    pub monitor: MonitorConfig,
    pub scroll: ScrollConfig,
    pub surface: SurfaceConfig,
    pub locators: LocatorTable,
    pub checkpoint: CheckpointConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            topics: ["#nifty50", "#sensex", "#intraday", "#banknifty"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            quota: QuotaConfig::default(),
            limits: LimitsConfig::default(),
            pacing: PacingConfig::default(),
            novelty: NoveltyConfig::default(),
            monitor: MonitorConfig::default(),
            scroll: ScrollConfig::default(),
            surface: SurfaceConfig::default(),
            locators: LocatorTable::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

/// Per-topic item bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Stop the topic as soon as this many units are collected.
    pub max_per_topic: usize,
    /// Accept a stalled topic without a final sweep once this many are in.
    pub min_per_topic: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_per_topic: 20,
            min_per_topic: 10,
        }
    }
}

/// Retry ceilings for the topic loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Consecutive rounds without new content tolerated before stopping.
    pub scroll_retry_limit: u32,
    /// Consecutive error pages tolerated before aborting the topic.
    pub error_page_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            scroll_retry_limit: 6,
            error_page_limit: 3,
        }
    }
}

/// An inclusive randomized wait, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl PauseRange {
    pub const fn millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn secs(min: u64, max: u64) -> Self {
        Self::millis(min * 1000, max * 1000)
    }

    /// Fixed wait with no jitter.
    pub const fn fixed(ms: u64) -> Self {
        Self::millis(ms, ms)
    }

    /// Draw a duration uniformly from the range.
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }

    fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }
}

/// Every wait the engine performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// After a round that recorded new units.
    pub after_new_content: PauseRange,
    /// After a scroll action.
    pub after_scroll: PauseRange,
    /// Backoff when the page shows a transient error.
    pub error_backoff: PauseRange,
    /// Between two topics.
    pub between_topics: PauseRange,
    /// Between two topics when the first one failed.
    pub after_topic_failure: PauseRange,
    /// Before the under-quota final sweep.
    pub before_final_sweep: PauseRange,
    /// Between strategies inside the final sweep.
    pub sweep_step: PauseRange,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            after_new_content: PauseRange::millis(1200, 3000),
            after_scroll: PauseRange::millis(2000, 4000),
            error_backoff: PauseRange::secs(600, 600),
            between_topics: PauseRange::secs(15, 180),
            after_topic_failure: PauseRange::secs(60, 120),
            before_final_sweep: PauseRange::secs(30, 30),
            sweep_step: PauseRange::millis(1500, 3200),
        }
    }
}

impl PacingConfig {
    /// Zero-length waits everywhere. Useful for replay runs and tests.
    pub fn immediate() -> Self {
        let zero = PauseRange::fixed(0);
        Self {
            after_new_content: zero,
            after_scroll: zero,
            error_backoff: zero,
            between_topics: zero,
            after_topic_failure: zero,
            before_final_sweep: zero,
            sweep_step: zero,
        }
    }

    fn ranges(&self) -> [(&'static str, PauseRange); 7] {
        [
            ("after_new_content", self.after_new_content),
            ("after_scroll", self.after_scroll),
            ("error_backoff", self.error_backoff),
            ("between_topics", self.between_topics),
            ("after_topic_failure", self.after_topic_failure),
            ("before_final_sweep", self.before_final_sweep),
            ("sweep_step", self.sweep_step),
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NoveltyConfig {
    /// Characters of normalized body text kept in a fingerprint.
    pub fingerprint_width: usize,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            fingerprint_width: 160,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Page text fragments that mark a transient error page.
    pub error_markers: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            error_markers: vec!["Something went wrong".into(), "Try reloading".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Rotation order of view-advancement actions.
    pub order: Vec<ScrollStrategy>,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            order: ScrollStrategy::ALL.to_vec(),
        }
    }
}

/// Browser-facing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Landing page used for the authentication probe.
    pub home_url: String,
    /// Search page template; `{query}` receives the percent-encoded topic.
    pub search_url: String,
    /// Selectors that only render for an authenticated session.
    pub auth_probe_selectors: Vec<String>,
    /// Selectors that confirm the search results view rendered.
    pub search_ready_selectors: Vec<String>,
    /// Selector matching one rendered content unit.
    pub unit_selector: String,
    /// Pixels moved by the pixel-step strategy.
    pub pixel_step: i64,
    pub navigation_timeout_ms: u64,
    /// How long a locate probe polls before giving up.
    pub locate_timeout_ms: u64,
    pub headless: bool,
    /// Persistent browser profile holding the bootstrapped session.
    pub profile_dir: Option<PathBuf>,
    pub chromium_path: Option<PathBuf>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            home_url: "https://x.com/home".into(),
            search_url: "https://x.com/search?q={query}&src=typed_query&f=live".into(),
            auth_probe_selectors: vec![
                "input[aria-label='Search query']".into(),
                "input[data-testid='SearchBox_Search_Input']".into(),
            ],
            search_ready_selectors: vec![
                "[data-testid='primaryColumn']".into(),
                "article".into(),
            ],
            unit_selector: "article".into(),
            pixel_step: 300,
            navigation_timeout_ms: 60_000,
            locate_timeout_ms: 8_000,
            headless: false,
            profile_dir: None,
            chromium_path: None,
        }
    }
}

impl SurfaceConfig {
    /// Search URL for a topic, with the topic percent-encoded.
    pub fn search_url_for(&self, topic: &str) -> String {
        let query: String = url::form_urlencoded::byte_serialize(topic.as_bytes()).collect();
        self.search_url.replace("{query}", &query)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tweets_collected.jsonl"),
        }
    }
}

impl HarvestConfig {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Check cross-field constraints. Called once before a run.
    pub fn validate(&self) -> Result<(), HarvestError> {
        let fail = |msg: String| Err(HarvestError::Config(msg));

        if self.topics.is_empty() {
            return fail("no topics configured".into());
        }
        if let Some(t) = self.topics.iter().find(|t| t.trim().is_empty()) {
            return fail(format!("blank topic {t:?}"));
        }
        if self.quota.max_per_topic == 0 {
            return fail("quota.max_per_topic must be positive".into());
        }
        if self.quota.min_per_topic > self.quota.max_per_topic {
            return fail(format!(
                "quota.min_per_topic ({}) exceeds quota.max_per_topic ({})",
                self.quota.min_per_topic, self.quota.max_per_topic
            ));
        }
        if self.novelty.fingerprint_width == 0 {
            return fail("novelty.fingerprint_width must be positive".into());
        }
        if self.scroll.order.is_empty() {
            return fail("scroll.order must list at least one strategy".into());
        }
        if self.monitor.error_markers.iter().any(|m| m.is_empty()) {
            return fail("monitor.error_markers must not contain empty markers".into());
        }
        for (name, range) in self.pacing.ranges() {
            if !range.is_valid() {
                return fail(format!(
                    "pacing.{name}: min_ms ({}) exceeds max_ms ({})",
                    range.min_ms, range.max_ms
                ));
            }
        }
        if !self.surface.search_url.contains("{query}") {
            return fail("surface.search_url must contain {query}".into());
        }
        Ok(())
    }
}
