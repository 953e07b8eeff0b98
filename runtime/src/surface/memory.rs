// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory surface.
//!
//! Plays back a fixed sequence of frames per feed URL: each frame is either
//! the set of units rendered at that scroll position, or an error page that
//! clears on refresh. Scrolling moves to the next frame; past the last frame
//! the feed stalls. Used by tests and by `tagharvest run --replay`.

use super::{RenderedUnit, ScrollStrategy, Surface};
use crate::config::SurfaceConfig;
use crate::harvest::extract::{FieldKind, Probe};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// One unit as the page would render it. Counts stay raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitRecord {
    pub body: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<String>,
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub tertiary: Option<String>,
}

impl UnitRecord {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }
}

/// One scroll position of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Units { units: Vec<UnitRecord> },
    ErrorPage { text: String },
}

impl Frame {
    pub fn units<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Frame::Units {
            units: bodies.into_iter().map(UnitRecord::with_body).collect(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Frame::ErrorPage { text: text.into() }
    }
}

/// Everything a [`MemorySurface`] plays back, keyed by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedScript {
    #[serde(default = "default_true")]
    pub authenticated: bool,
    #[serde(default)]
    pub feeds: HashMap<String, Vec<Frame>>,
    /// URLs whose navigation fails outright.
    #[serde(default)]
    pub failing: HashSet<String>,
    /// Strategies that report failure and never move the feed.
    #[serde(default)]
    pub stuck_strategies: HashSet<ScrollStrategy>,
}

fn default_true() -> bool {
    true
}

impl Default for FeedScript {
    fn default() -> Self {
        Self {
            authenticated: true,
            feeds: HashMap::new(),
            failing: HashSet::new(),
            stuck_strategies: HashSet::new(),
        }
    }
}

impl FeedScript {
    /// Register a topic's frames under its search URL.
    pub fn topic(mut self, surface: &SurfaceConfig, topic: &str, frames: Vec<Frame>) -> Self {
        self.feeds.insert(surface.search_url_for(topic), frames);
        self
    }

    /// Make navigation to a topic's search URL fail.
    pub fn failing_topic(mut self, surface: &SurfaceConfig, topic: &str) -> Self {
        self.failing.insert(surface.search_url_for(topic));
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn stuck(mut self, strategy: ScrollStrategy) -> Self {
        self.stuck_strategies.insert(strategy);
        self
    }
}

/// On-disk replay feed, keyed by topic rather than URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayFile {
    #[serde(default = "default_true")]
    pub authenticated: bool,
    #[serde(default)]
    pub topics: HashMap<String, Vec<Frame>>,
    #[serde(default)]
    pub failing_topics: Vec<String>,
}

impl ReplayFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay feed: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse replay feed: {}", path.display()))
    }

    pub fn into_script(self, surface: &SurfaceConfig) -> FeedScript {
        let mut script = FeedScript {
            authenticated: self.authenticated,
            ..FeedScript::default()
        };
        for (topic, frames) in self.topics {
            script = script.topic(surface, &topic, frames);
        }
        for topic in &self.failing_topics {
            script = script.failing_topic(surface, topic);
        }
        script
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Blank,
    /// Any page without a scripted feed; authenticated elements render here.
    Landing(String),
    Feed { url: String, cursor: usize },
}

/// A rendered unit backed by a [`UnitRecord`].
#[derive(Debug, Clone)]
pub struct MemoryUnit(UnitRecord);

#[async_trait]
impl RenderedUnit for MemoryUnit {
    async fn resolve(&self, field: FieldKind, _probe: &Probe) -> Result<Option<String>> {
        let record = &self.0;
        let value = match field {
            FieldKind::Body => &record.body,
            FieldKind::Author => &record.author,
            FieldKind::PublishedAt => &record.published_at,
            FieldKind::Primary => &record.primary,
            FieldKind::Secondary => &record.secondary,
            FieldKind::Tertiary => &record.tertiary,
        };
        Ok(value.clone())
    }
}

/// Surface that plays back a [`FeedScript`].
#[derive(Debug)]
pub struct MemorySurface {
    script: FeedScript,
    location: Location,
    scroll_log: Vec<ScrollStrategy>,
    navigations: Vec<String>,
    refreshes: usize,
}

impl MemorySurface {
    pub fn new(script: FeedScript) -> Self {
        Self {
            script,
            location: Location::Blank,
            scroll_log: Vec::new(),
            navigations: Vec::new(),
            refreshes: 0,
        }
    }

    /// Every strategy applied so far, in order.
    pub fn scroll_log(&self) -> &[ScrollStrategy] {
        &self.scroll_log
    }

    /// Every URL navigated to, in order.
    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    fn current_frame(&self) -> Option<&Frame> {
        match &self.location {
            Location::Feed { url, cursor } => {
                self.script.feeds.get(url).and_then(|frames| frames.get(*cursor))
            }
            _ => None,
        }
    }

    fn frame_count(&self, url: &str) -> usize {
        self.script.feeds.get(url).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl Surface for MemorySurface {
    type Unit = MemoryUnit;

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        if self.script.failing.contains(url) {
            bail!("navigation to {url} failed");
        }
        self.location = if self.script.feeds.contains_key(url) {
            Location::Feed {
                url: url.to_string(),
                cursor: 0,
            }
        } else {
            Location::Landing(url.to_string())
        };
        Ok(())
    }

    async fn page_text(&self) -> Result<String> {
        Ok(match self.current_frame() {
            Some(Frame::ErrorPage { text }) => text.clone(),
            Some(Frame::Units { units }) => units
                .iter()
                .filter_map(|u| u.body.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        })
    }

    async fn rendered_units(&self) -> Result<Vec<MemoryUnit>> {
        Ok(match self.current_frame() {
            Some(Frame::Units { units }) => units.iter().cloned().map(MemoryUnit).collect(),
            _ => Vec::new(),
        })
    }

    async fn advance_view(&mut self, strategy: ScrollStrategy) -> Result<bool> {
        self.scroll_log.push(strategy);
        if self.script.stuck_strategies.contains(&strategy) {
            return Ok(false);
        }
        let count = match &self.location {
            Location::Feed { url, .. } => self.frame_count(url),
            _ => return Ok(true),
        };
        if let Location::Feed { cursor, .. } = &mut self.location {
            if *cursor + 1 < count {
                *cursor += 1;
            }
        }
        Ok(true)
    }

    async fn refresh(&mut self) -> Result<()> {
        self.refreshes += 1;
        let on_error = matches!(self.current_frame(), Some(Frame::ErrorPage { .. }));
        if on_error {
            if let Location::Feed { cursor, .. } = &mut self.location {
                *cursor += 1;
            }
        }
        Ok(())
    }

    async fn try_locate(&self, _selector: &str) -> Result<bool> {
        Ok(match &self.location {
            Location::Blank => false,
            Location::Landing(_) => self.script.authenticated,
            Location::Feed { .. } => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scroll_walks_frames_then_stalls() {
        let config = SurfaceConfig::default();
        let script = FeedScript::default().topic(
            &config,
            "#a",
            vec![Frame::units(["one"]), Frame::units(["one", "two"])],
        );
        let mut surface = MemorySurface::new(script);
        surface.navigate(&config.search_url_for("#a")).await.unwrap();
        assert_eq!(surface.rendered_units().await.unwrap().len(), 1);

        surface.advance_view(ScrollStrategy::PixelStep).await.unwrap();
        assert_eq!(surface.rendered_units().await.unwrap().len(), 2);

        surface.advance_view(ScrollStrategy::PixelStep).await.unwrap();
        assert_eq!(surface.rendered_units().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_page_clears_on_refresh() {
        let config = SurfaceConfig::default();
        let script = FeedScript::default().topic(
            &config,
            "#a",
            vec![Frame::error("Something went wrong"), Frame::units(["one"])],
        );
        let mut surface = MemorySurface::new(script);
        surface.navigate(&config.search_url_for("#a")).await.unwrap();
        assert_eq!(surface.page_text().await.unwrap(), "Something went wrong");
        assert!(surface.rendered_units().await.unwrap().is_empty());

        surface.refresh().await.unwrap();
        assert_eq!(surface.page_text().await.unwrap(), "one");
        assert_eq!(surface.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_landing_page_reflects_authentication() {
        let mut surface = MemorySurface::new(FeedScript::default().unauthenticated());
        assert!(!surface.try_locate("input").await.unwrap());
        surface.navigate("https://x.com/home").await.unwrap();
        assert!(!surface.try_locate("input").await.unwrap());

        let mut surface = MemorySurface::new(FeedScript::default());
        surface.navigate("https://x.com/home").await.unwrap();
        assert!(surface.try_locate("input").await.unwrap());
    }

    #[tokio::test]
    async fn test_stuck_strategy_does_not_move() {
        let config = SurfaceConfig::default();
        let script = FeedScript::default()
            .topic(&config, "#a", vec![Frame::units(["one"]), Frame::units(["two"])])
            .stuck(ScrollStrategy::PixelStep);
        let mut surface = MemorySurface::new(script);
        surface.navigate(&config.search_url_for("#a")).await.unwrap();
        assert!(!surface.advance_view(ScrollStrategy::PixelStep).await.unwrap());
        assert_eq!(surface.page_text().await.unwrap(), "one");
        assert!(surface.advance_view(ScrollStrategy::PageDown).await.unwrap());
        assert_eq!(surface.page_text().await.unwrap(), "two");
    }

    #[test]
    fn test_replay_file_parses() {
        let replay: ReplayFile = serde_json::from_str(
            r##"{
                "topics": {
                    "#a": [
                        {"kind": "units", "units": [{"body": "hi #a", "primary": "1.2K"}]},
                        {"kind": "error_page", "text": "Something went wrong"}
                    ]
                },
                "failing_topics": ["#b"]
            }"##,
        )
        .unwrap();
        assert!(replay.authenticated);
        let config = SurfaceConfig::default();
        let script = replay.into_script(&config);
        assert_eq!(script.feeds[&config.search_url_for("#a")].len(), 2);
        assert!(script.failing.contains(&config.search_url_for("#b")));
    }
}
