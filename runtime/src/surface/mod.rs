// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rendering-surface abstraction.
//!
//! Defines the `Surface` and `RenderedUnit` traits the harvest engine drives.
//! A surface is one stateful browsing session: it is never shared and never
//! driven concurrently. Implementations: Chromium via chromiumoxide
//! ([`chromium`]) and a scripted in-memory feed ([`memory`]).

pub mod chromium;
pub mod memory;

use crate::harvest::extract::{FieldKind, Probe};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A distinct way of advancing the view to trigger lazy loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollStrategy {
    /// Scroll by a fixed pixel increment.
    PixelStep,
    /// Scroll the last rendered unit into view.
    LastUnit,
    /// Send a PageDown key event to the document body.
    PageDown,
    /// Animated jump to the bottom of the document.
    SmoothBottom,
}

impl ScrollStrategy {
    pub const ALL: [ScrollStrategy; 4] = [
        ScrollStrategy::PixelStep,
        ScrollStrategy::LastUnit,
        ScrollStrategy::PageDown,
        ScrollStrategy::SmoothBottom,
    ];
}

impl fmt::Display for ScrollStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PixelStep => write!(f, "pixel-step"),
            Self::LastUnit => write!(f, "last-unit"),
            Self::PageDown => write!(f, "page-down"),
            Self::SmoothBottom => write!(f, "smooth-bottom"),
        }
    }
}

/// One rendered content block on the current page.
#[async_trait]
pub trait RenderedUnit: Send + Sync {
    /// Resolve one probe for `field` inside this unit.
    ///
    /// `Ok(None)` means the probe matched nothing; `Err` means the lookup
    /// itself failed. Both are recoverable for the caller.
    async fn resolve(&self, field: FieldKind, probe: &Probe) -> Result<Option<String>>;
}

/// A single authenticated browsing session.
#[async_trait]
pub trait Surface: Send + Sync {
    type Unit: RenderedUnit;

    /// Navigate to a URL and wait for the load to settle.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Visible text of the whole current page.
    async fn page_text(&self) -> Result<String>;

    /// Currently rendered content units, in document order.
    async fn rendered_units(&self) -> Result<Vec<Self::Unit>>;

    /// Perform one view-advancement action. `Ok(false)` when the action
    /// could not be applied (e.g. nothing to scroll to).
    async fn advance_view(&mut self, strategy: ScrollStrategy) -> Result<bool>;

    /// Reload the current page.
    async fn refresh(&mut self) -> Result<()>;

    /// Whether `selector` matches an element, polling up to the surface's
    /// locate timeout.
    async fn try_locate(&self, selector: &str) -> Result<bool>;
}

/// Try `selectors` in order; return the first one that locates.
///
/// Lookup errors count as "not found" and fall through to the next selector.
pub async fn locate_first<S: Surface + ?Sized>(
    surface: &S,
    selectors: &[String],
) -> Option<String> {
    for selector in selectors {
        match surface.try_locate(selector).await {
            Ok(true) => return Some(selector.clone()),
            Ok(false) => {}
            Err(e) => tracing::debug!(%selector, "locate failed: {e}"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&ScrollStrategy::ALL).unwrap();
        assert_eq!(
            json,
            r#"["pixel_step","last_unit","page_down","smooth_bottom"]"#
        );
        let back: ScrollStrategy = serde_json::from_str(r#""page_down""#).unwrap();
        assert_eq!(back, ScrollStrategy::PageDown);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(ScrollStrategy::SmoothBottom.to_string(), "smooth-bottom");
    }
}
