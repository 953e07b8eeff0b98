// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Content extractor: one rendered unit in, one [`ContentUnit`] or nothing out.
//!
//! Each field is resolved independently through an ordered list of
//! [`Probe`]s. The first probe that yields non-blank text wins; a probe that
//! errors or matches nothing falls through to the next. A field with no
//! winning probe takes its default. Only a blank body rejects the unit.

use crate::model::{ContentUnit, EngagementCounts};
use crate::surface::RenderedUnit;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// The fields the extractor resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Body,
    Author,
    PublishedAt,
    Primary,
    Secondary,
    Tertiary,
}

/// One way of locating a field inside a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// CSS selector relative to the unit; `None` targets the unit itself.
    #[serde(default)]
    pub selector: Option<String>,
    /// Read this attribute instead of the inner text.
    #[serde(default)]
    pub attribute: Option<String>,
}

impl Probe {
    pub fn text(selector: &str) -> Self {
        Self {
            selector: Some(selector.to_string()),
            attribute: None,
        }
    }

    pub fn attribute(selector: &str, attribute: &str) -> Self {
        Self {
            selector: Some(selector.to_string()),
            attribute: Some(attribute.to_string()),
        }
    }

    /// The unit's own text content.
    pub fn whole_unit() -> Self {
        Self {
            selector: None,
            attribute: None,
        }
    }
}

/// Ordered probes per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorTable {
    pub body: Vec<Probe>,
    pub author: Vec<Probe>,
    pub published_at: Vec<Probe>,
    pub primary: Vec<Probe>,
    pub secondary: Vec<Probe>,
    pub tertiary: Vec<Probe>,
}

impl Default for LocatorTable {
    fn default() -> Self {
        Self {
            body: vec![Probe::text("div[data-testid='tweetText']"), Probe::whole_unit()],
            author: vec![
                Probe::text("div[data-testid='User-Name'] span"),
                Probe::text("div[dir='auto'] span"),
            ],
            published_at: vec![Probe::attribute("time", "datetime")],
            primary: vec![Probe::text("[data-testid='like']")],
            secondary: vec![Probe::text("[data-testid='retweet']")],
            tertiary: vec![Probe::text("[data-testid='reply']")],
        }
    }
}

impl LocatorTable {
    pub fn probes(&self, field: FieldKind) -> &[Probe] {
        match field {
            FieldKind::Body => &self.body,
            FieldKind::Author => &self.author,
            FieldKind::PublishedAt => &self.published_at,
            FieldKind::Primary => &self.primary,
            FieldKind::Secondary => &self.secondary,
            FieldKind::Tertiary => &self.tertiary,
        }
    }
}

/// Resolve one field, trying its probes in order.
pub async fn resolve_field<U: RenderedUnit + ?Sized>(
    unit: &U,
    locators: &LocatorTable,
    field: FieldKind,
) -> Option<String> {
    for probe in locators.probes(field) {
        match unit.resolve(field, probe).await {
            Ok(Some(value)) if !value.trim().is_empty() => return Some(value),
            Ok(_) => {}
            Err(e) => tracing::trace!(?field, "probe failed: {e}"),
        }
    }
    None
}

/// Extract a unit. `None` when the body is blank.
pub async fn extract<U: RenderedUnit + ?Sized>(
    unit: &U,
    locators: &LocatorTable,
) -> Option<ContentUnit> {
    let body = resolve_field(unit, locators, FieldKind::Body).await?;
    let body = body.trim().to_string();
    if body.is_empty() {
        return None;
    }

    let author = resolve_field(unit, locators, FieldKind::Author)
        .await
        .map(|a| a.trim().to_string())
        .unwrap_or_default();

    let published_at = match resolve_field(unit, locators, FieldKind::PublishedAt).await {
        Some(raw) => parse_timestamp(&raw),
        None => None,
    };

    let mut counts = [0u64; 3];
    let count_fields = [FieldKind::Primary, FieldKind::Secondary, FieldKind::Tertiary];
    for (slot, field) in counts.iter_mut().zip(count_fields) {
        *slot = match resolve_field(unit, locators, field).await {
            Some(raw) => parse_count(&raw),
            None => 0,
        };
    }

    Some(ContentUnit {
        author,
        published_at,
        tags: tags_in(&body),
        mentions: mentions_in(&body),
        engagement: EngagementCounts {
            primary: counts[0],
            secondary: counts[1],
            tertiary: counts[2],
        },
        body,
    })
}

/// Parse an RFC 3339 timestamp; anything else is unresolved.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a displayed engagement count.
///
/// Accepts plain digits, thousands separators (`1,234`) and `K`/`M`
/// abbreviations (`1.2K`). Everything else counts as 0.
pub fn parse_count(raw: &str) -> u64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return 0;
    }
    if let Ok(n) = cleaned.parse::<u64>() {
        return n;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => return 0,
    };
    match number.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => (n * multiplier).round() as u64,
        _ => 0,
    }
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\w+").expect("tag regex is valid"))
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@\w+").expect("mention regex is valid"))
}

/// `#word` tokens in `body`.
pub fn tags_in(body: &str) -> BTreeSet<String> {
    tag_regex()
        .find_iter(body)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `@word` tokens in `body`.
pub fn mentions_in(body: &str) -> BTreeSet<String> {
    mention_regex()
        .find_iter(body)
        .map(|m| m.as_str().to_string())
        .collect()
}
