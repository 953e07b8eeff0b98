//! Chromium surface using chromiumoxide.
//!
//! Drives one page of a (normally headed) Chromium whose persistent profile
//! already holds an authenticated session.

use super::{RenderedUnit, ScrollStrategy, Surface};
use crate::config::SurfaceConfig;
use crate::harvest::extract::{FieldKind, Probe};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

const LOCATE_POLL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium(configured: Option<&PathBuf>) -> Option<PathBuf> {
    // 1. explicit config
    if let Some(path) = configured.filter(|p| p.exists()) {
        return Some(path.clone());
    }

    // 2. TAGHARVEST_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("TAGHARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.tagharvest/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".tagharvest/chromium/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".tagharvest/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".tagharvest/chromium/chrome-linux64/chrome"),
                home.join(".tagharvest/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Default persistent profile location, `~/.tagharvest/profile`.
pub fn default_profile_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tagharvest/profile"))
}

/// A live Chromium page.
pub struct ChromiumSurface {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    config: SurfaceConfig,
}

impl ChromiumSurface {
    /// Launch Chromium with the configured profile and open a blank page.
    pub async fn launch(config: &SurfaceConfig) -> Result<Self> {
        let chrome_path = find_chromium(config.chromium_path.as_ref()).context(
            "Chromium not found. Set TAGHARVEST_CHROMIUM_PATH or surface.chromium_path.",
        )?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(Duration::from_millis(config.navigation_timeout_ms))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run");
        builder = if config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        if let Some(profile) = config.profile_dir.clone().or_else(default_profile_dir) {
            std::fs::create_dir_all(&profile).with_context(|| {
                format!("failed to create profile dir: {}", profile.display())
            })?;
            builder = builder.user_data_dir(profile);
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        Ok(Self {
            browser,
            page,
            handler,
            config: config.clone(),
        })
    }

    /// Close the browser and stop its event handler.
    pub async fn close(mut self) -> Result<()> {
        let _ = self.page.close().await;
        if let Err(e) = self.browser.close().await {
            tracing::debug!("browser close: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .context("JS execution failed")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    type Unit = ChromiumUnit;

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let timeout_ms = self.config.navigation_timeout_ms;
        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn page_text(&self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''").await
    }

    async fn rendered_units(&self) -> Result<Vec<ChromiumUnit>> {
        let elements = self
            .page
            .find_elements(self.config.unit_selector.as_str())
            .await
            .context("failed to query rendered units")?;
        Ok(elements.into_iter().map(|element| ChromiumUnit { element }).collect())
    }

    async fn advance_view(&mut self, strategy: ScrollStrategy) -> Result<bool> {
        match strategy {
            ScrollStrategy::PixelStep => {
                let script = format!("window.scrollBy(0, {}); true", self.config.pixel_step);
                self.eval(&script).await
            }
            ScrollStrategy::LastUnit => {
                let mut units = self
                    .page
                    .find_elements(self.config.unit_selector.as_str())
                    .await
                    .context("failed to query rendered units")?;
                match units.pop() {
                    Some(last) => {
                        last.scroll_into_view().await?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            ScrollStrategy::PageDown => {
                let body = self.page.find_element("body").await?;
                body.press_key("PageDown").await?;
                Ok(true)
            }
            ScrollStrategy::SmoothBottom => {
                self.eval(
                    "window.scrollTo({ top: document.body.scrollHeight, behavior: 'smooth' }); true",
                )
                .await
            }
        }
    }

    async fn refresh(&mut self) -> Result<()> {
        let timeout_ms = self.config.navigation_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.reload()).await {
            Ok(result) => {
                result.context("reload failed")?;
                Ok(())
            }
            Err(_) => bail!("reload timed out after {timeout_ms}ms"),
        }
    }

    async fn try_locate(&self, selector: &str) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.locate_timeout_ms);
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(LOCATE_POLL).await;
        }
    }
}

/// One rendered unit element.
pub struct ChromiumUnit {
    element: Element,
}

#[async_trait]
impl RenderedUnit for ChromiumUnit {
    async fn resolve(&self, _field: FieldKind, probe: &Probe) -> Result<Option<String>> {
        let nested;
        let target = match &probe.selector {
            Some(selector) => match self.element.find_element(selector.as_str()).await {
                Ok(element) => {
                    nested = element;
                    &nested
                }
                Err(_) => return Ok(None),
            },
            None => &self.element,
        };
        let value = match &probe.attribute {
            Some(attribute) => target.attribute(attribute.as_str()).await?,
            None => target.inner_text().await?,
        };
        Ok(value)
    }
}
