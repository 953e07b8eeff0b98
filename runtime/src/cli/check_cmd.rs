//! CLI handler for `tagharvest check`: launch the browser and run only the
//! authentication probe.

use crate::cli::output;
use crate::config::HarvestConfig;
use crate::harvest::orchestrator::Orchestrator;
use crate::pacing::Pacer;
use crate::surface::chromium::{find_chromium, ChromiumSurface};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub async fn run(config_path: Option<&Path>, headless: bool, profile_dir: Option<PathBuf>) -> Result<()> {
    let mut config = HarvestConfig::load(config_path)?;
    if headless {
        config.surface.headless = true;
    }
    if profile_dir.is_some() {
        config.surface.profile_dir = profile_dir;
    }

    let chromium = find_chromium(config.surface.chromium_path.as_ref())
        .context("Chromium not found. Set TAGHARVEST_CHROMIUM_PATH or surface.chromium_path.")?;
    if !output::is_quiet() && !output::is_json() {
        println!("  Chromium: {}", chromium.display());
        println!("  Probing {} ...", config.surface.home_url);
    }

    let surface = ChromiumSurface::launch(&config.surface).await?;
    let home = config.surface.home_url.clone();
    let mut orchestrator = Orchestrator::new(config, surface, Pacer::detached())?;
    let verdict = orchestrator.verify_session().await;
    if let Err(e) = orchestrator.into_surface().close().await {
        tracing::warn!("failed to close browser: {e:#}");
    }

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "authenticated": verdict.is_ok(),
            "home_url": home,
            "chromium": chromium.display().to_string(),
        }));
    } else if verdict.is_ok() && !output::is_quiet() {
        println!("  Session authenticated.");
    }
    verdict?;
    Ok(())
}
