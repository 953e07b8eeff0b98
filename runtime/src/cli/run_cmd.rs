//! CLI handler for `tagharvest run`.

use crate::cli::output;
use crate::config::{HarvestConfig, PacingConfig};
use crate::harvest::orchestrator::{Orchestrator, RunReport};
use crate::pacing::Pacer;
use crate::progress::{self, ProgressEventKind, ProgressReceiver, ProgressSender};
use crate::surface::chromium::ChromiumSurface;
use crate::surface::memory::{MemorySurface, ReplayFile};
use crate::surface::Surface;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Overrides given on the command line.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub topics: Vec<String>,
    pub max: Option<usize>,
    pub min: Option<usize>,
    pub checkpoint: Option<PathBuf>,
    pub headless: bool,
    pub profile_dir: Option<PathBuf>,
    /// Play back a JSON feed instead of launching a browser.
    pub replay: Option<PathBuf>,
}

impl RunOptions {
    /// Layer these overrides over a loaded configuration.
    pub fn apply(&self, config: &mut HarvestConfig) {
        if !self.topics.is_empty() {
            config.topics = self.topics.clone();
        }
        if let Some(max) = self.max {
            config.quota.max_per_topic = max;
        }
        if let Some(min) = self.min {
            config.quota.min_per_topic = min;
        }
        if let Some(path) = &self.checkpoint {
            config.checkpoint.path = path.clone();
        }
        if self.headless {
            config.surface.headless = true;
        }
        if let Some(dir) = &self.profile_dir {
            config.surface.profile_dir = Some(dir.clone());
        }
        if self.replay.is_some() {
            config.pacing = PacingConfig::immediate();
        }
    }
}

/// Run the harvest command.
pub async fn run(config_path: Option<&Path>, opts: RunOptions) -> Result<()> {
    let mut config = HarvestConfig::load(config_path)?;
    opts.apply(&mut config);
    config.validate()?;

    let token = CancellationToken::new();
    spawn_interrupt_watcher(token.clone());
    let pacer = Pacer::new(token);

    let run_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = progress::channel();
    let printer = (!output::is_quiet() && !output::is_json()).then(|| spawn_printer(rx));

    let topics = config.topics.clone();
    let checkpoint = config.checkpoint.path.clone();

    let report = match &opts.replay {
        Some(feed) => {
            let script = ReplayFile::load(feed)?.into_script(&config.surface);
            let (report, _) = harvest(config, MemorySurface::new(script), pacer, tx, &run_id, &topics).await;
            report?
        }
        None => {
            let surface = ChromiumSurface::launch(&config.surface).await?;
            let (report, surface) = harvest(config, surface, pacer, tx, &run_id, &topics).await;
            if let Some(surface) = surface {
                if let Err(e) = surface.close().await {
                    warn!("failed to close browser: {e:#}");
                }
            }
            report?
        }
    };

    if let Some(printer) = printer {
        let _ = printer.await;
    }
    print_report(&run_id, &checkpoint, &report);
    Ok(())
}

/// Drive an orchestrator over `surface` and hand the surface back for cleanup.
async fn harvest<S: Surface>(
    config: HarvestConfig,
    surface: S,
    pacer: Pacer,
    tx: ProgressSender,
    run_id: &str,
    topics: &[String],
) -> (Result<RunReport>, Option<S>) {
    let mut orchestrator = match Orchestrator::new(config, surface, pacer) {
        Ok(o) => o.with_progress(tx, run_id),
        Err(e) => return (Err(e.into()), None),
    };
    let report = orchestrator.run(topics).await.map_err(anyhow::Error::from);
    (report, Some(orchestrator.into_surface()))
}

fn spawn_interrupt_watcher(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next wait");
            token.cancel();
        }
    });
}

fn spawn_printer(mut rx: ProgressReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("  {spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let line = progress::describe(&event.event);
                    match event.event {
                        ProgressEventKind::RoundCompleted { .. } => spinner.set_message(line),
                        _ => spinner.println(format!("  {line}")),
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        spinner.finish_and_clear();
    })
}

fn print_report(run_id: &str, checkpoint: &Path, report: &RunReport) {
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "run_id": run_id,
            "total": report.cumulative.len(),
            "cancelled": report.cancelled,
            "checkpoint": checkpoint.display().to_string(),
            "topics": report.topics,
        }));
        return;
    }
    if output::is_quiet() {
        return;
    }

    println!();
    for summary in &report.topics {
        println!(
            "  {:<20} {:>5}  {}",
            summary.topic, summary.collected, summary.reason
        );
    }
    println!();
    let status = if report.cancelled { "cancelled" } else { "done" };
    println!(
        "  {status}: {} unit(s) in {}",
        report.cumulative.len(),
        checkpoint.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = HarvestConfig::default();
        let opts = RunOptions {
            topics: vec!["#gold".into()],
            max: Some(5),
            min: Some(2),
            checkpoint: Some(PathBuf::from("/tmp/out.jsonl")),
            headless: true,
            ..Default::default()
        };
        opts.apply(&mut config);
        assert_eq!(config.topics, ["#gold"]);
        assert_eq!((config.quota.max_per_topic, config.quota.min_per_topic), (5, 2));
        assert_eq!(config.checkpoint.path, PathBuf::from("/tmp/out.jsonl"));
        assert!(config.surface.headless);
        assert_eq!(config.pacing.between_topics, PacingConfig::default().between_topics);
    }

    #[test]
    fn test_replay_disables_pacing() {
        let mut config = HarvestConfig::default();
        RunOptions {
            replay: Some(PathBuf::from("feed.json")),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.pacing.error_backoff.max_ms, 0);
        assert_eq!(config.topics.len(), 4);
    }
}
