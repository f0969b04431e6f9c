use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Error, bail};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use vsco_downloader::config::AppConfig;
use vsco_downloader::runner::{ProfileRun, ProfileRunner, RunOptions};
use vsco_downloader::site_cache::SiteCache;
use vsco_downloader::vsco::{Endpoints, HttpTransport, ProfileOrchestrator, ProgressSink};

use crate::cli::Args;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Progress bar shown while a profile's media downloads.
struct DownloadProgress {
    bar: Mutex<Option<ProgressBar>>,
    label: Mutex<String>,
}

impl DownloadProgress {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            label: Mutex::new(String::new()),
        }
    }

}

impl ProgressSink for DownloadProgress {
    fn profile(&self, username: &str) {
        if let Ok(mut label) = self.label.lock() {
            *label = username.to_string();
        }
    }

    fn start(&self, total: usize) {
        const PROGRESS_TEMPLATE: &str = "{msg} {bar:40.cyan/blue} {pos}/{len} ({eta})";

        let style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        if let Ok(label) = self.label.lock() {
            bar.set_message(format!("Downloading new media for {}...", label));
        }
        bar.enable_steady_tick(Duration::from_millis(200));

        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn advance(&self, completed: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(completed as u64);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

/// Handles the flow of a run: single profile, user list or site id lookup.
pub(crate) struct Program {
    args: Args,
    runner: ProfileRunner,
    cancel: CancellationToken,
}

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new(args: Args, config: AppConfig) -> Result<Self, Error> {
        let transport = Arc::new(
            HttpTransport::new(&config.transport_config()).context("Failed to build HTTP client")?,
        );
        let cancel = CancellationToken::new();

        let orchestrator = ProfileOrchestrator::new(
            transport,
            Endpoints::new(config.api.base_url.clone()),
            config.catalog_config(),
        )
        .with_progress(Arc::new(DownloadProgress::new()))
        .with_cancellation(cancel.clone())
        .with_refetch_empty_files(config.verifier.refetch_empty_files);

        let options = RunOptions {
            destination_root: args
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.paths.download_directory)),
            worker_count: args
                .workers
                .unwrap_or(config.pools.max_download_concurrency)
                .max(1),
            profile_picture_only: args.profile_picture,
        };

        let mut runner = ProfileRunner::new(orchestrator, options).with_cancellation(cancel.clone());
        if !config.paths.site_cache_file.is_empty() {
            runner = runner.with_site_cache(SiteCache::new(&config.paths.site_cache_file));
        }

        Ok(Self {
            args,
            runner,
            cancel,
        })
    }

    /// Runs the downloader program.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!(
            "Destination root: {}",
            self.runner.options().destination_root.display()
        );
        trace!("Workers: {}", self.runner.options().worker_count);

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping downloads...");
                cancel.cancel();
            }
        });

        if let Some(site_id) = self.args.site_id {
            let username = self
                .runner
                .lookup_site(site_id)
                .await
                .with_context(|| format!("Failed to look up site {}", site_id))?;
            println!("{}", username);
            return Ok(());
        }

        if let Some(list) = &self.args.list {
            let contents = tokio::fs::read_to_string(list)
                .await
                .with_context(|| format!("Failed to open userlist {}", list.display()))?;
            self.runner.run_list(&contents).await;
            return Ok(());
        }

        if let Some(username) = &self.args.username {
            let run = self
                .runner
                .run_profile(username)
                .await
                .with_context(|| format!("Error processing {}", username))?;
            match run {
                ProfileRun::NotFound => bail!("User {} not found", username),
                ProfileRun::Saved(result) if result.failed > 0 => {
                    warn!("{} items failed to download for {}", result.failed, username);
                }
                _ => {}
            }
        }

        Ok(())
    }
}
