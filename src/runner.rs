//! Profile runs on top of the orchestrator: one username, a user list, or a
//! reverse site id lookup, with the site cache kept up to date along the way.

use std::fmt;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, trace, warn};

use crate::site_cache::{STATUS_NOT_FOUND, SiteCache};
use crate::vsco::{BatchResult, ProfileIdentity, ProfileOrchestrator, VscoResult};

/// Where and how profiles are saved
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub destination_root: PathBuf,
    pub worker_count: usize,
    /// Save only the profile picture
    pub profile_picture_only: bool,
}

/// How one username ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileRun {
    Saved(BatchResult),
    ProfilePicture(PathBuf),
    NotFound,
}

/// Tally of a user list run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListSummary {
    pub processed: usize,
    pub not_found: usize,
    /// Profiles that failed before or during their batch
    pub failed: usize,
    pub totals: BatchResult,
}

impl fmt::Display for ListSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} profiles: {} ({} not found, {} failed)",
            self.processed, self.totals, self.not_found, self.failed
        )
    }
}

/// Usernames of a list file. Blank lines and `#` comments are ignored.
pub fn parse_user_list(contents: &str) -> Vec<&str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

pub struct ProfileRunner {
    orchestrator: ProfileOrchestrator,
    options: RunOptions,
    site_cache: Option<SiteCache>,
    cancel: CancellationToken,
}

impl ProfileRunner {
    pub fn new(orchestrator: ProfileOrchestrator, options: RunOptions) -> Self {
        Self {
            orchestrator,
            options,
            site_cache: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_site_cache(mut self, cache: SiteCache) -> Self {
        self.site_cache = Some(cache);
        self
    }

    /// Stops a user list between profiles. Pass the orchestrator's token too
    /// so running batches stop as well.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Resolve `username` and save its media or its profile picture.
    #[instrument(skip(self))]
    pub async fn run_profile(&self, username: &str) -> VscoResult<ProfileRun> {
        let Some(identity) = self.orchestrator.resolve_identity(username).await? else {
            warn!("User {} not found", username);
            self.report_missing(username).await;
            return Ok(ProfileRun::NotFound);
        };
        self.remember(&identity).await;

        let root = &self.options.destination_root;
        if self.options.profile_picture_only {
            let path = self.orchestrator.save_profile_picture(&identity, root).await?;
            return Ok(ProfileRun::ProfilePicture(path));
        }

        let result = self
            .orchestrator
            .save_all_media(&identity, root, self.options.worker_count)
            .await?;
        info!("{}: {}", username, result);
        Ok(ProfileRun::Saved(result))
    }

    /// Run every username of a list file. A missing or failing profile is
    /// logged and the next one runs.
    pub async fn run_list(&self, contents: &str) -> ListSummary {
        let usernames = parse_user_list(contents);
        info!("Processing {} usernames", usernames.len());

        let mut summary = ListSummary::default();
        for username in usernames {
            if self.cancel.is_cancelled() {
                warn!("Stopping user list early");
                break;
            }

            summary.processed += 1;
            match self.run_profile(username).await {
                Ok(ProfileRun::Saved(result)) => summary.totals += result,
                Ok(ProfileRun::ProfilePicture(_)) => {}
                Ok(ProfileRun::NotFound) => summary.not_found += 1,
                Err(e) => {
                    error!("Error processing {}: {}", username, e);
                    summary.failed += 1;
                }
            }
        }

        info!("User list finished: {}", summary);
        summary
    }

    /// Username currently owning `site_id`. The cache only answers when the
    /// live lookup fails.
    #[instrument(skip(self))]
    pub async fn lookup_site(&self, site_id: u64) -> VscoResult<String> {
        let err = match self.orchestrator.lookup_username(site_id).await {
            Ok(username) => {
                if let Some(cache) = &self.site_cache {
                    if let Err(e) = cache.record(&username, site_id, None).await {
                        warn!("Failed to update site cache: {}", e);
                    }
                }
                return Ok(username);
            }
            Err(e) => e,
        };

        if let Some(cache) = &self.site_cache {
            match cache.find_by_site_id(site_id).await {
                Ok(Some(entry)) => {
                    warn!(
                        "Live lookup of site {} failed ({}), using cached username",
                        site_id, err
                    );
                    return Ok(entry.username);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to read site cache: {}", e),
            }
        }
        Err(err)
    }

    async fn remember(&self, identity: &ProfileIdentity) {
        if let Some(cache) = &self.site_cache {
            if let Err(e) = cache.record(&identity.username, identity.site_id, None).await {
                warn!("Failed to update site cache: {}", e);
            }
        }
    }

    /// A username that used to resolve may have been renamed; follow its site id.
    async fn report_missing(&self, username: &str) {
        let Some(cache) = &self.site_cache else {
            return;
        };
        let entry = match cache.find_by_username(username).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read site cache: {}", e);
                return;
            }
        };

        match self.orchestrator.lookup_username(entry.site_id).await {
            Ok(current) if current != username => {
                info!(
                    "{} was site {}, which now belongs to {}",
                    username, entry.site_id, current
                );
            }
            Ok(_) => {}
            Err(e) => trace!("Reverse lookup of site {} failed: {}", entry.site_id, e),
        }

        if let Err(e) = cache
            .record(username, entry.site_id, Some(STATUS_NOT_FOUND))
            .await
        {
            warn!("Failed to update site cache: {}", e);
        }
    }
}
