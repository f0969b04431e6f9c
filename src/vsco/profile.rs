//! Profile orchestrator: username resolution and the per-profile save runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::vsco::catalog::{CatalogConfig, CatalogFetcher};
use crate::vsco::endpoints::Endpoints;
use crate::vsco::error::{VscoError, VscoResult};
use crate::vsco::inventory::{PROFILE_DIR, filter_new_with};
use crate::vsco::media::normalize_url;
use crate::vsco::pool::{BatchResult, DownloadPool, NoProgress, ProgressSink};
use crate::vsco::transport::Transport;

/// Query parameters that downscale the profile picture
const PROFILE_IMAGE_SIZE_PARAMS: &[&str] = &["w", "h"];

/// A username resolved to its site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileIdentity {
    pub username: String,
    pub site_id: u64,
    pub profile_image_url: String,
}

#[derive(Debug, Deserialize)]
struct SitesResponse {
    #[serde(default)]
    sites: Vec<Site>,
}

#[derive(Debug, Deserialize)]
struct Site {
    id: u64,
    #[serde(default)]
    profile_image: String,
}

#[derive(Debug, Deserialize)]
struct SubdomainPage {
    #[serde(default)]
    media: Vec<SubdomainEntry>,
}

#[derive(Debug, Deserialize)]
struct SubdomainEntry {
    #[serde(default)]
    perma_subdomain: String,
}

/// Drives identity resolution, full-catalog saves and profile picture saves.
pub struct ProfileOrchestrator {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    fetcher: CatalogFetcher,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    refetch_empty_files: bool,
}

impl ProfileOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, catalog: CatalogConfig) -> Self {
        let fetcher = CatalogFetcher::new(transport.clone(), endpoints.clone(), catalog);
        Self {
            transport,
            endpoints,
            fetcher,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
            refetch_empty_files: false,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Treat zero-length local files as missing when filtering.
    pub fn with_refetch_empty_files(mut self, refetch: bool) -> Self {
        self.refetch_empty_files = refetch;
        self
    }

    /// Resolve a username. `Ok(None)` means no site matched.
    #[instrument(skip(self))]
    pub async fn resolve_identity(&self, username: &str) -> VscoResult<Option<ProfileIdentity>> {
        let url = self.endpoints.sites(username)?;
        let response = self.transport.get(&url).await?;

        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(VscoError::Status {
                url,
                status: response.status,
            });
        }

        let body: SitesResponse = response.json()?;
        let Some(site) = body.sites.into_iter().next() else {
            return Ok(None);
        };

        debug!("Resolved {} to site {}", username, site.id);
        Ok(Some(ProfileIdentity {
            username: username.to_string(),
            site_id: site.id,
            profile_image_url: site.profile_image,
        }))
    }

    /// Reverse lookup: the username owning `site_id`, read from its newest post.
    #[instrument(skip(self))]
    pub async fn lookup_username(&self, site_id: u64) -> VscoResult<String> {
        let url = self
            .endpoints
            .medias_page(site_id, 1, self.fetcher.config().first_page)?;
        let response = self.transport.get(&url).await?;
        if !response.is_success() {
            return Err(VscoError::Status {
                url,
                status: response.status,
            });
        }

        let page: SubdomainPage = response.json()?;
        let entry = page
            .media
            .into_iter()
            .next()
            .ok_or_else(|| VscoError::Decode(format!("no media found for site {}", site_id)))?;
        if entry.perma_subdomain.is_empty() {
            return Err(VscoError::Decode("empty perma_subdomain in response".to_string()));
        }
        Ok(entry.perma_subdomain)
    }

    /// `<root>/<username>`
    pub fn user_dir(destination_root: &Path, identity: &ProfileIdentity) -> PathBuf {
        destination_root.join(&identity.username)
    }

    /// Fetch the whole catalog, drop what is already on disk and save the rest.
    ///
    /// Catalog and directory failures abort the profile; per-item failures
    /// only show up in the returned counts.
    #[instrument(skip(self, identity, destination_root), fields(username = %identity.username))]
    pub async fn save_all_media(
        &self,
        identity: &ProfileIdentity,
        destination_root: &Path,
        worker_count: usize,
    ) -> VscoResult<BatchResult> {
        let catalog = self.fetcher.fetch_catalog(identity).await?;

        let user_dir = Self::user_dir(destination_root, identity);
        tokio::fs::create_dir_all(&user_dir)
            .await
            .map_err(|e| VscoError::filesystem(&user_dir, e))?;

        let fresh = filter_new_with(catalog, &user_dir, self.refetch_empty_files).await?;
        info!("Downloading {} new media items for {}", fresh.len(), identity.username);

        self.progress.profile(&identity.username);
        let pool = DownloadPool::new(self.transport.clone(), worker_count)
            .with_progress(self.progress.clone())
            .with_cancellation(self.cancel.clone());
        Ok(pool.run(fresh, &user_dir).await)
    }

    /// Save the full-size profile picture to `<root>/<username>/profile/<username>.jpg`.
    #[instrument(skip(self, identity, destination_root), fields(username = %identity.username))]
    pub async fn save_profile_picture(
        &self,
        identity: &ProfileIdentity,
        destination_root: &Path,
    ) -> VscoResult<PathBuf> {
        if identity.profile_image_url.is_empty() {
            return Err(VscoError::UnsupportedMedia(format!(
                "{} has no profile picture",
                identity.username
            )));
        }

        let profile_dir = Self::user_dir(destination_root, identity).join(PROFILE_DIR);
        tokio::fs::create_dir_all(&profile_dir)
            .await
            .map_err(|e| VscoError::filesystem(&profile_dir, e))?;

        let url = full_size_url(&identity.profile_image_url)?;
        let path = profile_dir.join(format!("{}.jpg", identity.username));
        self.transport.download_to(&url, &path).await?;

        info!("Saved profile picture to {}", path.display());
        Ok(path)
    }
}

/// Drop the sizing parameters so the full resolution is served.
fn full_size_url(raw: &str) -> VscoResult<String> {
    let normalized = normalize_url(raw);
    let mut url = Url::parse(&normalized).map_err(|source| VscoError::InvalidUrl {
        url: normalized.clone(),
        source,
    })?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            let key: &str = key;
            !PROFILE_IMAGE_SIZE_PARAMS.contains(&key)
        })
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    Ok(url.into())
}
