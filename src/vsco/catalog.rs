//! Catalog fetcher.
//!
//! Walks the profile's media endpoint page by page and decodes every entry
//! into a [`MediaItem`]. Paging is sequential since each request depends on
//! the previous response.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::vsco::endpoints::Endpoints;
use crate::vsco::error::{VscoError, VscoResult};
use crate::vsco::media::MediaItem;
use crate::vsco::profile::ProfileIdentity;
use crate::vsco::transport::{Transport, TransportResponse};

/// Pagination strategy of the catalog endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pagination {
    /// Numbered pages, ending on a short page or once `total` entries arrived
    Offset,
    /// Opaque cursor tokens, ending on an empty token
    Cursor,
}

/// Catalog fetcher configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub pagination: Pagination,
    pub page_size: usize,
    /// Number of the first offset page
    pub first_page: usize,
    /// Attempts per page, including the first one
    pub retry_count: usize,
    pub retry_delay: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            pagination: Pagination::Cursor,
            page_size: 30,
            first_page: 0,
            retry_count: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Wire shape shared by both endpoint generations
#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    media: Vec<Value>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Ordered, append-only list of items, unique by stable identity.
#[derive(Debug, Default)]
pub struct Catalog {
    items: Vec<MediaItem>,
    identities: HashSet<String>,
}

impl Catalog {
    /// Append an item. Returns false when its identity is already present.
    pub fn push(&mut self, item: MediaItem) -> bool {
        if let Some(identity) = item.identity() {
            if !self.identities.insert(identity.clone()) {
                if item.has_derived_identity() {
                    warn!(
                        "Dropping item uploaded in the same second as another ({}); only one can be saved",
                        identity
                    );
                } else {
                    debug!("Dropping duplicate catalog entry {}", identity);
                }
                return false;
            }
        }
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<MediaItem> {
        self.items
    }
}

/// Pages through a profile's catalog
pub struct CatalogFetcher {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    config: CatalogConfig,
}

impl CatalogFetcher {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, config: CatalogConfig) -> Self {
        Self {
            transport,
            endpoints,
            config: CatalogConfig {
                page_size: config.page_size.max(1),
                retry_count: config.retry_count.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Fetch the full catalog of a profile.
    ///
    /// Entries that fail to decode are logged and dropped. A page that cannot
    /// be fetched after the configured attempts aborts the whole fetch.
    #[instrument(skip(self, identity), fields(username = %identity.username, site_id = identity.site_id))]
    pub async fn fetch_catalog(&self, identity: &ProfileIdentity) -> VscoResult<Vec<MediaItem>> {
        let page_size = self.config.page_size;
        let mut catalog = Catalog::default();
        let mut received = 0u64;
        let mut page = self.config.first_page;
        let mut pages = 0usize;
        let mut cursor: Option<String> = None;

        loop {
            let url = match self.config.pagination {
                Pagination::Offset => self.endpoints.medias_page(identity.site_id, page_size, page)?,
                Pagination::Cursor => {
                    self.endpoints
                        .medias_cursor(identity.site_id, page_size, cursor.as_deref())?
                }
            };

            let body: CatalogPage = self.fetch_page(&url).await?.json()?;
            pages += 1;
            let entries = body.media.len();
            received += entries as u64;

            for (index, entry) in body.media.into_iter().enumerate() {
                match MediaItem::decode(entry) {
                    Ok(item) => {
                        catalog.push(item);
                    }
                    Err(e) => warn!("Dropping entry {} of page {}: {}", index, pages, e),
                }
            }

            info!("Page {}: found {} media items (total: {})", pages, entries, catalog.len());

            let more = match self.config.pagination {
                Pagination::Offset => {
                    entries >= page_size && body.total.is_none_or(|total| received < total)
                }
                Pagination::Cursor => match body.next_cursor.filter(|c| !c.is_empty()) {
                    Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                        warn!("Server repeated cursor {}, stopping pagination", next);
                        false
                    }
                    Some(next) => {
                        cursor = Some(next);
                        true
                    }
                    None => false,
                },
            };

            if !more {
                break;
            }
            page += 1;
        }

        info!("Catalog complete: {} items over {} pages", catalog.len(), pages);
        Ok(catalog.into_items())
    }

    /// GET one page, retrying transient failures with a fixed delay.
    async fn fetch_page(&self, url: &str) -> VscoResult<TransportResponse> {
        let max_attempts = self.config.retry_count;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let err = match self.transport.get(url).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => VscoError::Status {
                    url: url.to_string(),
                    status: response.status,
                },
                Err(e) => e,
            };

            if !err.is_retryable() || attempts >= max_attempts {
                return Err(err);
            }

            warn!(
                "Page request failed (attempt {}/{}): {}",
                attempts, max_attempts, err
            );
            sleep(self.config.retry_delay).await;
        }
    }
}
