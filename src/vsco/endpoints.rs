//! URL construction for the third-party API.

use url::Url;

use crate::vsco::error::{VscoError, VscoResult};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://vsco.co/api";

/// Builds request URLs relative to a configurable API root.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build(&self, path: &str, params: &[(&str, String)]) -> VscoResult<String> {
        let raw = format!("{}{}", self.base_url, path);
        let mut url = Url::parse(&raw).map_err(|source| VscoError::InvalidUrl { url: raw, source })?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url.into())
    }

    /// Identity endpoint: sites registered under a subdomain
    pub fn sites(&self, username: &str) -> VscoResult<String> {
        self.build("/2.0/sites", &[("subdomain", username.to_string())])
    }

    /// Offset-paginated catalog page
    pub fn medias_page(&self, site_id: u64, size: usize, page: usize) -> VscoResult<String> {
        self.build(
            "/2.0/medias",
            &[
                ("site_id", site_id.to_string()),
                ("size", size.to_string()),
                ("page", page.to_string()),
            ],
        )
    }

    /// Cursor-paginated catalog page. The first request carries no cursor.
    pub fn medias_cursor(&self, site_id: u64, limit: usize, cursor: Option<&str>) -> VscoResult<String> {
        let mut params = vec![("site_id", site_id.to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.build("/3.0/medias/profile", &params)
    }
}
