//! Username to site id cache.
//!
//! Plain text, one `username | site_id [| status]` line per profile. The
//! cache never replaces live resolution; it remembers site ids so renamed
//! profiles can still be traced.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::vsco::{VscoError, VscoResult};

/// Status recorded for usernames that no longer resolve
pub const STATUS_NOT_FOUND: &str = "not_found";

/// One cache line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub username: String,
    pub site_id: u64,
    pub status: Option<String>,
}

impl CacheEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split('|').map(str::trim);
        let username = parts.next().filter(|u| !u.is_empty())?.to_string();
        let site_id = parts.next()?.parse().ok()?;
        let status = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        Some(Self {
            username,
            site_id,
            status,
        })
    }

    fn render(&self) -> String {
        match &self.status {
            Some(status) => format!("{} | {} | {}", self.username, self.site_id, status),
            None => format!("{} | {}", self.username, self.site_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteCache {
    path: PathBuf,
}

impl SiteCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_raw(&self) -> VscoResult<String> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(VscoError::filesystem(&self.path, e)),
        }
    }

    /// All well-formed entries. A missing file is an empty cache.
    pub async fn entries(&self) -> VscoResult<Vec<CacheEntry>> {
        let content = self.read_raw().await?;

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let entry = CacheEntry::parse(line);
                if entry.is_none() {
                    debug!("Ignoring malformed cache line: {}", line);
                }
                entry
            })
            .collect())
    }

    pub async fn find_by_username(&self, username: &str) -> VscoResult<Option<CacheEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|entry| entry.username == username))
    }

    pub async fn find_by_site_id(&self, site_id: u64) -> VscoResult<Option<CacheEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|entry| entry.site_id == site_id && entry.status.is_none()))
    }

    /// Insert or replace the line for `username`. Other lines are kept as they are.
    pub async fn record(&self, username: &str, site_id: u64, status: Option<&str>) -> VscoResult<()> {
        let updated = CacheEntry {
            username: username.to_string(),
            site_id,
            status: status.map(str::to_string),
        }
        .render();

        let content = self.read_raw().await?;
        let mut found = false;
        let mut lines: Vec<String> = Vec::new();
        for line in content.lines().filter(|line| !line.is_empty()) {
            if line_username(line) == username {
                if !found {
                    lines.push(updated.clone());
                }
                found = true;
            } else {
                lines.push(line.to_string());
            }
        }
        if !found {
            lines.push(updated);
        }

        let mut content = lines.join("\n");
        content.push('\n');

        fs::write(&self.path, content)
            .await
            .map_err(|e| VscoError::filesystem(&self.path, e))
    }
}

/// First `|` field of a line, trimmed
fn line_username(line: &str) -> &str {
    line.split('|').next().unwrap_or_default().trim()
}
