//! Local state filter.
//!
//! Dedup compares stable identities against filename stems found on disk.
//! It does not hash contents: a corrupted file with the right name counts as
//! present.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::vsco::error::{VscoError, VscoResult};
use crate::vsco::media::MediaItem;
use crate::vsco::transport::PART_EXTENSION;

/// Subdirectory holding the profile picture
pub const PROFILE_DIR: &str = "profile";

/// Identities already materialized under a destination directory
#[derive(Debug, Default, Clone)]
pub struct LocalInventory {
    identities: HashSet<String>,
}

impl LocalInventory {
    /// Scan `dir` and `dir/profile`. Missing directories count as empty.
    ///
    /// Leftover `.part` files from interrupted downloads are deleted.
    pub async fn scan(dir: &Path) -> VscoResult<Self> {
        Self::scan_with(dir, false).await
    }

    /// Like [`LocalInventory::scan`]; with `skip_empty` set, zero-length files
    /// are not treated as present so they get fetched again.
    pub async fn scan_with(dir: &Path, skip_empty: bool) -> VscoResult<Self> {
        let mut inventory = Self::default();
        inventory.add_entries(dir, skip_empty).await?;
        inventory.add_entries(&dir.join(PROFILE_DIR), skip_empty).await?;
        debug!("Found {} local files under {}", inventory.len(), dir.display());
        Ok(inventory)
    }

    async fn add_entries(&mut self, dir: &Path, skip_empty: bool) -> VscoResult<()> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(VscoError::filesystem(dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VscoError::filesystem(dir, e))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| VscoError::filesystem(entry.path(), e))?;
            if metadata.is_dir() || (skip_empty && metadata.len() == 0) {
                continue;
            }

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == PART_EXTENSION) {
                match fs::remove_file(&path).await {
                    Ok(()) => debug!("Removed stale partial download {}", path.display()),
                    Err(e) => warn!("Failed to remove partial download {}: {}", path.display(), e),
                }
                continue;
            }
            if let Some(stem) = path.file_stem() {
                self.identities.insert(stem.to_string_lossy().into_owned());
            }
        }

        Ok(())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.identities.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Keep items whose identity is not on disk. Items without an identity
    /// are kept so the pool can report them as skipped.
    pub fn retain_new(&self, catalog: Vec<MediaItem>) -> Vec<MediaItem> {
        catalog
            .into_iter()
            .filter(|item| match item.identity() {
                Some(identity) => !self.contains(&identity),
                None => true,
            })
            .collect()
    }
}

/// Remove already-downloaded items from `catalog`.
pub async fn filter_new(catalog: Vec<MediaItem>, dir: &Path) -> VscoResult<Vec<MediaItem>> {
    filter_new_with(catalog, dir, false).await
}

pub async fn filter_new_with(
    catalog: Vec<MediaItem>,
    dir: &Path,
    skip_empty: bool,
) -> VscoResult<Vec<MediaItem>> {
    let inventory = LocalInventory::scan_with(dir, skip_empty).await?;
    let fetched = catalog.len();
    let fresh = inventory.retain_new(catalog);

    info!(
        "Filtered {} existing files, {} new files to download",
        fetched - fresh.len(),
        fresh.len()
    );
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsco::media::ImageItem;
    use crate::vsco::testing::StubTransport;

    fn image(id: &str) -> MediaItem {
        MediaItem::Image(ImageItem {
            id: Some(id.to_string()),
            is_video_flag: false,
            video_url: None,
            image_url: format!("example.com/{}.jpg", id),
            upload_date_millis: 1_600_000_000_000,
        })
    }

    fn catalog() -> Vec<MediaItem> {
        vec![image("img1"), image("img2"), image("img3")]
    }

    fn ids(items: &[MediaItem]) -> Vec<String> {
        items.iter().filter_map(MediaItem::identity).collect()
    }

    #[tokio::test]
    async fn test_empty_directory_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = filter_new(catalog(), dir.path()).await.unwrap();
        assert_eq!(fresh.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_directory_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = filter_new(catalog(), &dir.path().join("nobody")).await.unwrap();
        assert_eq!(fresh.len(), 3);
    }

    #[tokio::test]
    async fn test_existing_file_is_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img1.jpg"), b"x").unwrap();

        let fresh = filter_new(catalog(), dir.path()).await.unwrap();
        assert_eq!(ids(&fresh), ["img2", "img3"]);
    }

    #[tokio::test]
    async fn test_profile_directory_and_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PROFILE_DIR)).unwrap();
        std::fs::write(dir.path().join(PROFILE_DIR).join("img2.jpg"), b"x").unwrap();
        // a directory named like an identity is not a materialized item
        std::fs::create_dir_all(dir.path().join("img3")).unwrap();

        let fresh = filter_new(catalog(), dir.path()).await.unwrap();
        assert_eq!(ids(&fresh), ["img1", "img3"]);
    }

    #[tokio::test]
    async fn test_filter_is_idempotent_and_sees_new_saves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img3.png"), b"x").unwrap();

        let first = filter_new(catalog(), dir.path()).await.unwrap();
        let second = filter_new(catalog(), dir.path()).await.unwrap();
        assert_eq!(first, second);

        let transport = StubTransport::new();
        first[0].save(&transport, dir.path()).await.unwrap();

        let third = filter_new(catalog(), dir.path()).await.unwrap();
        assert_eq!(ids(&third), ["img2"]);
    }

    #[tokio::test]
    async fn test_skip_empty_refetches_zero_length_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img1.jpg"), b"").unwrap();
        std::fs::write(dir.path().join("img2.jpg"), b"data").unwrap();

        let lenient = filter_new(catalog(), dir.path()).await.unwrap();
        assert_eq!(ids(&lenient), ["img3"]);

        let strict = filter_new_with(catalog(), dir.path(), true).await.unwrap();
        assert_eq!(ids(&strict), ["img1", "img3"]);
    }

    #[tokio::test]
    async fn test_stale_partial_downloads_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img1.jpg.part"), b"half").unwrap();
        std::fs::write(dir.path().join("img2.jpg"), b"x").unwrap();

        let fresh = filter_new(catalog(), dir.path()).await.unwrap();
        assert_eq!(ids(&fresh), ["img1", "img3"]);
        assert!(!dir.path().join("img1.jpg.part").exists());
        assert!(dir.path().join("img2.jpg").exists());
    }

    #[test]
    fn test_items_without_identity_survive() {
        let mut inventory = LocalInventory::default();
        inventory.identities.insert("img1".to_string());
        let fresh = inventory.retain_new(vec![
            image("img1"),
            MediaItem::Unknown { tag: "article".to_string() },
        ]);
        assert_eq!(fresh, vec![MediaItem::Unknown { tag: "article".to_string() }]);
    }
}
