//! Media acquisition pipeline.
//! Resolves a profile, pages through its catalog, drops what is already on
//! disk and saves the rest through a bounded pool.

pub mod catalog;
pub mod endpoints;
pub mod error;
pub mod inventory;
pub mod media;
pub mod pool;
pub mod profile;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use catalog::{Catalog, CatalogConfig, CatalogFetcher, Pagination};
pub use endpoints::{DEFAULT_BASE_URL, Endpoints};
pub use error::{VscoError, VscoResult};
pub use inventory::{LocalInventory, PROFILE_DIR, filter_new, filter_new_with};
pub use media::{ImageItem, MediaItem, SaveOutcome, VideoItem};
pub use pool::{BatchResult, DownloadPool, NoProgress, ProgressSink};
pub use profile::{ProfileIdentity, ProfileOrchestrator};
pub use transport::{HttpTransport, Transport, TransportConfig, TransportResponse};
