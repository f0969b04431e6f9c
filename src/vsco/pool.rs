//! Bounded download pool.
//!
//! One task per item, admitted through a counting semaphore so at most
//! `worker_count` saves run at once. A failing save is logged and counted and
//! never stops its siblings; `run` returns only after every item is accounted for.

use std::fmt;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::vsco::error::VscoResult;
use crate::vsco::media::{MediaItem, SaveOutcome};
use crate::vsco::transport::Transport;

/// Receives the completed-item count as saves finish.
pub trait ProgressSink: Send + Sync {
    /// A new profile's batch is about to start.
    fn profile(&self, _username: &str) {}

    fn start(&self, _total: usize) {}

    /// `completed` increases by one per finished item, whatever its outcome.
    fn advance(&self, completed: usize);

    fn finish(&self) {}
}

/// Progress sink that discards updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _completed: usize) {}
}

/// End-of-batch tally
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.cancelled
    }

    fn record(&mut self, joined: Result<(String, ItemOutcome), JoinError>) {
        match joined {
            Ok((_, ItemOutcome::Finished(Ok(SaveOutcome::Saved(path))))) => {
                debug!("Saved {}", path.display());
                self.succeeded += 1;
            }
            Ok((label, ItemOutcome::Finished(Ok(SaveOutcome::Skipped(reason))))) => {
                debug!("Skipped {}: {}", label, reason);
                self.skipped += 1;
            }
            Ok((label, ItemOutcome::Finished(Err(e)))) => {
                error!("Error downloading {}: {}", label, e);
                self.failed += 1;
            }
            Ok((label, ItemOutcome::Cancelled)) => {
                debug!("Cancelled {}", label);
                self.cancelled += 1;
            }
            Err(e) => {
                error!("Download task aborted: {}", e);
                self.failed += 1;
            }
        }
    }
}

impl AddAssign for BatchResult {
    fn add_assign(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )?;
        if self.cancelled > 0 {
            write!(f, ", {} cancelled", self.cancelled)?;
        }
        Ok(())
    }
}

enum ItemOutcome {
    Finished(VscoResult<SaveOutcome>),
    Cancelled,
}

/// Fixed-concurrency executor for media saves
pub struct DownloadPool {
    transport: Arc<dyn Transport>,
    worker_count: usize,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl DownloadPool {
    pub fn new(transport: Arc<dyn Transport>, worker_count: usize) -> Self {
        Self {
            transport,
            worker_count: worker_count.max(1),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Once `cancel` fires, queued items are never started and in-flight saves are dropped.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Save every item into `dir`.
    #[instrument(skip(self, items, dir), fields(items = items.len(), workers = self.worker_count))]
    pub async fn run(&self, items: Vec<MediaItem>, dir: &Path) -> BatchResult {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let completed = Arc::new(AtomicUsize::new(0));
        let dir: Arc<PathBuf> = Arc::new(dir.to_path_buf());
        let mut tasks = JoinSet::new();
        let mut result = BatchResult::default();

        self.progress.start(total);

        let mut items = items.into_iter();
        while let Some(item) = items.next() {
            // Admission happens before spawning, so idle tasks never pile up
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let unstarted = 1 + items.len();
                warn!("Cancelled before starting {} queued items", unstarted);
                result.cancelled += unstarted;
                break;
            };

            let transport = self.transport.clone();
            let progress = self.progress.clone();
            let cancel = self.cancel.clone();
            let completed = completed.clone();
            let dir = dir.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let label = item.identity().unwrap_or_else(|| "unidentified entry".to_string());

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => ItemOutcome::Cancelled,
                    saved = item.save(transport.as_ref(), &dir) => ItemOutcome::Finished(saved),
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.advance(done);
                (label, outcome)
            });

            while let Some(joined) = tasks.try_join_next() {
                result.record(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            result.record(joined);
        }

        self.progress.finish();
        info!("Batch finished: {}", result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsco::media::ImageItem;
    use crate::vsco::testing::StubTransport;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Duration;

    fn image(n: usize) -> MediaItem {
        MediaItem::Image(ImageItem {
            id: Some(format!("img{}", n)),
            is_video_flag: false,
            video_url: None,
            image_url: format!("example.com/img{}.jpg", n),
            upload_date_millis: 1_600_000_000_000,
        })
    }

    fn images(count: usize) -> Vec<MediaItem> {
        (1..=count).map(image).collect()
    }

    #[derive(Default)]
    struct RecordingProgress {
        total: AtomicUsize,
        seen: Mutex<Vec<usize>>,
    }

    impl ProgressSink for RecordingProgress {
        fn start(&self, total: usize) {
            self.total.store(total, Ordering::SeqCst);
        }

        fn advance(&self, completed: usize) {
            self.seen.lock().unwrap().push(completed);
        }
    }

    #[tokio::test]
    async fn test_saves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new());
        let result = DownloadPool::new(transport, 2).run(images(3), dir.path()).await;

        assert_eq!(
            result,
            BatchResult {
                succeeded: 3,
                ..BatchResult::default()
            }
        );
        for n in 1..=3 {
            assert!(dir.path().join(format!("img{}.jpg", n)).exists());
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let transport =
            Arc::new(StubTransport::new().with_download_delay(Duration::from_millis(20)));
        let result = DownloadPool::new(transport.clone(), 3)
            .run(images(20), dir.path())
            .await;

        assert_eq!(result.succeeded, 20);
        assert_eq!(transport.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new().fail_download("https://example.com/img3.jpg"));
        let result = DownloadPool::new(transport.clone(), 2)
            .run(images(5), dir.path())
            .await;

        assert_eq!(result.succeeded, 4);
        assert_eq!(result.failed, 1);
        assert_eq!(transport.requested_downloads().len(), 5);
    }

    #[tokio::test]
    async fn test_skips_are_counted_separately() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new());
        let mut items = images(2);
        items.push(MediaItem::Unknown { tag: "article".to_string() });

        let result = DownloadPool::new(transport, 4).run(items, dir.path()).await;
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.to_string(), "2 saved, 1 skipped, 0 failed");
    }

    #[tokio::test]
    async fn test_progress_counts_every_item() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new().fail_download("https://example.com/img2.jpg"));
        let progress = Arc::new(RecordingProgress::default());

        DownloadPool::new(transport, 2)
            .with_progress(progress.clone())
            .run(images(4), dir.path())
            .await;

        assert_eq!(progress.total.load(Ordering::SeqCst), 4);
        let seen: BTreeSet<usize> = progress.seen.lock().unwrap().iter().copied().collect();
        assert_eq!(seen, (1..=4).collect::<BTreeSet<_>>());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = DownloadPool::new(transport.clone(), 2)
            .with_cancellation(cancel)
            .run(images(3), dir.path())
            .await;

        assert_eq!(result.cancelled, 3);
        assert!(transport.requested_downloads().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_accounts_for_every_item() {
        let dir = tempfile::tempdir().unwrap();
        let transport =
            Arc::new(StubTransport::new().with_download_delay(Duration::from_millis(50)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            trigger.cancel();
        });

        let result = DownloadPool::new(transport, 1)
            .with_cancellation(cancel)
            .run(images(6), dir.path())
            .await;

        assert_eq!(result.total(), 6);
        assert!(result.cancelled >= 1);
        assert!(result.succeeded < 6);
    }

    #[test]
    fn test_results_accumulate() {
        let mut total = BatchResult {
            succeeded: 2,
            failed: 1,
            ..BatchResult::default()
        };
        total += BatchResult {
            succeeded: 1,
            skipped: 3,
            cancelled: 1,
            ..BatchResult::default()
        };
        assert_eq!(total.total(), 8);
        assert_eq!(total.to_string(), "3 saved, 3 skipped, 1 failed, 1 cancelled");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let result = DownloadPool::new(Arc::new(StubTransport::new()), 0)
            .run(Vec::new(), dir.path())
            .await;
        assert_eq!(result, BatchResult::default());
    }
}
