//! In-memory [`Transport`] used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::vsco::error::{VscoError, VscoResult};
use crate::vsco::transport::{Transport, TransportResponse};

/// Canned reply for a GET
#[derive(Debug, Clone)]
pub(crate) enum StubReply {
    Json(StatusCode, String),
    NetworkError,
}

impl StubReply {
    pub(crate) fn ok(body: serde_json::Value) -> Self {
        StubReply::Json(StatusCode::OK, body.to_string())
    }
}

/// Routes GETs by exact URL. Each route is a queue; the last reply repeats.
/// Downloads write the URL into the target file, optionally after a delay,
/// while tracking how many run at once.
#[derive(Default)]
pub(crate) struct StubTransport {
    routes: Mutex<HashMap<String, VecDeque<StubReply>>>,
    failing_downloads: HashSet<String>,
    download_delay: Duration,
    gets: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(self, url: impl Into<String>, reply: StubReply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn fail_download(mut self, url: impl Into<String>) -> Self {
        self.failing_downloads.insert(url.into());
        self
    }

    pub(crate) fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub(crate) fn requested_gets(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    pub(crate) fn requested_downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, url: &str) -> VscoResult<TransportResponse> {
        self.gets.lock().unwrap().push(url.to_string());

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(StubReply::Json(status, body)) => Ok(TransportResponse::new(status, body)),
            Some(StubReply::NetworkError) => Err(VscoError::transport(url, "connection reset")),
            None => Ok(TransportResponse::new(StatusCode::NOT_FOUND, Vec::new())),
        }
    }

    async fn download_to(&self, url: &str, path: &Path) -> VscoResult<u64> {
        self.downloads.lock().unwrap().push(url.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_downloads.contains(url) {
            return Err(VscoError::Status {
                url: url.to_string(),
                status: StatusCode::INTERNAL_SERVER_ERROR,
            });
        }

        tokio::fs::write(path, url.as_bytes())
            .await
            .map_err(|e| VscoError::filesystem(path, e))?;
        Ok(url.len() as u64)
    }
}
