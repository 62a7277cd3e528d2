// File stores: where dataset files come from

use crate::core::error::{DatasetError, Result};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Source of raw dataset files. `Ok(None)` means the file does not exist,
/// which the locator uses as an end-of-scan signal.
pub trait DatasetStore: Send + Sync + 'static {
    fn fetch(
        &self,
        dataset: &str,
        path: &str,
    ) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}

pub const DEFAULT_HUB_URL: &str = "https://huggingface.co/datasets";

#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, dataset: &str, path: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.base_url, dataset, path)
    }
}

impl DatasetStore for HttpStore {
    async fn fetch(&self, dataset: &str, path: &str) -> Result<Option<Bytes>> {
        let url = self.url_for(dataset, path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DatasetError::TransientFetch {
                path: path.to_string(),
                attempts: 1,
                reason: format!("server returned {}", status),
            });
        }

        let body = response.error_for_status()?.bytes().await?;
        Ok(Some(body))
    }
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DatasetStore for LocalStore {
    async fn fetch(&self, dataset: &str, path: &str) -> Result<Option<Bytes>> {
        let full = self.root.join(dataset).join(path);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests. Paths can be marked as failing to
/// exercise the retry and skip paths.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<(String, String), Bytes>>,
    failing: Mutex<HashSet<(String, String)>>,
    fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, dataset: &str, path: &str, data: impl Into<Bytes>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert((dataset.to_string(), path.to_string()), data.into());
        }
    }

    pub fn fail(&self, dataset: &str, path: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert((dataset.to_string(), path.to_string()));
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl DatasetStore for MemoryStore {
    async fn fetch(&self, dataset: &str, path: &str) -> Result<Option<Bytes>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let key = (dataset.to_string(), path.to_string());

        let failing = self
            .failing
            .lock()
            .map(|failing| failing.contains(&key))
            .unwrap_or(false);
        if failing {
            return Err(DatasetError::TransientFetch {
                path: path.to_string(),
                attempts: 1,
                reason: "simulated failure".to_string(),
            });
        }

        Ok(self
            .files
            .lock()
            .ok()
            .and_then(|files| files.get(&key).cloned()))
    }
}

impl<S: DatasetStore> DatasetStore for Arc<S> {
    fn fetch(
        &self,
        dataset: &str,
        path: &str,
    ) -> impl Future<Output = Result<Option<Bytes>>> + Send {
        self.as_ref().fetch(dataset, path)
    }
}

/// Store picked at startup from configuration.
pub enum AnyStore {
    Http(HttpStore),
    Local(LocalStore),
}

impl DatasetStore for AnyStore {
    async fn fetch(&self, dataset: &str, path: &str) -> Result<Option<Bytes>> {
        match self {
            AnyStore::Http(store) => store.fetch(dataset, path).await,
            AnyStore::Local(store) => store.fetch(dataset, path).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(30),
            backoff: Duration::from_millis(200),
        }
    }
}

/// Fetches with a per-attempt timeout and a bounded number of retries on
/// transient failures. Missing files are returned immediately.
pub async fn fetch_with_retry<S: DatasetStore>(
    store: &S,
    dataset: &str,
    path: &str,
    policy: &FetchPolicy,
) -> Result<Option<Bytes>> {
    let attempts = policy.attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, store.fetch(dataset, path)).await {
            Ok(Ok(found)) => return Ok(found),
            Ok(Err(e)) if e.is_transient() => {
                warn!("fetch {} attempt {}/{} failed: {}", path, attempt, attempts, e);
                last_reason = e.to_string();
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!("fetch {} attempt {}/{} timed out", path, attempt, attempts);
                last_reason = format!("timed out after {:?}", policy.timeout);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.backoff * attempt).await;
        }
    }

    Err(DatasetError::TransientFetch {
        path: path.to_string(),
        attempts,
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_policy() -> FetchPolicy {
        FetchPolicy {
            attempts: 3,
            timeout: Duration::from_secs(1),
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let store = MemoryStore::new();
        let found = fetch_with_retry(&store, "org/ds", "meta/info.json", &quick_policy())
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_attempts() {
        let store = MemoryStore::new();
        store.fail("org/ds", "data.parquet");
        let err = fetch_with_retry(&store, "org/ds", "data.parquet", &quick_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::TransientFetch { attempts: 3, .. }));
        assert_eq!(store.fetch_count(), 3);
    }

    #[test]
    fn test_hub_url() {
        let store = HttpStore::new("https://example.org/datasets/");
        assert_eq!(
            store.url_for("org/ds", "meta/info.json"),
            "https://example.org/datasets/org/ds/resolve/main/meta/info.json"
        );
    }
}
