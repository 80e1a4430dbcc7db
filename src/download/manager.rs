use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::header::RANGE;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::utils::errors::FeedError;

/// Lifecycle of one video resource as far as the feed is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceState {
    NotRequested,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupSettings {
    /// Warm requests allowed in flight at once
    pub max_parallel: usize,
    /// Leading bytes fetched per resource
    pub warm_bytes: u64,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            max_parallel: 2,
            warm_bytes: 1024 * 1024,
        }
    }
}

/// Fetches the head of upcoming videos in the background so the player finds them
/// in the HTTP cache.
///
/// Warming is an optimisation only: failures are logged and recorded as `Failed`,
/// never reported. A small semaphore keeps warm requests from crowding out the
/// resource that is actually playing.
pub struct WarmupManager {
    client: Client,
    settings: WarmupSettings,
    states: Arc<Mutex<HashMap<String, ResourceState>>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl WarmupManager {
    pub fn new(client: Client, settings: WarmupSettings) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(settings.max_parallel.max(1))),
            settings,
            states: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self, url: &str) -> ResourceState {
        self.states
            .lock()
            .get(url)
            .copied()
            .unwrap_or(ResourceState::NotRequested)
    }

    pub fn in_flight(&self) -> usize {
        self.states
            .lock()
            .values()
            .filter(|state| **state == ResourceState::Loading)
            .count()
    }

    /// Starts warming every url that is not already loading or loaded.
    /// Must be called from within a tokio runtime.
    pub fn warm(&self, urls: impl IntoIterator<Item = String>) {
        for url in urls {
            // 1) Skip resources that are loaded enough or already on their way.
            {
                let mut states = self.states.lock();
                if matches!(
                    states.get(&url),
                    Some(ResourceState::Loading | ResourceState::Ready)
                ) {
                    continue;
                }
                states.insert(url.clone(), ResourceState::Loading);
            }

            // 2) Fetch in the background, bounded by the semaphore.
            let client = self.client.clone();
            let permits = Arc::clone(&self.permits);
            let states = Arc::clone(&self.states);
            let cancel = self.cancel.clone();
            let warm_bytes = self.settings.warm_bytes;

            tokio::spawn(async move {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = warm_resource(&client, &permits, &url, warm_bytes) => result,
                };

                // 3) Record the result unless the list it belonged to is gone.
                let next = match outcome {
                    Ok(received) => {
                        debug!("Warmed {url} ({received} bytes)");
                        ResourceState::Ready
                    }
                    Err(e) => {
                        debug!("Warm-up of {url} failed: {e}");
                        ResourceState::Failed
                    }
                };
                record_outcome(&states, &cancel, url, next);
            });
        }
    }

    /// Abandons every in-flight warm request and forgets all resource states.
    /// Used when the feed switches to another list.
    pub fn cancel_all(&mut self) {
        let mut states = self.states.lock();
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        states.clear();
    }
}

/// Stores a finished warm-up. The cancellation check and the insert share the lock
/// `cancel_all` takes, so a result from an abandoned list is never kept.
fn record_outcome(
    states: &Mutex<HashMap<String, ResourceState>>,
    cancel: &CancellationToken,
    url: String,
    next: ResourceState,
) -> bool {
    let mut states = states.lock();
    if cancel.is_cancelled() {
        return false;
    }
    states.insert(url, next);
    true
}

impl Drop for WarmupManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Ranged GET of the first `warm_bytes` of `url`. Returns the number of bytes received.
async fn warm_resource(
    client: &Client,
    permits: &Semaphore,
    url: &str,
    warm_bytes: u64,
) -> Result<u64, FeedError> {
    let _permit = permits
        .acquire()
        .await
        .map_err(|_| FeedError::Rejected(String::from("warm-up pool closed")))?;

    let range = format!("bytes=0-{}", warm_bytes.saturating_sub(1));
    let mut resp = client.get(url).header(RANGE, range).send().await?;
    if !resp.status().is_success() {
        return Err(FeedError::Status {
            status: resp.status().as_u16(),
            body: String::new(),
        });
    }

    let mut received = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        received += chunk.len() as u64;
        if received >= warm_bytes {
            break;
        }
    }
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::time::Duration;

    async fn settle(manager: &WarmupManager, url: &str) -> ResourceState {
        for _ in 0..200 {
            let state = manager.state(url);
            if state != ResourceState::Loading {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        manager.state(url)
    }

    #[tokio::test]
    async fn warm_marks_ready_and_is_not_repeated() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/videos/a.mp4")
            .match_header("range", "bytes=0-15")
            .with_status(206)
            .with_body(vec![0u8; 16])
            .expect(1)
            .create_async()
            .await;

        let manager = WarmupManager::new(
            Client::new(),
            WarmupSettings {
                max_parallel: 1,
                warm_bytes: 16,
            },
        );
        let url = format!("{}/videos/a.mp4", server.url());
        manager.warm([url.clone()]);
        assert_eq!(settle(&manager, &url).await, ResourceState::Ready);

        manager.warm([url.clone()]);
        assert_eq!(manager.state(&url), ResourceState::Ready);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failures_are_recorded_quietly() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/videos/missing.mp4")
            .with_status(404)
            .create_async()
            .await;

        let manager = WarmupManager::new(Client::new(), WarmupSettings::default());
        let url = format!("{}/videos/missing.mp4", server.url());
        manager.warm([url.clone()]);
        assert_eq!(settle(&manager, &url).await, ResourceState::Failed);
    }

    #[test]
    fn outcome_racing_a_cancel_is_dropped() {
        let states = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        // Holding the lock the way `cancel_all` does while the outcome arrives.
        let guard = states.lock();
        let writer = {
            let states = Arc::clone(&states);
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                record_outcome(&states, &cancel, String::from("a"), ResourceState::Ready)
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        drop(guard);

        assert!(!writer.join().expect("join"));
        assert!(states.lock().is_empty());

        let fresh = CancellationToken::new();
        assert!(record_outcome(&states, &fresh, String::from("b"), ResourceState::Failed));
        assert_eq!(states.lock().get("b"), Some(&ResourceState::Failed));
    }

    #[tokio::test]
    async fn cancel_all_forgets_states() {
        let mut manager = WarmupManager::new(Client::new(), WarmupSettings::default());
        manager.warm([String::from("http://127.0.0.1:9/never.mp4")]);
        manager.cancel_all();
        assert_eq!(
            manager.state("http://127.0.0.1:9/never.mp4"),
            ResourceState::NotRequested
        );
        assert_eq!(manager.in_flight(), 0);
    }
}
