//! Background collection sync
//!
//! One loop per synced collection URL: conditional re-fetch with the
//! stored ETag, re-normalize on change, notify through the event sink.
//! Per-tick failures are logged and swallowed; they never stop the
//! loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::{CoreEvent, EventSink, SyncStatus};
use crate::executor::{DocumentFetcher, FetchOutcome};
use crate::normalize::normalize;

/// Tuning for the sync loops.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between conditional re-fetches.
    pub interval: Duration,
    /// How long the `updated` status stays observable before resetting
    /// to `idle`.
    pub updated_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            updated_window: Duration::from_secs(3),
        }
    }
}

/// Sync bookkeeping for one collection URL. Written only by its sync
/// loop; read by the UI through [`SyncScheduler::state`].
#[derive(Debug)]
pub struct SyncState {
    url: String,
    etag: Mutex<Option<String>>,
    last_synced_at: Mutex<Option<DateTime<Utc>>>,
    status: Mutex<SyncStatus>,
    in_flight: AtomicBool,
}

/// Read-only view of a [`SyncState`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub url: String,
    pub etag: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
}

impl SyncState {
    fn new(url: String, etag: Option<String>) -> Self {
        Self {
            url,
            etag: Mutex::new(etag),
            last_synced_at: Mutex::new(None),
            status: Mutex::new(SyncStatus::Idle),
            in_flight: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            url: self.url.clone(),
            etag: self.etag.lock().unwrap().clone(),
            last_synced_at: *self.last_synced_at.lock().unwrap(),
            status: *self.status.lock().unwrap(),
        }
    }

    fn set_status(&self, sink: &dyn EventSink, status: SyncStatus) {
        *self.status.lock().unwrap() = status;
        sink.emit(CoreEvent::SyncStatusChanged {
            url: self.url.clone(),
            status,
            at: Utc::now(),
        });
    }
}

struct SyncHandle {
    cancel: CancellationToken,
    state: Arc<SyncState>,
}

/// Periodically re-imports enabled collections.
///
/// Loops for different URLs are independent tasks; dropping the
/// scheduler cancels all of them.
pub struct SyncScheduler {
    fetcher: Arc<dyn DocumentFetcher>,
    sink: Arc<dyn EventSink>,
    config: SyncConfig,
    entries: Mutex<HashMap<String, SyncHandle>>,
}

impl SyncScheduler {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        sink: Arc<dyn EventSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            fetcher,
            sink,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Start syncing a collection URL. Performs an immediate sync,
    /// then ticks on the configured interval. Enabling an
    /// already-enabled URL restarts its loop.
    pub fn enable(&self, url: &str, etag: Option<String>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(previous) = entries.remove(url) {
            previous.cancel.cancel();
        }

        let state = Arc::new(SyncState::new(url.to_string(), etag));
        let cancel = CancellationToken::new();
        entries.insert(
            url.to_string(),
            SyncHandle {
                cancel: cancel.clone(),
                state: Arc::clone(&state),
            },
        );
        drop(entries);

        let fetcher = Arc::clone(&self.fetcher);
        let sink = Arc::clone(&self.sink);
        let config = self.config.clone();
        tokio::spawn(async move {
            info!(url = %state.url, interval = ?config.interval, "sync enabled");
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(url = %state.url, "sync disabled");
                        break;
                    }
                    // First tick completes immediately: enable implies
                    // an immediate sync.
                    _ = ticker.tick() => {
                        let fetcher = Arc::clone(&fetcher);
                        let sink = Arc::clone(&sink);
                        let state = Arc::clone(&state);
                        let window = config.updated_window;
                        tokio::spawn(async move {
                            sync_tick(&*fetcher, sink, state, window).await;
                        });
                    }
                }
            }
        });
    }

    /// Stop syncing a URL. The timer is cancelled; a sync already in
    /// flight finishes on its own.
    pub fn disable(&self, url: &str) {
        if let Some(handle) = self.entries.lock().unwrap().remove(url) {
            handle.cancel.cancel();
        }
    }

    pub fn is_enabled(&self, url: &str) -> bool {
        self.entries.lock().unwrap().contains_key(url)
    }

    /// Current sync state for a URL, for the UI to render.
    pub fn state(&self, url: &str) -> Option<SyncSnapshot> {
        self.entries
            .lock()
            .unwrap()
            .get(url)
            .map(|handle| handle.state.snapshot())
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        for handle in self.entries.lock().unwrap().values() {
            handle.cancel.cancel();
        }
    }
}

/// One conditional sync pass. A tick that lands while another is in
/// flight is dropped, not queued.
async fn sync_tick(
    fetcher: &dyn DocumentFetcher,
    sink: Arc<dyn EventSink>,
    state: Arc<SyncState>,
    updated_window: Duration,
) {
    if state.in_flight.swap(true, Ordering::SeqCst) {
        debug!(url = %state.url, "sync already in flight, tick dropped");
        return;
    }

    state.set_status(&*sink, SyncStatus::Syncing);
    let etag = state.etag.lock().unwrap().clone();

    match fetcher.fetch(&state.url, etag.as_deref()).await {
        Ok(FetchOutcome::NotModified) => {
            debug!(url = %state.url, "collection unchanged");
            state.set_status(&*sink, SyncStatus::Idle);
        }
        Ok(FetchOutcome::Fetched { text, etag }) => match normalize(&text, &state.url) {
            Ok(mut collection) => {
                let now = Utc::now();
                collection.etag = etag.clone();
                collection.last_updated = now;
                *state.etag.lock().unwrap() = etag;
                *state.last_synced_at.lock().unwrap() = Some(now);

                info!(url = %state.url, endpoints = collection.len(), "collection updated");
                sink.emit(CoreEvent::CollectionUpdated(collection));
                state.set_status(&*sink, SyncStatus::Updated);

                // Keep `updated` observable long enough to render,
                // then fall back to idle unless a newer sync started.
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    tokio::time::sleep(updated_window).await;
                    let reset = {
                        let mut status = state.status.lock().unwrap();
                        if *status == SyncStatus::Updated {
                            *status = SyncStatus::Idle;
                            true
                        } else {
                            false
                        }
                    };
                    if reset {
                        sink.emit(CoreEvent::SyncStatusChanged {
                            url: state.url.clone(),
                            status: SyncStatus::Idle,
                            at: Utc::now(),
                        });
                    }
                });
            }
            Err(e) => {
                warn!(url = %state.url, error = %e, "sync parse failed, keeping previous collection");
                state.set_status(&*sink, SyncStatus::Idle);
            }
        },
        Err(e) => {
            warn!(url = %state.url, error = %e, "sync fetch failed");
            state.set_status(&*sink, SyncStatus::Idle);
        }
    }

    state.in_flight.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    /// One scripted fetch result. `FetchError` is not `Clone`, so
    /// failures are scripted by status code.
    #[derive(Clone)]
    enum Scripted {
        Outcome(FetchOutcome),
        Fail(u16),
    }

    /// Scripted fetcher: plays entries in order, repeating the last.
    struct FakeFetcher {
        script: Mutex<Vec<Scripted>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeFetcher {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentFetcher for FakeFetcher {
        async fn fetch(&self, _url: &str, _etag: Option<&str>) -> Result<FetchOutcome, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.remove(0)
                } else {
                    script[0].clone()
                }
            };
            match next {
                Scripted::Outcome(outcome) => Ok(outcome),
                Scripted::Fail(status) => Err(FetchError::Status { status }),
            }
        }
    }

    fn doc() -> String {
        r#"{"info":{"title":"T"},"paths":{"/pets":{"get":{"tags":["pets"]}}}}"#.to_string()
    }

    fn scheduler(
        fetcher: FakeFetcher,
        config: SyncConfig,
    ) -> (Arc<FakeFetcher>, SyncScheduler, UnboundedReceiver<CoreEvent>) {
        let fetcher = Arc::new(fetcher);
        let (tx, rx) = unbounded_channel();
        let scheduler = SyncScheduler::new(
            Arc::clone(&fetcher) as Arc<dyn DocumentFetcher>,
            Arc::new(tx),
            config,
        );
        (fetcher, scheduler, rx)
    }

    async fn next_status(rx: &mut UnboundedReceiver<CoreEvent>) -> SyncStatus {
        loop {
            match rx.recv().await.expect("event stream ended") {
                CoreEvent::SyncStatusChanged { status, .. } => return status,
                _ => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_modified_leaves_collection_untouched() {
        let (_fetcher, scheduler, mut rx) = scheduler(
            FakeFetcher::new(vec![Scripted::Outcome(FetchOutcome::NotModified)]),
            SyncConfig::default(),
        );
        scheduler.enable("https://example.com/spec", Some("\"v1\"".to_string()));

        assert_eq!(next_status(&mut rx).await, SyncStatus::Syncing);
        assert_eq!(next_status(&mut rx).await, SyncStatus::Idle);
        // No CollectionUpdated was interleaved: the status helper above
        // would have skipped past it, so probe the empty queue.
        assert!(rx.try_recv().is_err());

        let snapshot = scheduler.state("https://example.com/spec").unwrap();
        assert_eq!(snapshot.etag.as_deref(), Some("\"v1\""));
        assert_eq!(snapshot.last_synced_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn fetched_document_replaces_collection_and_stores_etag() {
        let (_fetcher, scheduler, mut rx) = scheduler(
            FakeFetcher::new(vec![Scripted::Outcome(FetchOutcome::Fetched {
                text: doc(),
                etag: Some("\"v2\"".to_string()),
            })]),
            SyncConfig::default(),
        );
        scheduler.enable("https://example.com/spec", None);

        assert_eq!(next_status(&mut rx).await, SyncStatus::Syncing);
        let updated = loop {
            match rx.recv().await.unwrap() {
                CoreEvent::CollectionUpdated(c) => break c,
                _ => continue,
            }
        };
        assert_eq!(updated.name, "T");
        assert_eq!(updated.etag.as_deref(), Some("\"v2\""));

        assert_eq!(next_status(&mut rx).await, SyncStatus::Updated);
        // After the display window the badge drops back to idle.
        assert_eq!(next_status(&mut rx).await, SyncStatus::Idle);

        let snapshot = scheduler.state("https://example.com/spec").unwrap();
        assert_eq!(snapshot.etag.as_deref(), Some("\"v2\""));
        assert!(snapshot.last_synced_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_dropped() {
        let config = SyncConfig {
            interval: Duration::from_millis(50),
            updated_window: Duration::from_millis(10),
        };
        let fetcher = FakeFetcher::new(vec![Scripted::Outcome(FetchOutcome::NotModified)])
            .with_delay(Duration::from_millis(120));
        let (fetcher, scheduler, _rx) = scheduler(fetcher, config);
        scheduler.enable("https://example.com/spec", Some("\"v\"".to_string()));

        // Ticks at 0/50/100/150ms; the 0ms fetch is busy until 120ms,
        // so 50 and 100 are dropped and 150 runs.
        tokio::time::sleep(Duration::from_millis(160)).await;
        scheduler.disable("https://example.com/spec");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_cancels_future_ticks() {
        let (fetcher, scheduler, mut rx) = scheduler(
            FakeFetcher::new(vec![Scripted::Outcome(FetchOutcome::NotModified)]),
            SyncConfig {
                interval: Duration::from_millis(50),
                updated_window: Duration::from_millis(10),
            },
        );
        scheduler.enable("https://example.com/spec", Some("\"v\"".to_string()));
        assert_eq!(next_status(&mut rx).await, SyncStatus::Syncing);
        assert_eq!(next_status(&mut rx).await, SyncStatus::Idle);

        scheduler.disable("https://example.com/spec");
        assert!(!scheduler.is_enabled("https://example.com/spec"));
        let calls = fetcher.calls();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fetcher.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_keeps_loop_alive() {
        let (fetcher, scheduler, mut rx) = scheduler(
            FakeFetcher::new(vec![
                Scripted::Fail(502),
                Scripted::Outcome(FetchOutcome::NotModified),
            ]),
            SyncConfig {
                interval: Duration::from_millis(50),
                updated_window: Duration::from_millis(10),
            },
        );
        scheduler.enable("https://example.com/spec", Some("\"v\"".to_string()));

        // First tick fails, second still happens.
        assert_eq!(next_status(&mut rx).await, SyncStatus::Syncing);
        assert_eq!(next_status(&mut rx).await, SyncStatus::Idle);
        assert_eq!(next_status(&mut rx).await, SyncStatus::Syncing);
        assert_eq!(next_status(&mut rx).await, SyncStatus::Idle);
        assert!(fetcher.calls() >= 2);
    }
}
