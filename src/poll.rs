//! Per-endpoint polling
//!
//! One timer per enabled endpoint, firing the snapshotted request and
//! emitting a history entry per completion. Overlap is prevented by a
//! per-endpoint in-flight flag; transport failures become history
//! entries, never scheduler errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collection::EndpointKey;
use crate::event::{CoreEvent, EventSink, HistoryEntry};
use crate::executor::HttpExecutor;
use crate::payload::RequestPayload;

/// Tuning for the poll loops.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Shared interval applied to every polled endpoint.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Everything needed to re-issue and record one request, snapshotted
/// at the moment polling was enabled.
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub key: EndpointKey,
    pub payload: RequestPayload,
    /// Parameter values at dispatch time, for the history entry
    pub params: Vec<(String, String)>,
    /// Body text at dispatch time, for the history entry
    pub body: Option<String>,
    /// Per-call deadline handed to the executor unchanged
    pub timeout: Option<Duration>,
}

struct PollHandle {
    cancel: CancellationToken,
    in_flight: Arc<AtomicBool>,
    request: Arc<PollRequest>,
}

/// Runs timed requests for enabled endpoints.
///
/// Timers are independent per endpoint; dropping the scheduler cancels
/// all of them (requests already dispatched still complete).
pub struct PollScheduler {
    executor: Arc<dyn HttpExecutor>,
    sink: Arc<dyn EventSink>,
    interval: Mutex<Duration>,
    entries: Mutex<HashMap<EndpointKey, PollHandle>>,
}

impl PollScheduler {
    pub fn new(executor: Arc<dyn HttpExecutor>, sink: Arc<dyn EventSink>, config: PollConfig) -> Self {
        Self {
            executor,
            sink,
            interval: Mutex::new(config.interval),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling an endpoint: one request immediately, then one per
    /// interval. Enabling an already-polled endpoint replaces its timer.
    pub fn enable(&self, request: PollRequest) {
        let key = request.key.clone();
        let interval = *self.interval.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        if let Some(previous) = entries.remove(&key) {
            previous.cancel.cancel();
        }

        let handle = PollHandle {
            cancel: CancellationToken::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            request: Arc::new(request),
        };
        info!(endpoint = %key, interval = ?interval, "polling enabled");
        self.spawn_loop(&handle, interval, true);
        entries.insert(key, handle);
    }

    /// Stop polling an endpoint. The timer is cancelled; a request
    /// already dispatched completes and still records history.
    pub fn disable(&self, key: &EndpointKey) {
        if let Some(handle) = self.entries.lock().unwrap().remove(key) {
            info!(endpoint = %key, "polling disabled");
            handle.cancel.cancel();
        }
    }

    pub fn is_enabled(&self, key: &EndpointKey) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    /// Change the shared interval, re-arming every active timer by
    /// drop-and-recreate. No immediate extra request is issued.
    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock().unwrap() = interval;
        let mut entries = self.entries.lock().unwrap();
        for handle in entries.values_mut() {
            handle.cancel.cancel();
            handle.cancel = CancellationToken::new();
            self.spawn_loop(handle, interval, false);
        }
        info!(interval = ?interval, count = entries.len(), "poll timers re-armed");
    }

    fn spawn_loop(&self, handle: &PollHandle, interval: Duration, immediate: bool) {
        let cancel = handle.cancel.clone();
        let in_flight = Arc::clone(&handle.in_flight);
        let request = Arc::clone(&handle.request);
        let executor = Arc::clone(&self.executor);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            let start = if immediate {
                tokio::time::Instant::now()
            } else {
                tokio::time::Instant::now() + interval
            };
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if in_flight.swap(true, Ordering::SeqCst) {
                            debug!(endpoint = %request.key, "previous request still running, tick skipped");
                            continue;
                        }
                        let executor = Arc::clone(&executor);
                        let sink = Arc::clone(&sink);
                        let request = Arc::clone(&request);
                        let in_flight = Arc::clone(&in_flight);
                        // The request runs outside the select so
                        // cancellation never aborts it mid-flight.
                        tokio::spawn(async move {
                            poll_once(&*executor, &*sink, &request).await;
                            in_flight.store(false, Ordering::SeqCst);
                        });
                    }
                }
            }
        });
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        for handle in self.entries.lock().unwrap().values() {
            handle.cancel.cancel();
        }
    }
}

/// Issue one polled request and record it, success or failure.
async fn poll_once(executor: &dyn HttpExecutor, sink: &dyn EventSink, request: &PollRequest) {
    let response = match executor.execute(&request.payload, request.timeout).await {
        Ok(response) => response.render(),
        Err(e) => format!("Error: {e}"),
    };

    sink.emit(CoreEvent::PollResult {
        key: request.key.clone(),
        entry: HistoryEntry {
            method: request.payload.method.clone(),
            path: request.key.path.clone(),
            url: request.payload.url.clone(),
            params: request.params.clone(),
            body: request.body.clone(),
            response,
            at: Utc::now(),
        },
    });
}
