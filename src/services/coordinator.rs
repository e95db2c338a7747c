//! Source coordinators.
//!
//! A coordinator owns one upstream endpoint and its refresh cadence, and keeps
//! the latest successfully fetched payload in memory.
//!
//! - `refresh()` fetches once (10 s timeout). Success swaps in the new payload
//!   and runs listeners; failure keeps the cached payload and marks the source
//!   unavailable until the next successful refresh.
//! - `run()` loops forever, sleeping `refresh_interval` between refreshes.
//!   The first refresh is done by the caller during startup.
//! - Listeners run synchronously, in registration order, after each
//!   successful refresh. A failing or panicking listener is logged and skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::errors::{FetchError, ListenerError};
use crate::services::fetcher::{JsonFetcher, FETCH_TIMEOUT};

/// A cached upstream document. Replaced wholesale, never mutated.
pub type SourcePayload = Arc<Value>;

/// Callback run after every successful refresh.
pub type Listener = Box<dyn Fn(&SourcePayload) -> Result<(), ListenerError> + Send + Sync>;

/// Where a source lives and how often it is refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub url: String,
    pub refresh_interval: Duration,
}

impl RemoteEndpoint {
    pub fn new(url: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            url: url.into(),
            refresh_interval,
        }
    }
}

/// Refresh bookkeeping for one source, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SourceStatus {
    pub name: String,
    pub url: String,
    pub refresh_interval_secs: u64,
    /// Whether the last refresh succeeded and a payload is cached.
    pub available: bool,
    pub has_payload: bool,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub successful_refreshes: u64,
    pub failed_refreshes: u64,
    /// Registered refresh listeners, e.g. the weather sensor.
    pub listeners: usize,
}

#[derive(Debug, Default)]
struct RefreshState {
    payload: Option<SourcePayload>,
    last_attempt_at: Option<DateTime<Utc>>,
    last_refresh_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    successful_refreshes: u64,
    failed_refreshes: u64,
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

pub struct SourceCoordinator {
    name: String,
    endpoint: RemoteEndpoint,
    fetcher: Arc<dyn JsonFetcher>,
    state: RwLock<RefreshState>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

/// Keeps a listener registered. Dropping the handle deregisters it.
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl ListenerHandle {
    pub fn remove(self) {
        // Drop does the work.
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl SourceCoordinator {
    pub fn new(
        name: impl Into<String>,
        endpoint: RemoteEndpoint,
        fetcher: Arc<dyn JsonFetcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            endpoint,
            fetcher,
            state: RwLock::new(RefreshState::default()),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Latest successfully fetched payload, if any.
    pub async fn payload(&self) -> Option<SourcePayload> {
        self.state.read().await.payload.clone()
    }

    /// True when the last refresh succeeded and data is cached.
    pub async fn is_available(&self) -> bool {
        let s = self.state.read().await;
        s.payload.is_some() && s.last_error.is_none()
    }

    pub async fn status(&self) -> SourceStatus {
        let endpoint = self.endpoint();
        let listeners = self.listener_count();
        let s = self.state.read().await;
        SourceStatus {
            name: self.name.clone(),
            url: endpoint.url.clone(),
            refresh_interval_secs: endpoint.refresh_interval.as_secs(),
            available: s.payload.is_some() && s.last_error.is_none(),
            has_payload: s.payload.is_some(),
            last_attempt_at: s.last_attempt_at,
            last_refresh_at: s.last_refresh_at,
            last_error: s.last_error.clone(),
            successful_refreshes: s.successful_refreshes,
            failed_refreshes: s.failed_refreshes,
            listeners,
        }
    }

    /// Register a listener. It stays registered while the handle is alive.
    pub fn add_listener(&self, listener: Listener) -> ListenerHandle {
        let mut registry = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        registry.next_id += 1;
        let id = registry.next_id;
        registry.entries.push((id, listener));
        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    /// Fetch the endpoint once and update the cache.
    pub async fn refresh(&self) -> Result<SourcePayload, FetchError> {
        let attempt_at = Utc::now();
        let result = self.fetcher.fetch(&self.endpoint.url, FETCH_TIMEOUT).await;

        let payload = {
            let mut s = self.state.write().await;
            s.last_attempt_at = Some(attempt_at);
            match result {
                Ok(value) => {
                    let payload: SourcePayload = Arc::new(value);
                    s.payload = Some(payload.clone());
                    s.last_refresh_at = Some(Utc::now());
                    s.last_error = None;
                    s.successful_refreshes += 1;
                    payload
                }
                Err(e) => {
                    s.last_error = Some(e.to_string());
                    s.failed_refreshes += 1;
                    tracing::warn!(
                        "Source {}: refresh failed, keeping cached data: {}",
                        self.name,
                        e
                    );
                    return Err(e);
                }
            }
        };

        tracing::debug!("Source {}: refreshed from {}", self.name, self.endpoint.url);
        self.notify(&payload);
        Ok(payload)
    }

    fn notify(&self, payload: &SourcePayload) {
        let registry = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for (id, listener) in &registry.entries {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(payload)))
                .unwrap_or(Err(ListenerError::Panicked));
            if let Err(e) = outcome {
                tracing::error!("Source {}: listener {} failed: {}", self.name, id, e);
            }
        }
    }

    /// Refresh loop. Never returns; spawn it with `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        let interval = self.endpoint().refresh_interval;
        tracing::info!("Source {}: refreshing every {}s", self.name, interval.as_secs());
        loop {
            tokio::time::sleep(interval).await;
            // Failures are already logged and recorded in the status.
            let _ = self.refresh().await;
        }
    }
}
