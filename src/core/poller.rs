//! Poller for toggle state.
//!
//! This module fetches evaluated toggles from the proxy, keeps them in the
//! toggle store, and re-fetches on a fixed interval using conditional
//! requests (`If-None-Match`).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use url::Url;
use uuid::Uuid;

use super::events::{EventBus, UnleashEvent};
use super::store::{InMemoryStorage, StorageProvider};
use crate::error::{Result, UnleashError};
use crate::http::headers::{HEADER_APP_NAME, HEADER_CONNECTION_ID, HEADER_SDK};
use crate::http::{
    merge_custom_headers, sdk_identifier, CustomHeadersProvider, DefaultCustomHeadersProvider,
    HttpRequest, HttpResponse, Transport,
};
use crate::types::{Context, FeatureResponse, Toggle, DEFAULT_APP_NAME};

/// Default refresh interval in seconds.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15;

/// Configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Proxy / frontend API endpoint the toggles are fetched from.
    pub url: String,

    /// Sent as the `Authorization` header.
    pub client_key: String,

    pub app_name: String,

    pub connection_id: Uuid,

    /// Time between fetches. Zero fetches once and never schedules.
    /// Default: 15 seconds
    pub refresh_interval: Duration,

    pub custom_headers: HashMap<String, String>,
}

impl PollerConfig {
    pub fn new(url: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_key: client_key.into(),
            app_name: DEFAULT_APP_NAME.to_string(),
            connection_id: Uuid::new_v4(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            custom_headers: HashMap::new(),
        }
    }

    pub fn builder(url: impl Into<String>, client_key: impl Into<String>) -> PollerConfigBuilder {
        PollerConfigBuilder {
            config: Self::new(url, client_key),
        }
    }
}

/// Builder for PollerConfig.
#[derive(Debug)]
pub struct PollerConfigBuilder {
    config: PollerConfig,
}

impl PollerConfigBuilder {
    /// Set the app name.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = app_name.into();
        self
    }

    /// Set the connection id.
    pub fn connection_id(mut self, connection_id: Uuid) -> Self {
        self.config.connection_id = connection_id;
        self
    }

    /// Set the refresh interval.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    /// Set the refresh interval in seconds.
    pub fn refresh_interval_secs(mut self, secs: u64) -> Self {
        self.config.refresh_interval = Duration::from_secs(secs);
        self
    }

    /// Set static custom headers.
    pub fn custom_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.config.custom_headers = headers;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PollerConfig {
        self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    NotStarted,
    Bootstrapping,
    Polling,
    Stopped,
}

struct PollerInner {
    config: PollerConfig,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn StorageProvider>,
    headers_provider: Arc<dyn CustomHeadersProvider>,
    events: Arc<EventBus>,
    etag: Mutex<String>,
    ready: AtomicBool,
    state: Mutex<PollerState>,
    /// Sequence number handed to the next fetch.
    next_fetch: AtomicU64,
    /// Sequence number of the last fetch whose toggles were applied.
    applied_fetch: Mutex<u64>,
}

/// Fetches toggles and keeps the toggle store current.
///
/// Features:
/// - Bootstrap seeding without a network round trip
/// - Conditional requests with ETag
/// - Fixed-interval refresh on a background task
/// - `Ready` once on the first successful fetch, `Update` after that
pub struct Poller {
    inner: Arc<PollerInner>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl Poller {
    /// Create a poller with an in-memory store and its own event bus.
    pub fn new(config: PollerConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_components(
            config,
            transport,
            Arc::new(InMemoryStorage::new()),
            Arc::new(EventBus::new()),
            Arc::new(DefaultCustomHeadersProvider),
        )
    }

    /// Create a poller that shares its store and event bus with the client.
    pub fn with_components(
        config: PollerConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn StorageProvider>,
        events: Arc<EventBus>,
        headers_provider: Arc<dyn CustomHeadersProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                config,
                transport,
                storage,
                headers_provider,
                events,
                etag: Mutex::new(String::new()),
                ready: AtomicBool::new(false),
                state: Mutex::new(PollerState::NotStarted),
                next_fetch: AtomicU64::new(1),
                applied_fetch: Mutex::new(0),
            }),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Seed the store at construction time. Does not mark the poller ready.
    pub fn with_bootstrap(self, toggles: Vec<Toggle>) -> Self {
        if !toggles.is_empty() {
            tracing::debug!("Seeding store with {} bootstrap toggles", toggles.len());
            self.inner.storage.replace_all(toggles);
        }
        self
    }

    /// Start polling.
    ///
    /// Any running timer is stopped first. With bootstrap toggles the store is
    /// seeded and the initial fetch is skipped; otherwise one fetch runs
    /// immediately and its outcome is returned. A recurring fetch is then
    /// scheduled unless the refresh interval is zero.
    pub async fn start(&self, bootstrap: Vec<Toggle>, context: Context) -> Result<()> {
        self.stop();

        let result = if bootstrap.is_empty() {
            self.inner.set_state(PollerState::Polling);
            self.inner.get_features(&context).await
        } else {
            tracing::info!("Starting with {} provided bootstrap toggles", bootstrap.len());
            self.inner.set_state(PollerState::Bootstrapping);
            self.inner.storage.replace_all(bootstrap);
            self.inner.set_state(PollerState::Polling);
            Ok(())
        };

        let interval = self.inner.config.refresh_interval;
        if interval.is_zero() {
            tracing::debug!("Refresh interval is zero, not scheduling fetches");
            return result;
        }

        self.spawn_timer(interval, context);
        result
    }

    fn spawn_timer(&self, interval: Duration, context: Context) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        // Replacing the sender closes the channel of any previous timer.
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Poller timer shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = inner.get_features(&context).await {
                            tracing::warn!("Scheduled toggle fetch failed: {}", e);
                        }
                    }
                }
            }
        });

        tracing::debug!("Poller started with interval {:?}", interval);
    }

    /// Cancel the recurring fetch and mark a started poller stopped. A fetch
    /// already in flight still completes.
    pub fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.try_send(());
            tracing::debug!("Poller timer cancelled");
        }

        let mut state = self.inner.state.lock();
        if *state != PollerState::NotStarted {
            *state = PollerState::Stopped;
            tracing::debug!("Poller stopped");
        }
    }

    /// Run one fetch cycle with the given context.
    pub async fn get_features(&self, context: &Context) -> Result<()> {
        self.inner.get_features(context).await
    }

    /// Read a toggle from the store. Never touches the network.
    pub fn get_feature(&self, name: &str) -> Option<Toggle> {
        self.inner.storage.get(name)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().is_some()
    }

    pub fn state(&self) -> PollerState {
        *self.inner.state.lock()
    }

    /// The ETag sent as `If-None-Match` on the next fetch.
    pub fn etag(&self) -> String {
        self.inner.etag.lock().clone()
    }

    pub fn set_etag(&self, etag: impl Into<String>) {
        *self.inner.etag.lock() = etag.into();
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.inner.storage
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Build the fetch URL for a context.
    pub fn format_url(&self, context: &Context) -> Result<String> {
        self.inner.format_url(context)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown_tx.lock().take();
    }
}

impl PollerInner {
    fn set_state(&self, state: PollerState) {
        *self.state.lock() = state;
    }

    fn format_url(&self, context: &Context) -> Result<String> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| UnleashError::url(format!("Invalid URL {}: {}", self.config.url, e)))?;
        url.set_query(Some(&context.to_query_string()));
        Ok(url.to_string())
    }

    fn build_request(&self, url: String) -> HttpRequest {
        let etag = self.etag.lock().clone();

        let request = HttpRequest::get(url)
            .header("Content-Type", "application/json")
            .header("Authorization", self.config.client_key.clone())
            .header("If-None-Match", etag)
            .header(HEADER_APP_NAME, self.config.app_name.clone())
            .header(HEADER_CONNECTION_ID, self.config.connection_id.to_string())
            .header(HEADER_SDK, sdk_identifier())
            .header("Cache-Control", "no-cache");

        merge_custom_headers(
            request,
            &self.config.custom_headers,
            self.headers_provider.as_ref(),
        )
    }

    async fn get_features(&self, context: &Context) -> Result<()> {
        let url = match self.format_url(context) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Invalid URL");
                return Err(e);
            }
        };

        let fetch = self.next_fetch.fetch_add(1, Ordering::SeqCst);
        let request = self.build_request(url);

        let response = self.transport.perform(request).await;
        self.handle_response(fetch, response)
    }

    /// Classify a fetch response. The checks run in a fixed order and the
    /// first match decides the outcome.
    fn handle_response(&self, fetch: u64, response: Result<HttpResponse>) -> Result<()> {
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("No response: {}", e);
                return Err(UnleashError::no_response(e.message));
            }
        };

        let status = response.status;

        if status == 304 {
            tracing::debug!("No changes in feature toggles");
            return Ok(());
        }

        if (400..599).contains(&status) {
            tracing::warn!("Error fetching toggles, status {}", status);
            return Err(UnleashError::network(status));
        }

        let body = match response.body {
            Some(ref body) => body,
            None => {
                tracing::debug!("No response data");
                return Ok(());
            }
        };

        if status != 200 {
            tracing::warn!("Unhandled status code {}", status);
            return Err(UnleashError::unhandled_status(status));
        }

        if fetch < *self.applied_fetch.lock() {
            tracing::debug!("Discarding response of superseded fetch {}", fetch);
            return Ok(());
        }

        if let Some(etag) = response.header("ETag").filter(|etag| !etag.is_empty()) {
            tracing::debug!("Captured ETag {}", etag);
            *self.etag.lock() = etag.to_string();
        }

        let decoded: FeatureResponse = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!("Failed to decode toggles: {}", e);
            UnleashError::decoding(e)
        })?;

        let first_success = {
            let mut applied = self.applied_fetch.lock();
            if fetch < *applied {
                tracing::debug!(
                    "Discarding response of fetch {} superseded by fetch {}",
                    fetch,
                    *applied
                );
                return Ok(());
            }
            *applied = fetch;

            self.storage.replace_all(decoded.toggles);
            !self.ready.swap(true, Ordering::SeqCst)
        };

        if first_success {
            tracing::info!("Initial toggles fetched");
            self.events.emit(UnleashEvent::Ready);
        } else {
            tracing::debug!("Toggles updated");
            self.events.emit(UnleashEvent::Update);
        }

        Ok(())
    }
}
