//! Usage metrics.
//!
//! Evaluations are counted into a time-windowed bucket that is swapped out
//! and posted to `<url>/client/metrics` on a fixed interval. A bucket is sent
//! at most once; failed sends are reported as `Error` events and dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use url::Url;
use uuid::Uuid;

use super::events::{EventBus, UnleashEvent};
use crate::error::{ErrorCode, Result, UnleashError};
use crate::http::headers::{HEADER_APP_NAME, HEADER_CONNECTION_ID, HEADER_SDK};
use crate::http::{
    merge_custom_headers, sdk_identifier, CustomHeadersProvider, DefaultCustomHeadersProvider,
    HttpRequest, Transport,
};
use crate::types::DEFAULT_APP_NAME;

/// Default metrics interval in seconds.
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 30;

/// Instance identifier sent with every metrics payload.
pub const INSTANCE_ID: &str = "rust";

/// Source of bucket timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Counts for one toggle within a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToggleMetrics {
    pub yes: u64,
    pub no: u64,
    pub variants: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    #[serde(serialize_with = "serialize_timestamp")]
    pub start: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub stop: DateTime<Utc>,
    pub toggles: BTreeMap<String, ToggleMetrics>,
}

impl Bucket {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            stop: start,
            toggles: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty()
    }
}

/// Body of the metrics POST.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    pub app_name: String,
    pub instance_id: String,
    pub bucket: Bucket,
}

/// Configuration for the metrics reporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub url: String,
    pub client_key: String,
    pub app_name: String,
    pub connection_id: Uuid,

    /// Time between flushes. Default: 30 seconds
    pub metrics_interval: Duration,

    /// Disabled reporters ignore counts and never send. Default: false
    pub disabled: bool,

    pub custom_headers: HashMap<String, String>,
}

impl MetricsConfig {
    pub fn new(url: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_key: client_key.into(),
            app_name: DEFAULT_APP_NAME.to_string(),
            connection_id: Uuid::new_v4(),
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
            disabled: false,
            custom_headers: HashMap::new(),
        }
    }

    pub fn builder(url: impl Into<String>, client_key: impl Into<String>) -> MetricsConfigBuilder {
        MetricsConfigBuilder {
            config: Self::new(url, client_key),
        }
    }

    /// `<url>/client/metrics`, with any query or fragment of `url` removed.
    pub fn endpoint(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| UnleashError::url(format!("Invalid URL {}: {}", self.url, e)))?;
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| UnleashError::url(format!("URL {} cannot take a path", self.url)))?
            .pop_if_empty()
            .extend(["client", "metrics"]);
        Ok(url.to_string())
    }
}

/// Builder for MetricsConfig.
#[derive(Debug)]
pub struct MetricsConfigBuilder {
    config: MetricsConfig,
}

impl MetricsConfigBuilder {
    /// Set the app name.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = app_name.into();
        self
    }

    /// Set the connection id shared with the poller.
    pub fn connection_id(mut self, connection_id: Uuid) -> Self {
        self.config.connection_id = connection_id;
        self
    }

    /// Set the flush interval.
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.config.metrics_interval = interval;
        self
    }

    /// Disable counting and sending.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.config.disabled = disabled;
        self
    }

    /// Add one static custom header.
    pub fn custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.custom_headers.insert(name.into(), value.into());
        self
    }

    /// Replace all static custom headers.
    pub fn custom_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.config.custom_headers = headers;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> MetricsConfig {
        self.config
    }
}

struct ReporterInner {
    config: MetricsConfig,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    headers_provider: Arc<dyn CustomHeadersProvider>,
    clock: Clock,
    bucket: Mutex<Bucket>,
}

/// Aggregates evaluation counts and posts them periodically.
pub struct MetricsReporter {
    inner: Arc<ReporterInner>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl MetricsReporter {
    pub fn new(config: MetricsConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_components(
            config,
            transport,
            Arc::new(EventBus::new()),
            Arc::new(DefaultCustomHeadersProvider),
            system_clock(),
        )
    }

    pub fn with_components(
        config: MetricsConfig,
        transport: Arc<dyn Transport>,
        events: Arc<EventBus>,
        headers_provider: Arc<dyn CustomHeadersProvider>,
        clock: Clock,
    ) -> Self {
        let bucket = Bucket::new(clock());
        Self {
            inner: Arc::new(ReporterInner {
                config,
                transport,
                events,
                headers_provider,
                clock,
                bucket: Mutex::new(bucket),
            }),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.config.disabled
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Record one evaluation of `name`.
    pub fn count(&self, name: &str, enabled: bool) {
        if self.inner.config.disabled {
            return;
        }

        let mut bucket = self.inner.bucket.lock();
        let entry = bucket.toggles.entry(name.to_string()).or_default();
        if enabled {
            entry.yes += 1;
        } else {
            entry.no += 1;
        }
    }

    /// Record that `name` resolved to `variant`.
    pub fn count_variant(&self, name: &str, variant: &str) {
        if self.inner.config.disabled {
            return;
        }

        let mut bucket = self.inner.bucket.lock();
        *bucket
            .toggles
            .entry(name.to_string())
            .or_default()
            .variants
            .entry(variant.to_string())
            .or_insert(0) += 1;
    }

    /// Copy of the open bucket.
    pub fn bucket_snapshot(&self) -> Bucket {
        self.inner.bucket.lock().clone()
    }

    /// Schedule recurring flushes. Does nothing when disabled.
    pub fn start(&self) {
        if self.inner.config.disabled {
            tracing::debug!("Metrics disabled, not scheduling sends");
            return;
        }

        let interval = self.inner.config.metrics_interval;
        if interval.is_zero() {
            tracing::warn!("Metrics interval is zero, not scheduling sends");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Metrics timer shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        inner.send_metrics().await;
                    }
                }
            }
        });

        tracing::debug!("Metrics reporter started with interval {:?}", interval);
    }

    pub fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.try_send(());
            tracing::debug!("Metrics reporter stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().is_some()
    }

    /// Close the open bucket and post it. Empty buckets are left open and
    /// nothing is sent.
    pub async fn send_metrics(&self) {
        self.inner.send_metrics().await;
    }
}

impl Drop for MetricsReporter {
    fn drop(&mut self) {
        self.shutdown_tx.lock().take();
    }
}

impl ReporterInner {
    fn take_bucket(&self) -> Option<Bucket> {
        if self.config.disabled {
            return None;
        }

        let now = (self.clock)();
        let mut bucket = self.bucket.lock();
        bucket.stop = now;
        if bucket.is_empty() {
            return None;
        }
        Some(std::mem::replace(&mut *bucket, Bucket::new(now)))
    }

    async fn send_metrics(&self) {
        let bucket = match self.take_bucket() {
            Some(bucket) => bucket,
            None => {
                tracing::debug!("No metrics to send");
                return;
            }
        };

        let toggles = bucket.toggles.len();
        match self.post(bucket).await {
            Ok(()) => {
                tracing::debug!("Sent metrics for {} toggles", toggles);
                self.events.emit(UnleashEvent::Sent);
            }
            Err(e) => {
                tracing::warn!("Failed to send metrics: {}", e);
                self.events.emit(UnleashEvent::Error(Arc::new(e)));
            }
        }
    }

    async fn post(&self, bucket: Bucket) -> Result<()> {
        let payload = MetricsPayload {
            app_name: self.config.app_name.clone(),
            instance_id: INSTANCE_ID.to_string(),
            bucket,
        };

        let body = serde_json::to_vec(&payload).map_err(|e| {
            UnleashError::with_source(
                ErrorCode::Serialization,
                "Failed to serialize metrics payload",
                e,
            )
        })?;

        let request = HttpRequest::post(self.config.endpoint()?, body)
            .header("Accept", "application/json")
            .header("Cache", "no-cache")
            .header("Content-Type", "application/json")
            .header("Authorization", self.config.client_key.clone())
            .header(HEADER_APP_NAME, self.config.app_name.clone())
            .header(HEADER_CONNECTION_ID, self.config.connection_id.to_string())
            .header(HEADER_SDK, sdk_identifier());
        let request = merge_custom_headers(
            request,
            &self.config.custom_headers,
            self.headers_provider.as_ref(),
        );

        let response = self.transport.perform(request).await?;

        if response.status >= 400 {
            return Err(UnleashError::new(
                ErrorCode::MetricsSendFailed,
                format!("Metrics endpoint returned status {}", response.status),
            )
            .with_status(response.status));
        }

        Ok(())
    }
}
