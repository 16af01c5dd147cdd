use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{
    Bootstrap, EventBus, EventKind, ImpressionEvent, MetricsConfig, MetricsReporter, Poller,
    PollerConfig, SubscriptionId, UnleashEvent, UnleashOptions,
};
use crate::error::Result;
use crate::http::{ReqwestTransport, Transport};
use crate::types::{Context, Toggle, Variant};

/// Feature toggle client for an Unleash proxy or frontend API.
///
/// Evaluation reads the locally cached toggles and never blocks on the
/// network. Call [`UnleashClient::start`] to fetch toggles and begin polling.
pub struct UnleashClient {
    poller: Poller,
    metrics: MetricsReporter,
    events: Arc<EventBus>,
    context: RwLock<Context>,
}

impl UnleashClient {
    /// Create a client backed by `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the options fail validation.
    pub fn new(options: UnleashOptions) -> Result<Self> {
        options.validate()?;
        let transport = ReqwestTransport::new(options.timeout)?;
        Self::with_transport(options, Arc::new(transport))
    }

    /// Create a client that sends its requests through `transport`.
    pub fn with_transport(options: UnleashOptions, transport: Arc<dyn Transport>) -> Result<Self> {
        options.validate()?;

        let connection_id = Uuid::new_v4();
        let events = Arc::new(EventBus::new());

        let poller_config = PollerConfig::builder(options.url.clone(), options.client_key.clone())
            .app_name(options.app_name.clone())
            .connection_id(connection_id)
            .refresh_interval(options.refresh_interval)
            .custom_headers(options.custom_headers.clone())
            .build();
        let poller = Poller::with_components(
            poller_config,
            Arc::clone(&transport),
            Arc::new(crate::core::InMemoryStorage::new()),
            Arc::clone(&events),
            Arc::clone(&options.custom_headers_provider),
        )
        .with_bootstrap(options.bootstrap.toggles());

        let metrics_config =
            MetricsConfig::builder(options.url.clone(), options.client_key.clone())
                .app_name(options.app_name.clone())
                .connection_id(connection_id)
                .metrics_interval(options.metrics_interval)
                .disabled(options.disable_metrics)
                .custom_headers(options.custom_headers.clone())
                .build();
        let metrics = MetricsReporter::with_components(
            metrics_config,
            transport,
            Arc::clone(&events),
            Arc::clone(&options.custom_headers_provider),
            Arc::new(chrono::Utc::now),
        );

        Ok(Self::assemble(&options, poller, metrics, events))
    }

    /// Create a client from a pre-built poller and reporter.
    ///
    /// The client publishes through the poller's event bus; build the
    /// reporter on the same bus to receive `Sent` and `Error` events.
    pub fn with_components(
        options: UnleashOptions,
        poller: Poller,
        metrics: MetricsReporter,
    ) -> Result<Self> {
        options.validate()?;
        let events = Arc::clone(poller.event_bus());
        if !Arc::ptr_eq(&events, metrics.event_bus()) {
            tracing::debug!("Metrics reporter publishes on a separate event bus");
        }
        Ok(Self::assemble(&options, poller, metrics, events))
    }

    fn assemble(
        options: &UnleashOptions,
        poller: Poller,
        metrics: MetricsReporter,
        events: Arc<EventBus>,
    ) -> Self {
        let mut context = Context::new(options.app_name.clone());
        context.environment = options.environment.clone();
        if !options.context.is_empty() {
            context = context.updated(&options.context, None);
        }

        Self {
            poller,
            metrics,
            events,
            context: RwLock::new(context),
        }
    }

    /// Fetch toggles and begin polling and metrics reporting.
    ///
    /// Resolves once the initial fetch completes, with its outcome.
    pub async fn start(&self) -> Result<()> {
        self.start_with_bootstrap(Bootstrap::default()).await
    }

    /// Seed the store from `bootstrap` instead of the initial fetch, then
    /// begin polling. An empty bootstrap behaves like [`UnleashClient::start`].
    pub async fn start_with_bootstrap(&self, bootstrap: Bootstrap) -> Result<()> {
        self.stop();
        self.metrics.start();
        let context = self.context();
        self.poller.start(bootstrap.toggles(), context).await
    }

    /// Stop polling and metrics reporting. Subscriptions are kept.
    pub fn stop(&self) {
        self.poller.stop();
        self.metrics.stop();
    }

    /// Stop and remove every subscription.
    pub fn close(&self) {
        self.stop();
        self.events.clear();
        tracing::debug!("Client closed");
    }

    pub fn is_ready(&self) -> bool {
        self.poller.is_ready()
    }

    /// Whether `name` is enabled. Unknown toggles are disabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        let toggle = self.poller.get_feature(name);
        let enabled = toggle.as_ref().map(|t| t.enabled).unwrap_or(false);
        self.metrics.count(name, enabled);

        if let Some(toggle) = toggle {
            self.emit_impression(&toggle, None);
        }

        enabled
    }

    /// Variant assigned to `name`, or [`Variant::disabled`] if there is none.
    pub fn get_variant(&self, name: &str) -> Variant {
        let toggle = self.poller.get_feature(name);
        let variant = toggle
            .as_ref()
            .and_then(|t| t.variant.clone())
            .unwrap_or_else(Variant::disabled);

        self.metrics.count(name, variant.enabled);
        self.metrics.count_variant(name, &variant.name);

        if let Some(toggle) = toggle {
            self.emit_impression(&toggle, Some(variant.clone()));
        }

        variant
    }

    fn emit_impression(&self, toggle: &Toggle, variant: Option<Variant>) {
        if !toggle.impression_data {
            return;
        }

        self.events.emit(UnleashEvent::Impression(ImpressionEvent {
            toggle_name: toggle.name.clone(),
            enabled: toggle.enabled,
            variant,
            context: self.context(),
        }));
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&UnleashEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn unsubscribe_all(&self, kind: EventKind) {
        self.events.unsubscribe_all(kind);
    }

    /// Replace the context and restart polling with it.
    ///
    /// `appName` and `environment` are kept unless supplied. Keys other than
    /// the well-known ones become properties.
    pub async fn update_context(
        &self,
        fields: HashMap<String, String>,
        properties: Option<HashMap<String, String>>,
    ) -> Result<()> {
        {
            let mut context = self.context.write();
            *context = context.updated(&fields, properties.as_ref());
        }
        self.start().await
    }

    pub fn context(&self) -> Context {
        self.context.read().clone()
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn metrics(&self) -> &MetricsReporter {
        &self.metrics
    }
}

impl Drop for UnleashClient {
    fn drop(&mut self) {
        self.close();
    }
}
