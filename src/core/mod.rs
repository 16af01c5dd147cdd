mod bootstrap;
mod config;
mod events;
mod metrics;
mod poller;
mod store;

pub use bootstrap::Bootstrap;
pub use config::{
    UnleashOptions, UnleashOptionsBuilder, DEFAULT_ENVIRONMENT, DEFAULT_METRICS_INTERVAL,
    DEFAULT_REFRESH_INTERVAL, DEFAULT_TIMEOUT,
};
pub use events::{
    EventBus, EventCallback, EventKind, ImpressionEvent, SubscriptionId, UnleashEvent,
};
pub use metrics::{
    Bucket, Clock, MetricsConfig, MetricsConfigBuilder, MetricsPayload, MetricsReporter,
    ToggleMetrics, DEFAULT_METRICS_INTERVAL_SECS, INSTANCE_ID,
};
pub use poller::{
    Poller, PollerConfig, PollerConfigBuilder, PollerState, DEFAULT_REFRESH_INTERVAL_SECS,
};
pub use store::{InMemoryStorage, StorageProvider};
