//! Unleash proxy client for Rust
//!
//! Client for the Unleash proxy / frontend API. Toggles are fetched
//! periodically with conditional requests, cached in memory, and evaluated
//! locally. Evaluation counts are aggregated and posted back as usage metrics.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use unleash_proxy_client::{EventKind, UnleashClient, UnleashOptions};
//!
//! #[tokio::main]
//! async fn main() -> unleash_proxy_client::Result<()> {
//!     let options = UnleashOptions::builder(
//!         "https://app.unleash-hosted.com/hosted/api/proxy",
//!         "proxy-client-key",
//!     )
//!     .app_name("my-app")
//!     .build();
//!     let client = UnleashClient::new(options)?;
//!
//!     client.subscribe(EventKind::Update, |_| println!("toggles updated"));
//!
//!     // Fetch toggles and start polling
//!     client.start().await?;
//!
//!     if client.is_enabled("dark-mode") {
//!         let variant = client.get_variant("dark-mode");
//!         println!("variant: {}", variant.name);
//!     }
//!
//!     // Re-fetch for a new user
//!     client
//!         .update_context(HashMap::from([("userId".to_string(), "user-123".to_string())]), None)
//!         .await?;
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod error;
pub mod http;
pub mod types;
mod client;

pub use types::{Context, ContextBuilder, FeatureResponse, Payload, Toggle, Variant};

pub use error::{ErrorCode, Result, UnleashError};

pub use core::{
    Bootstrap, Bucket, Clock, EventBus, EventKind, ImpressionEvent, InMemoryStorage,
    MetricsConfig, MetricsReporter, Poller, PollerConfig, PollerState, StorageProvider,
    SubscriptionId, ToggleMetrics, UnleashEvent, UnleashOptions, UnleashOptionsBuilder,
};

pub use http::{
    CustomHeadersProvider, DefaultCustomHeadersProvider, HttpRequest, HttpResponse, Method,
    ReqwestTransport, Transport, SDK_VERSION,
};

pub use client::UnleashClient;
