// crates/tidepool-notify/src/sink.rs
// ============================================================================
// Module: Notification Sinks
// Description: Sink trait, webhook target validation, and a callback sink.
// Purpose: Define the delivery seam the composite notifier dispatches through.
// Dependencies: async-trait, thiserror, tidepool-core, url
// ============================================================================

//! ## Overview
//! A sink delivers one rendered event to one channel backend. Deployments
//! register concrete sinks (chat webhook, mail relay) on the composite
//! notifier; tests register [`CallbackSink`] to capture deliveries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tidepool_core::NotificationEvent;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sink delivery errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Delivery target rejected or unreachable.
    #[error("sink delivery failed: {0}")]
    Delivery(String),
    /// Sink configuration invalid.
    #[error("sink invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Webhook Target
// ============================================================================

/// Validated webhook endpoint for a chat sink.
///
/// # Invariants
/// - The URL is `https` with a host; validated at construction.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    /// Validated endpoint URL.
    url: Url,
}

impl WebhookTarget {
    /// Parses and validates a webhook endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Invalid`] when the URL is malformed, not
    /// `https`, or has no host.
    pub fn parse(raw: &str) -> Result<Self, SinkError> {
        let url = Url::parse(raw).map_err(|err| SinkError::Invalid(err.to_string()))?;
        if url.scheme() != "https" {
            return Err(SinkError::Invalid(format!("webhook must be https: {raw}")));
        }
        if url.host_str().is_none() {
            return Err(SinkError::Invalid(format!("webhook has no host: {raw}")));
        }
        Ok(Self { url })
    }

    /// Returns the validated URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// One delivery backend for one channel.
#[async_trait]
pub trait NotifySink: Send + Sync {
    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when delivery fails.
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), SinkError>;
}

// ============================================================================
// SECTION: Callback Sink
// ============================================================================

/// Test sink that records every delivered event.
///
/// # Invariants
/// - Events are recorded in delivery order.
#[derive(Debug, Default, Clone)]
pub struct CallbackSink {
    /// Recorded deliveries.
    delivered: Arc<Mutex<Vec<NotificationEvent>>>,
    /// When true, every delivery fails.
    failing: bool,
}

impl CallbackSink {
    /// Creates a recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that fails every delivery.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            delivered: Arc::new(Mutex::new(Vec::new())),
            failing: true,
        }
    }

    /// Returns the recorded deliveries.
    #[must_use]
    pub fn delivered(&self) -> Vec<NotificationEvent> {
        self.delivered.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotifySink for CallbackSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), SinkError> {
        if self.failing {
            return Err(SinkError::Delivery("callback sink configured to fail".to_string()));
        }
        if let Ok(mut events) = self.delivered.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}
