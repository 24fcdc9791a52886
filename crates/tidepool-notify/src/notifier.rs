// crates/tidepool-notify/src/notifier.rs
// ============================================================================
// Module: Composite Notifier
// Description: Channel-keyed sink registry implementing the core Notifier.
// Purpose: Fan events out per channel; partial delivery is success.
// Dependencies: async-trait, tidepool-core, crate::sink
// ============================================================================

//! ## Overview
//! [`CompositeNotifier`] routes each event to the sink registered for each
//! of the event's channels. A channel without a registered sink is
//! skipped silently (the tenant simply has no integration linked, the
//! normal state before a chat channel is connected). Delivery is
//! best-effort: the notifier reports failure only when every addressed
//! channel fails, and callers treat even that as log-worthy rather than
//! fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tidepool_core::Channel;
use tidepool_core::NotificationEvent;
use tidepool_core::Notifier;
use tidepool_core::NotifyError;

use crate::sink::NotifySink;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for a composite notifier.
///
/// # Invariants
/// - Sink registrations are keyed by channel; later registrations
///   overwrite earlier ones.
#[derive(Default)]
pub struct CompositeNotifierBuilder {
    /// Sink registry keyed by channel.
    sinks: BTreeMap<&'static str, (Channel, Arc<dyn NotifySink>)>,
}

impl std::fmt::Debug for CompositeNotifierBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeNotifierBuilder").finish_non_exhaustive()
    }
}

impl CompositeNotifierBuilder {
    /// Registers a sink for a channel.
    #[must_use]
    pub fn sink(mut self, channel: Channel, sink: impl NotifySink + 'static) -> Self {
        self.sinks.insert(channel_key(channel), (channel, Arc::new(sink)));
        self
    }

    /// Builds the composite notifier. A notifier with no sinks is valid;
    /// it simply drops every event.
    #[must_use]
    pub fn build(self) -> CompositeNotifier {
        CompositeNotifier {
            sinks: self.sinks.into_values().collect(),
        }
    }
}

/// Returns a stable map key for a channel.
const fn channel_key(channel: Channel) -> &'static str {
    match channel {
        Channel::Chat => "chat",
        Channel::Mail => "mail",
    }
}

// ============================================================================
// SECTION: Composite Notifier
// ============================================================================

/// Channel fan-out dispatcher.
///
/// # Invariants
/// - At most one sink per channel.
pub struct CompositeNotifier {
    /// Registered sinks.
    sinks: Vec<(Channel, Arc<dyn NotifySink>)>,
}

impl std::fmt::Debug for CompositeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeNotifier").finish_non_exhaustive()
    }
}

impl CompositeNotifier {
    /// Returns a builder for the composite notifier.
    #[must_use]
    pub fn builder() -> CompositeNotifierBuilder {
        CompositeNotifierBuilder::default()
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let mut addressed = 0usize;
        let mut failures = Vec::new();
        for (channel, sink) in &self.sinks {
            if !event.channels.contains(channel) {
                continue;
            }
            addressed += 1;
            if let Err(err) = sink.deliver(event).await {
                failures.push(err.to_string());
            }
        }
        // Only a total failure across addressed channels is reported.
        if addressed > 0 && failures.len() == addressed {
            return Err(NotifyError::Delivery(failures.join("; ")));
        }
        Ok(())
    }
}
