// crates/tidepool-notify/src/lib.rs
// ============================================================================
// Module: Tidepool Notify
// Description: Composite notifier wiring channel sinks.
// Purpose: Fan lifecycle events out to chat and mail without blocking
// lifecycle transitions on delivery failures.
// Dependencies: async-trait, thiserror, tidepool-core, url
// ============================================================================

//! ## Overview
//! [`CompositeNotifier`] implements the core [`Notifier`] interface by
//! routing each event to the sinks registered for its channels. Handlers
//! call it fire-and-forget: partial delivery counts as success, and a
//! total failure is reported but never rolls back the lifecycle
//! transition that produced the event. Sink implementations (a chat
//! webhook, a mail relay) live outside the core scope; this crate ships
//! the dispatch wiring plus a callback sink for tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod notifier;
mod sink;

pub use notifier::CompositeNotifier;
pub use notifier::CompositeNotifierBuilder;
pub use sink::CallbackSink;
pub use sink::NotifySink;
pub use sink::SinkError;
pub use sink::WebhookTarget;
