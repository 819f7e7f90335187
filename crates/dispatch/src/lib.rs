//! Dispatch and versioning core of the issue-tracker webhook relay.
//!
//! Every inbound event is routed to the one parser able to render it, using
//! the parser generation that matches the MessageML version currently
//! supported by the agent. Generations are swapped atomically when a
//! background probe reports a different version.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network I/O.
//! Parsers ([`WebhookParser`]), version discovery ([`VersionDiscovery`]) and
//! user authorization ([`AuthorizationManager`]) are ports implemented by
//! other crates.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `EventTypeName`, `DispatchId` |
//! | [`types`] | Version tags, payloads, documents, settings, rendered output |
//! | [`errors`] | Error taxonomy |
//! | [`parser`] | Parser and fallback ports, `NullParser` |
//! | [`registry`] | `ParserRegistry`, `ParserFactory` (one per generation) |
//! | [`resolver`] | `VersionResolver`: active-generation slot and transitions |
//! | [`monitor`] | `HealthMonitor`: restartable probe schedule |
//! | [`watcher`] | `VersionWatcher`: probe signal → discovery → transition |
//! | [`dispatcher`] | `Dispatcher`: decode, lookup with fallback, parse |
//! | [`authorization`] | Authorization callback validation and manager port |
//! | [`integration`] | `WebhookIntegration` façade |
//!
//! ## Concurrency
//!
//! Dispatch calls run in parallel and each holds one snapshot of the active
//! factory for its whole execution. Version transitions are rare, serialized,
//! and replace that snapshot with a single pointer store.

pub mod authorization;
pub mod dispatcher;
pub mod errors;
pub mod identifiers;
pub mod integration;
pub mod monitor;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod types;
pub mod watcher;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use authorization::{
    AuthorizationManager, AuthorizationModel, AuthorizationPayload, TemporaryGrant,
};
pub use dispatcher::{Dispatcher, DEFAULT_PARSE_TIMEOUT};
pub use errors::{AuthorizationError, DiscoveryError, DispatchError, ParserError, ResolutionError};
pub use identifiers::{DispatchId, EventTypeName};
pub use integration::WebhookIntegration;
pub use monitor::{HealthMonitor, ProbeSchedule, ProbeSignal};
pub use parser::{FallbackParser, NullParser, ParseContext, WebhookParser};
pub use registry::{ParserFactory, ParserRegistry};
pub use resolver::{VersionResolver, VersionTransition};
pub use types::{
    AgentVersion, DispatchKeys, EventDocument, EventKeys, IntegrationSettings, MessageBody,
    MessageVersion, Parameters, RenderedMessage, Timestamp, WebhookPayload,
};
pub use watcher::{VersionDiscovery, VersionWatcher, WatchError};
