//! Parser registries and per-generation factories.
//!
//! A [`ParserRegistry`] maps event-type identifiers to parsers for exactly one
//! generation. It is built once from the generation's parser list and never
//! patched afterwards; switching generations installs a different factory
//! (and therefore a different registry) wholesale.
//!
//! ## Collision policy
//!
//! When two parsers declare the same identifier, the one registered **later**
//! wins. Parser lists are assembled explicitly at startup, so the order is
//! part of the configuration: a more specific parser listed after a generic
//! one overrides it for the identifiers they share.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::parser::WebhookParser;
use crate::{DispatchKeys, EventTypeName, IntegrationSettings, MessageVersion};

/// A parser resolved for one dispatch, with the identifier that selected it.
#[derive(Clone, Copy)]
pub struct Resolved<'a> {
    /// Identifier that matched.
    pub event_type: &'a EventTypeName,
    /// Parser registered for it.
    pub parser: &'a Arc<dyn WebhookParser>,
}

// ---------------------------------------------------------------------------

/// Identifier-to-parser map for one generation. Immutable after construction.
pub struct ParserRegistry {
    by_event: HashMap<EventTypeName, Arc<dyn WebhookParser>>,
    parsers: Vec<Arc<dyn WebhookParser>>,
}

impl ParserRegistry {
    /// Builds a registry from an ordered parser list.
    ///
    /// Deterministic: each declared identifier maps to the last parser in
    /// `parsers` that declares it. Empty identifiers are ignored.
    pub fn build(parsers: Vec<Arc<dyn WebhookParser>>) -> Self {
        let mut by_event: HashMap<EventTypeName, Arc<dyn WebhookParser>> = HashMap::new();
        for parser in &parsers {
            for event in parser.events() {
                let Some(key) = EventTypeName::new(*event) else {
                    continue;
                };
                if let Some(previous) = by_event.insert(key, Arc::clone(parser)) {
                    debug!(
                        event_type = *event,
                        replaced = previous.name(),
                        parser = parser.name(),
                        "Later parser registration overrides earlier one"
                    );
                }
            }
        }
        Self { by_event, parsers }
    }

    /// Returns the parser registered for `event_type`, if any.
    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn WebhookParser>> {
        self.by_event.get(event_type)
    }

    /// Resolves the parser for a document's dispatch keys.
    ///
    /// The specific sub-type name is tried first, then the primary event
    /// name. `None` means the caller should use its fallback parser.
    pub fn lookup<'a>(&'a self, keys: &'a DispatchKeys) -> Option<Resolved<'a>> {
        [keys.event_type.as_ref(), keys.event_name.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|event_type| {
                self.by_event
                    .get(event_type)
                    .map(|parser| Resolved { event_type, parser })
            })
    }

    /// Every parser the registry was built from, in registration order.
    pub fn parsers(&self) -> &[Arc<dyn WebhookParser>] {
        &self.parsers
    }

    /// Number of registered identifiers.
    pub fn len(&self) -> usize {
        self.by_event.len()
    }

    /// Returns `true` when no identifier is registered.
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<(&str, &str)> = self
            .by_event
            .iter()
            .map(|(event, parser)| (event.as_str(), parser.name()))
            .collect();
        events.sort_unstable();
        f.debug_struct("ParserRegistry").field("events", &events).finish()
    }
}

// ---------------------------------------------------------------------------

/// Owns the registry and the settings snapshot for one generation.
///
/// The set of factories is fixed at startup, one per supported generation.
#[derive(Debug)]
pub struct ParserFactory {
    generation: MessageVersion,
    registry: ParserRegistry,
    settings: ArcSwap<IntegrationSettings>,
}

impl ParserFactory {
    /// Creates the factory for `generation` and builds its registry.
    pub fn new(generation: MessageVersion, parsers: Vec<Arc<dyn WebhookParser>>) -> Self {
        Self {
            generation,
            registry: ParserRegistry::build(parsers),
            settings: ArcSwap::from_pointee(IntegrationSettings::default()),
        }
    }

    /// Generation served by this factory.
    pub fn generation(&self) -> MessageVersion {
        self.generation
    }

    /// Returns `true` iff this factory serves `version`.
    pub fn accepts(&self, version: MessageVersion) -> bool {
        self.generation == version
    }

    /// The generation's registry.
    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Current settings snapshot.
    ///
    /// Callers hold the returned `Arc` for one parse so the parse sees one
    /// settings object entirely, even if a change lands meanwhile.
    pub fn settings(&self) -> Arc<IntegrationSettings> {
        self.settings.load_full()
    }

    /// Installs new settings and forwards them to every parser.
    pub fn on_config_change(&self, settings: &IntegrationSettings) {
        self.settings.store(Arc::new(settings.clone()));
        for parser in self.registry.parsers() {
            parser.on_config_change(settings);
        }
    }
}
