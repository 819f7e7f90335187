//! Shared value types for the dispatch core.
//!
//! These carry the data that flows through one dispatch call (the decoded
//! event document, its side-channel parameters, the rendered output) and the
//! small closed set of version tags that select a parser generation.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DispatchId, EventTypeName};

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Rendering-format generation currently in effect in the environment.
///
/// Ordered by capability: `V1 < V2`. Exactly one generation is active at any
/// instant; changes are rare and driven by the version probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageVersion {
    /// Plain MessageML markup.
    V1,
    /// Structured MessageML with entity data.
    V2,
}

impl MessageVersion {
    /// Generation installed before any probe has completed.
    ///
    /// The lowest-capability generation, so output degrades gracefully when
    /// the environment has not been checked yet.
    pub const DEFAULT: Self = Self::V1;

    /// Best-known generation. Once reached there is nothing left to probe for.
    pub const TERMINAL: Self = Self::V2;

    /// Every known generation, lowest capability first.
    pub const ALL: [Self; 2] = [Self::V1, Self::V2];

    /// Returns `true` if this is the best-known generation.
    pub fn is_terminal(self) -> bool {
        self == Self::TERMINAL
    }

    /// Returns the generation supported by an agent of the given version.
    pub fn for_agent(agent: AgentVersion) -> Self {
        if agent >= AgentVersion::FIRST_WITH_V2 {
            Self::V2
        } else {
            Self::V1
        }
    }
}

impl std::fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "V1"),
            Self::V2 => write!(f, "V2"),
        }
    }
}

// ---------------------------------------------------------------------------

/// Release version reported by the agent, reduced to `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl AgentVersion {
    /// First agent release that renders MessageML v2.
    pub const FIRST_WITH_V2: Self = Self::new(1, 46);

    /// Creates a new [`AgentVersion`].
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses a dotted release string such as `"1.46.0"` or `"1.45.2-SNAPSHOT"`.
    ///
    /// Only the major and minor components are kept; anything after the
    /// leading digits of the minor component is ignored. Returns `None` when
    /// either component is missing or not numeric.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor_part = parts.next()?;
        let digits: String = minor_part.chars().take_while(char::is_ascii_digit).collect();
        let minor = digits.parse().ok()?;
        Some(Self { major, minor })
    }
}

impl std::fmt::Display for AgentVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// Side-channel parameters delivered alongside a payload (transport metadata).
///
/// Passed unmodified to the selected parser.
pub type Parameters = HashMap<String, String>;

/// Raw webhook payload as handed over by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookPayload {
    /// Undecoded request body.
    pub body: Vec<u8>,
    /// Query-string or header parameters captured by the transport.
    pub parameters: Parameters,
}

impl WebhookPayload {
    /// Creates a payload from a body and its parameters.
    pub fn new(body: impl Into<Vec<u8>>, parameters: Parameters) -> Self {
        Self {
            body: body.into(),
            parameters,
        }
    }
}

// ---------------------------------------------------------------------------

/// A decoded, tree-structured event document.
///
/// Fields other than the two dispatch keys are opaque to the core and are
/// passed through to whichever parser is selected.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDocument(Value);

impl EventDocument {
    /// Wraps an already decoded JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Decodes a JSON document from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }

    /// Returns the underlying JSON tree.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Looks up a value by JSON pointer (e.g. `"/issue/fields/summary"`).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    /// Returns a top-level string field, treating empty strings as absent.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------

/// Names of the two document fields used as dispatch keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKeys {
    /// Field holding the primary event name.
    pub event_name_field: String,
    /// Field holding the more specific event sub-type name.
    pub event_type_field: String,
}

impl EventKeys {
    /// Default field carrying the primary event name.
    pub const DEFAULT_EVENT_NAME_FIELD: &'static str = "webhookEvent";
    /// Default field carrying the event sub-type name.
    pub const DEFAULT_EVENT_TYPE_FIELD: &'static str = "issue_event_type_name";

    /// Creates a custom key mapping.
    pub fn new(event_name_field: impl Into<String>, event_type_field: impl Into<String>) -> Self {
        Self {
            event_name_field: event_name_field.into(),
            event_type_field: event_type_field.into(),
        }
    }

    /// Extracts both candidate identifiers from a document.
    pub fn extract(&self, document: &EventDocument) -> DispatchKeys {
        DispatchKeys {
            event_name: document
                .str_field(&self.event_name_field)
                .and_then(EventTypeName::new),
            event_type: document
                .str_field(&self.event_type_field)
                .and_then(EventTypeName::new),
        }
    }
}

impl Default for EventKeys {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EVENT_NAME_FIELD, Self::DEFAULT_EVENT_TYPE_FIELD)
    }
}

/// The two candidate identifiers extracted from one event document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchKeys {
    /// Primary event name. Tags the rendered message.
    pub event_name: Option<EventTypeName>,
    /// Specific event sub-type name. Looked up first.
    pub event_type: Option<EventTypeName>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Environment settings managed outside the relay and pushed on change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationSettings {
    /// Identity the integration posts as in the issue tracker.
    pub user: String,
    /// Free-form settings not interpreted by the core.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl IntegrationSettings {
    /// Creates settings for the given integration user.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            properties: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Body produced by a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Markup text (MessageML v1).
    Text {
        /// Rendered markup.
        markup: String,
    },
    /// Structured entity (MessageML v2), rendered by the client from a template.
    Entity {
        /// Entity type consumed by the client-side renderer.
        entity_type: String,
        /// Entity data.
        data: Value,
    },
}

impl MessageBody {
    /// Creates a text body.
    pub fn text(markup: impl Into<String>) -> Self {
        Self::Text {
            markup: markup.into(),
        }
    }

    /// Returns `true` for an empty text body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text { markup } if markup.is_empty())
    }
}

/// Render-ready message handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Correlation id of the dispatch call that produced this message.
    pub id: DispatchId,
    /// Primary event name of the inbound document, used downstream for
    /// routing and telemetry. Never used for re-dispatch.
    pub event_name: Option<EventTypeName>,
    /// Identifier the parser was selected by; `None` when the fallback ran.
    pub matched: Option<EventTypeName>,
    /// Parser that produced the body.
    pub parser: String,
    /// Generation whose registry served the dispatch.
    pub version: MessageVersion,
    /// Rendered content.
    pub body: MessageBody,
    /// When rendering completed.
    pub rendered_at: Timestamp,
}
