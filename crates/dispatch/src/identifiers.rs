//! Newtype identifiers used on the dispatch path.
//!
//! Event-type identifiers are lookup keys taken from an inbound payload;
//! dispatch ids correlate everything one payload produced.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, Borrow<str>.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Dispatch key extracted from an inbound event document.
    ///
    /// Either the primary event name (e.g. `"jira:issue_created"`) or the more
    /// specific event sub-type name (e.g. `"issue_generic"`).
    EventTypeName
}

// ---------------------------------------------------------------------------

/// Identifies one dispatch call.
///
/// Generated fresh for every inbound payload and attached to the rendered
/// message and to the dispatch span, so log lines for one event can be
/// correlated across the resolver, the parser and the delivery collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchId(Uuid);

impl DispatchId {
    /// Generates a new random dispatch identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_event_type_is_rejected() {
        assert!(EventTypeName::new("").is_none());
        assert_eq!(
            EventTypeName::new("issue_generic").map(|e| e.to_string()),
            Some("issue_generic".to_string())
        );
    }

    #[test]
    fn dispatch_ids_are_unique() {
        assert_ne!(DispatchId::new_random(), DispatchId::new_random());
    }
}
