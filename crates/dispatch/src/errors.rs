//! Error taxonomy for the dispatch core.
//!
//! Every failure is local to one call: a failing dispatch never changes the
//! active generation, and a failing version transition never reaches the
//! dispatch path.
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`DispatchError::Decode`] | dispatcher | no parser invoked |
//! | [`ResolutionError`] | resolver | last-good generation retained |
//! | [`DispatchError::Parser`] | dispatcher | parser failure tagged with its key |
//! | [`DispatchError::Timeout`] | dispatcher | parser exceeded its bound |
//! | [`AuthorizationError`] | integration | message plus remediation hint |
//! | [`DiscoveryError`] | version probe | logged, generation retained |
//!
//! Lookup misses are not errors; they resolve to the fallback parser.

use std::time::Duration;

use thiserror::Error;

use crate::{EventTypeName, MessageVersion};

// ---------------------------------------------------------------------------
// Parser errors
// ---------------------------------------------------------------------------

/// Failure raised by a parser implementation while transforming a document.
#[derive(Debug, Error)]
pub enum ParserError {
    /// A field the parser requires is absent or has the wrong shape.
    #[error("Missing or invalid field '{field}'")]
    MissingField {
        /// JSON pointer or field name that was expected.
        field: String,
    },

    /// Any other rendering failure.
    #[error("{message}")]
    Render {
        /// Description of what went wrong.
        message: String,
    },
}

impl ParserError {
    /// Shorthand for [`ParserError::MissingField`].
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

/// Failure of a single dispatch call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload body could not be decoded into a document tree.
    ///
    /// No parser was invoked.
    #[error("Something went wrong while trying to decode the payload: {source}")]
    Decode {
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// The selected parser failed.
    #[error("Parser '{parser}' failed on event type '{event_type}' ({version}): {source}")]
    Parser {
        /// Identifier the parser was selected by.
        event_type: EventTypeName,
        /// Name of the failing parser.
        parser: String,
        /// Generation that served the dispatch.
        version: MessageVersion,
        /// Parser-reported cause.
        #[source]
        source: ParserError,
    },

    /// The selected parser did not complete within the configured bound.
    #[error("Parser '{parser}' timed out after {elapsed:?} on event type '{event_type}' ({version})")]
    Timeout {
        /// Identifier the parser was selected by.
        event_type: EventTypeName,
        /// Name of the stalled parser.
        parser: String,
        /// Generation that served the dispatch.
        version: MessageVersion,
        /// Bound that was exceeded.
        elapsed: Duration,
    },
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

/// Configuration mismatch between a version tag and the registered factories.
///
/// Surfaced to the caller of a version transition. The active generation is
/// left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The resolver was built without any factory.
    #[error("No parser factories are configured")]
    NoFactories,

    /// No configured factory accepts the version.
    #[error("No parser factory accepts message version {version}")]
    NoMatchingFactory {
        /// Version that could not be served.
        version: MessageVersion,
    },

    /// More than one configured factory accepts the version.
    #[error("{count} parser factories accept message version {version}; exactly one is required")]
    AmbiguousFactories {
        /// Version that matched several factories.
        version: MessageVersion,
        /// Number of factories that accepted it.
        count: usize,
    },
}

// ---------------------------------------------------------------------------
// Version discovery errors
// ---------------------------------------------------------------------------

/// Failure of the external version-discovery collaborator.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The version endpoint could not be reached.
    #[error("Version endpoint unreachable: {message}")]
    Transport {
        /// Transport-level description.
        message: String,
    },

    /// The version endpoint answered with a non-success status.
    #[error("Version endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response did not carry a recognisable version.
    #[error("Unrecognised agent version '{raw}'")]
    MalformedVersion {
        /// Raw value as received.
        raw: String,
    },
}

// ---------------------------------------------------------------------------
// Authorization errors
// ---------------------------------------------------------------------------

/// Failure of the authorized-integration flow.
///
/// Every variant carries a human-readable cause and a remediation hint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// The temporary token or the verification code is missing or blank.
    #[error("{message}")]
    InsufficientParameters {
        /// Cause.
        message: String,
        /// Suggested remediation.
        solution: String,
    },

    /// No integration settings are active.
    #[error("{message}")]
    NoIntegrationSettings {
        /// Cause.
        message: String,
        /// Suggested remediation.
        solution: String,
    },

    /// The authorization manager rejected the request.
    #[error("{message}")]
    Rejected {
        /// Cause.
        message: String,
        /// Suggested remediation.
        solution: String,
    },
}

impl AuthorizationError {
    /// Returns the remediation hint.
    pub fn solution(&self) -> &str {
        match self {
            Self::InsufficientParameters { solution, .. }
            | Self::NoIntegrationSettings { solution, .. }
            | Self::Rejected { solution, .. } => solution,
        }
    }
}
