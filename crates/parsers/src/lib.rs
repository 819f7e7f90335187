//! Issue-tracker parser generations for the webhook relay.
//!
//! Each generation is a fixed, ordered parser list turned into a
//! [`ParserFactory`] at startup. Order matters: on identifier collisions the
//! later parser wins.
//!
//! | Generation | Output | Parsers |
//! |------------|--------|---------|
//! | V1 | Markup text | [`v1::IssueParser`], [`v1::CommentParser`] |
//! | V2 | Issue-state entity | [`v2::IssueStateParser`] |
//!
//! ## Architectural Layer
//!
//! **Renderers.** Pure field mapping; routing, versioning and fallback live
//! in the [`dispatch`] crate.

use std::sync::Arc;

use dispatch::{MessageVersion, ParserFactory, WebhookParser};

mod fields;
pub mod v1;
pub mod v2;

/// Builds the MessageML v1 factory.
pub fn v1_factory() -> ParserFactory {
    let parsers: Vec<Arc<dyn WebhookParser>> =
        vec![Arc::new(v1::IssueParser), Arc::new(v1::CommentParser)];
    ParserFactory::new(MessageVersion::V1, parsers)
}

/// Builds the MessageML v2 factory.
pub fn v2_factory() -> ParserFactory {
    let parsers: Vec<Arc<dyn WebhookParser>> = vec![Arc::new(v2::IssueStateParser)];
    ParserFactory::new(MessageVersion::V2, parsers)
}

/// One factory per supported generation, lowest capability first.
pub fn all_factories() -> Vec<Arc<ParserFactory>> {
    vec![Arc::new(v1_factory()), Arc::new(v2_factory())]
}
