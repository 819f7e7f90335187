//! Parser ports.
//!
//! A [`WebhookParser`] declares the event-type identifiers it handles and
//! turns a decoded [`EventDocument`] into a [`MessageBody`]. Parsers are
//! instantiated once at startup and live until shutdown; the only mutation
//! they see afterwards is the optional [`WebhookParser::on_config_change`]
//! hook.
//!
//! A [`FallbackParser`] is the generation-independent default used when no
//! registered parser matches. Its signature is infallible so a lookup miss
//! can never surface as an error.

use async_trait::async_trait;

use crate::{
    DispatchKeys, EventDocument, IntegrationSettings, MessageBody, Parameters, ParserError,
};

/// Per-call context handed to a parser alongside the event document.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Side-channel parameters, unmodified.
    pub parameters: &'a Parameters,
    /// Settings snapshot taken once at the start of the dispatch.
    pub settings: &'a IntegrationSettings,
    /// Both candidate identifiers extracted from the document.
    pub keys: &'a DispatchKeys,
}

/// A capability unit rendering one or more event types.
#[async_trait]
pub trait WebhookParser: Send + Sync {
    /// Name used in logs and in failure reports.
    fn name(&self) -> &str;

    /// Event-type identifiers this parser handles.
    fn events(&self) -> &[&'static str];

    /// Renders a decoded event.
    async fn parse(
        &self,
        ctx: ParseContext<'_>,
        event: &EventDocument,
    ) -> Result<MessageBody, ParserError>;

    /// Observes a settings change. Parsers that derive cached state from the
    /// settings refresh it here; the default does nothing because every parse
    /// already receives the current snapshot through [`ParseContext`].
    fn on_config_change(&self, _settings: &IntegrationSettings) {}
}

/// Default parser used when neither candidate identifier is registered.
pub trait FallbackParser: Send + Sync {
    /// Name used in logs and on the rendered message.
    fn name(&self) -> &str;

    /// Produces a best-effort rendering. Must not fail.
    fn render(&self, ctx: ParseContext<'_>, event: &EventDocument) -> MessageBody;
}

/// Fallback that renders an empty text body.
///
/// Downstream delivery treats an empty body as "nothing to post", which is
/// the neutral outcome for events the integration does not understand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullParser;

impl FallbackParser for NullParser {
    fn name(&self) -> &str {
        "NullParser"
    }

    fn render(&self, _ctx: ParseContext<'_>, _event: &EventDocument) -> MessageBody {
        MessageBody::text("")
    }
}
