//! Entry point for inbound events.
//!
//! One dispatch call:
//!
//! 1. decodes the payload body (a decode failure stops here, no parser runs);
//! 2. takes one snapshot of the active factory and of its settings;
//! 3. extracts the event sub-type name and the primary event name;
//! 4. looks up the sub-type name, then the primary name, then falls back;
//! 5. runs the parser under a generous timeout and tags the result with the
//!    primary event name.
//!
//! The snapshot taken in step 2 is dropped when the call returns, so a
//! generation swap that lands mid-call affects only later calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, field, instrument, warn, Span};

use crate::parser::{FallbackParser, ParseContext};
use crate::resolver::VersionResolver;
use crate::{
    DispatchError, DispatchId, EventDocument, EventKeys, Parameters, RenderedMessage, Timestamp,
    WebhookPayload,
};

/// Upper bound on a single parser invocation.
pub const DEFAULT_PARSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes decoded events to the active generation's parsers.
pub struct Dispatcher {
    resolver: Arc<VersionResolver>,
    fallback: Arc<dyn FallbackParser>,
    keys: EventKeys,
    parse_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with default event keys and parse timeout.
    pub fn new(resolver: Arc<VersionResolver>, fallback: Arc<dyn FallbackParser>) -> Self {
        Self {
            resolver,
            fallback,
            keys: EventKeys::default(),
            parse_timeout: DEFAULT_PARSE_TIMEOUT,
        }
    }

    /// Overrides the document fields used as dispatch keys.
    pub fn with_event_keys(mut self, keys: EventKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Overrides the parser timeout.
    pub fn with_parse_timeout(mut self, parse_timeout: Duration) -> Self {
        self.parse_timeout = parse_timeout;
        self
    }

    /// The resolver supplying the active generation.
    pub fn resolver(&self) -> &Arc<VersionResolver> {
        &self.resolver
    }

    /// Decodes and dispatches a raw payload.
    pub async fn dispatch(
        &self,
        payload: &WebhookPayload,
    ) -> Result<RenderedMessage, DispatchError> {
        let document = EventDocument::from_slice(&payload.body).map_err(|source| {
            warn!(
                error = %source,
                bytes = payload.body.len(),
                "Webhook payload could not be decoded"
            );
            DispatchError::Decode { source }
        })?;
        self.dispatch_event(&document, &payload.parameters).await
    }

    /// Dispatches an already decoded document.
    #[instrument(
        skip_all,
        fields(dispatch_id = field::Empty, version = field::Empty, event_type = field::Empty)
    )]
    pub async fn dispatch_event(
        &self,
        document: &EventDocument,
        parameters: &Parameters,
    ) -> Result<RenderedMessage, DispatchError> {
        let id = DispatchId::new_random();
        let factory = self.resolver.active();
        let settings = factory.settings();
        let version = factory.generation();
        let keys = self.keys.extract(document);

        let span = Span::current();
        span.record("dispatch_id", field::display(id));
        span.record("version", field::display(version));

        let ctx = ParseContext {
            parameters,
            settings: &settings,
            keys: &keys,
        };

        let (matched, parser, body) = match factory.registry().lookup(&keys) {
            Some(resolved) => {
                span.record("event_type", resolved.event_type.as_str());
                let name = resolved.parser.name();
                let outcome =
                    tokio::time::timeout(self.parse_timeout, resolved.parser.parse(ctx, document))
                        .await;
                let body = match outcome {
                    Ok(Ok(body)) => body,
                    Ok(Err(source)) => {
                        warn!(parser = name, error = %source, "Parser failed");
                        return Err(DispatchError::Parser {
                            event_type: resolved.event_type.clone(),
                            parser: name.to_string(),
                            version,
                            source,
                        });
                    }
                    Err(_) => {
                        warn!(parser = name, timeout = ?self.parse_timeout, "Parser timed out");
                        return Err(DispatchError::Timeout {
                            event_type: resolved.event_type.clone(),
                            parser: name.to_string(),
                            version,
                            elapsed: self.parse_timeout,
                        });
                    }
                };
                (Some(resolved.event_type.clone()), name.to_string(), body)
            }
            None => {
                debug!(
                    event_name = keys.event_name.as_ref().map(|e| e.as_str()),
                    event_type = keys.event_type.as_ref().map(|e| e.as_str()),
                    "No parser registered, using fallback"
                );
                let body = self.fallback.render(ctx, document);
                (None, self.fallback.name().to_string(), body)
            }
        };

        Ok(RenderedMessage {
            id,
            event_name: keys.event_name.clone(),
            matched,
            parser,
            version,
            body,
            rendered_at: Timestamp::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::monitor::{HealthMonitor, ProbeSchedule};
    use crate::parser::{NullParser, WebhookParser};
    use crate::registry::ParserFactory;
    use crate::{EventTypeName, IntegrationSettings, MessageBody, MessageVersion, ParserError};

    struct Echo(&'static [&'static str]);

    #[async_trait]
    impl WebhookParser for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn events(&self) -> &[&'static str] {
            self.0
        }

        async fn parse(
            &self,
            ctx: ParseContext<'_>,
            event: &EventDocument,
        ) -> Result<MessageBody, ParserError> {
            let key = event
                .str_field("key")
                .ok_or_else(|| ParserError::missing("key"))?;
            let channel = ctx.parameters.get("channel").map(String::as_str).unwrap_or("-");
            Ok(MessageBody::text(format!("{key}|{channel}|{}", ctx.settings.user)))
        }
    }

    struct Stalled;

    #[async_trait]
    impl WebhookParser for Stalled {
        fn name(&self) -> &str {
            "Stalled"
        }

        fn events(&self) -> &[&'static str] {
            &["stalled"]
        }

        async fn parse(
            &self,
            _ctx: ParseContext<'_>,
            _event: &EventDocument,
        ) -> Result<MessageBody, ParserError> {
            std::future::pending().await
        }
    }

    fn dispatcher(parser: Arc<dyn WebhookParser>) -> Dispatcher {
        let schedule = ProbeSchedule::new(Duration::from_secs(5), Duration::from_secs(60)).unwrap();
        let factories = vec![Arc::new(ParserFactory::new(MessageVersion::V1, vec![parser]))];
        let resolver = VersionResolver::new(factories, HealthMonitor::new(schedule).0).unwrap();
        Dispatcher::new(Arc::new(resolver), Arc::new(NullParser))
    }

    fn payload(body: serde_json::Value) -> WebhookPayload {
        WebhookPayload::new(body.to_string(), Parameters::new())
    }

    #[tokio::test]
    async fn primary_name_is_used_when_sub_type_is_absent() {
        let dispatcher = dispatcher(Arc::new(Echo(&["jira:issue_created"])));
        let message = dispatcher
            .dispatch(&payload(json!({"webhookEvent": "jira:issue_created", "key": "RELAY-1"})))
            .await
            .unwrap();

        assert_eq!(message.matched, EventTypeName::new("jira:issue_created"));
        assert_eq!(message.event_name, EventTypeName::new("jira:issue_created"));
        assert_eq!(message.body, MessageBody::text("RELAY-1|-|"));
        assert_eq!(message.version, MessageVersion::V1);
    }

    #[tokio::test]
    async fn parameters_and_settings_reach_the_parser() {
        let dispatcher = dispatcher(Arc::new(Echo(&["issue_generic"])));
        dispatcher
            .resolver()
            .on_config_change(&IntegrationSettings::new("jirabot"));
        let mut parameters = Parameters::new();
        parameters.insert("channel".into(), "ops".into());

        let body = json!({"issue_event_type_name": "issue_generic", "key": "RELAY-2"});
        let message = dispatcher
            .dispatch(&WebhookPayload::new(body.to_string(), parameters))
            .await
            .unwrap();

        assert_eq!(message.body, MessageBody::text("RELAY-2|ops|jirabot"));
        assert_eq!(message.event_name, None);
    }

    #[tokio::test]
    async fn unmatched_event_uses_fallback() {
        let dispatcher = dispatcher(Arc::new(Echo(&["issue_generic"])));
        let message = dispatcher
            .dispatch(&payload(json!({"webhookEvent": "project_created"})))
            .await
            .unwrap();

        assert_eq!(message.matched, None);
        assert_eq!(message.parser, "NullParser");
        assert!(message.body.is_empty());
        assert_eq!(message.event_name, EventTypeName::new("project_created"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_failure() {
        let dispatcher = dispatcher(Arc::new(Echo(&["issue_generic"])));
        let err = dispatcher
            .dispatch(&WebhookPayload::new("{not json", Parameters::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Decode { .. }));
    }

    #[tokio::test]
    async fn parser_failure_names_the_matched_event_type() {
        let dispatcher = dispatcher(Arc::new(Echo(&["issue_generic"])));
        let err = dispatcher
            .dispatch(&payload(json!({
                "webhookEvent": "jira:issue_updated",
                "issue_event_type_name": "issue_generic"
            })))
            .await
            .unwrap_err();

        match err {
            DispatchError::Parser {
                event_type,
                parser,
                version,
                source: ParserError::MissingField { field },
            } => {
                assert_eq!(event_type.as_str(), "issue_generic");
                assert_eq!(parser, "Echo");
                assert_eq!(version, MessageVersion::V1);
                assert_eq!(field, "key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_parser_times_out() {
        let dispatcher =
            dispatcher(Arc::new(Stalled)).with_parse_timeout(Duration::from_secs(2));
        let err = dispatcher
            .dispatch(&payload(json!({"webhookEvent": "stalled"})))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Timeout { elapsed, .. } if elapsed == Duration::from_secs(2)
        ));
    }
}
