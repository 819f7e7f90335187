//! Cross-module scenarios: end-to-end dispatch and dispatch racing a
//! generation swap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch::{
    Dispatcher, EventDocument, EventKeys, EventTypeName, HealthMonitor, MessageBody,
    MessageVersion, NullParser, Parameters, ParseContext, ParserError, ParserFactory,
    ProbeSchedule, VersionResolver, WebhookParser, WebhookPayload,
};
use serde_json::json;

/// Renders the generation it belongs to, yielding a few times mid-parse so
/// concurrent swaps get a chance to land while it runs.
struct GenerationTagged(MessageVersion);

#[async_trait]
impl WebhookParser for GenerationTagged {
    fn name(&self) -> &str {
        "GenerationTagged"
    }

    fn events(&self) -> &[&'static str] {
        &["issue_generic", "jira:issue_created"]
    }

    async fn parse(
        &self,
        _ctx: ParseContext<'_>,
        event: &EventDocument,
    ) -> Result<MessageBody, ParserError> {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let key = event
            .pointer("/issue/key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParserError::missing("/issue/key"))?;
        Ok(MessageBody::text(format!("{}:{key}", self.0)))
    }
}

fn resolver() -> Arc<VersionResolver> {
    let schedule = ProbeSchedule::new(Duration::from_secs(5), Duration::from_secs(60)).unwrap();
    let (monitor, _signals) = HealthMonitor::new(schedule);
    let factories = MessageVersion::ALL
        .into_iter()
        .map(|version| {
            let parser: Arc<dyn WebhookParser> = Arc::new(GenerationTagged(version));
            Arc::new(ParserFactory::new(version, vec![parser]))
        })
        .collect();
    Arc::new(VersionResolver::new(factories, monitor).unwrap())
}

#[tokio::test]
async fn issue_created_with_generic_sub_type_renders_through_sub_type_parser() {
    let dispatcher = Dispatcher::new(resolver(), Arc::new(NullParser))
        .with_event_keys(EventKeys::new("event_name", "issue_event_type_name"));

    let body = json!({
        "event_name": "issue_created",
        "issue_event_type_name": "issue_generic",
        "issue": { "key": "RELAY-9" }
    });
    let message = dispatcher
        .dispatch(&WebhookPayload::new(body.to_string(), Parameters::new()))
        .await
        .unwrap();

    assert_eq!(message.body, MessageBody::text("V1:RELAY-9"));
    assert_eq!(message.event_name, EventTypeName::new("issue_created"));
    assert_eq!(message.matched, EventTypeName::new("issue_generic"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_each_observe_one_generation() {
    let resolver = resolver();
    let dispatcher = Arc::new(Dispatcher::new(resolver.clone(), Arc::new(NullParser)));

    let swapper = {
        let resolver = resolver.clone();
        tokio::spawn(async move {
            for round in 0..50 {
                let version = if round % 2 == 0 {
                    MessageVersion::V2
                } else {
                    MessageVersion::V1
                };
                resolver.on_version_changed(version).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut calls = Vec::new();
    for n in 0..400 {
        let dispatcher = dispatcher.clone();
        calls.push(tokio::spawn(async move {
            let body = json!({
                "webhookEvent": "jira:issue_created",
                "issue_event_type_name": "issue_generic",
                "issue": { "key": format!("RELAY-{n}") }
            });
            dispatcher
                .dispatch(&WebhookPayload::new(body.to_string(), Parameters::new()))
                .await
                .unwrap()
        }));
    }

    for (n, call) in calls.into_iter().enumerate() {
        let message = call.await.unwrap();
        let expected = MessageBody::text(format!("{}:RELAY-{n}", message.version));
        assert_eq!(message.body, expected);
    }
    swapper.await.unwrap();

    resolver.shutdown().await;
    assert!(!resolver.monitor().is_running());
}
