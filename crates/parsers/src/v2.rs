//! MessageML v2 generation: structured entities rendered client-side.

use async_trait::async_trait;
use dispatch::{EventDocument, MessageBody, ParseContext, ParserError, WebhookParser};
use serde_json::{json, Value};

use crate::fields::{str_at, IssueFields};

/// Entity type consumed by the issue-state renderer in the client.
pub const ISSUE_STATE_ENTITY: &str = "com.symphony.integration.jira.event.v2.state";

/// Renders issue and comment events as an issue-state entity.
#[derive(Debug, Default)]
pub struct IssueStateParser;

impl IssueStateParser {
    /// Identifiers handled by [`IssueStateParser`].
    pub const EVENTS: &'static [&'static str] = &[
        "jira:issue_created",
        "jira:issue_updated",
        "issue_created",
        "issue_updated",
        "issue_generic",
        "issue_assigned",
        "issue_commented",
        "issue_comment_edited",
    ];
}

#[async_trait]
impl WebhookParser for IssueStateParser {
    fn name(&self) -> &str {
        "IssueStateParser"
    }

    fn events(&self) -> &[&'static str] {
        Self::EVENTS
    }

    async fn parse(
        &self,
        ctx: ParseContext<'_>,
        event: &EventDocument,
    ) -> Result<MessageBody, ParserError> {
        let issue = IssueFields::extract(event)?;
        let comment = str_at(event, "/comment/body").map(|body| {
            json!({
                "body": body,
                "author": str_at(event, "/comment/author/displayName"),
            })
        });

        let data = json!({
            "issue": {
                "key": issue.key,
                "url": issue.url,
                "summary": issue.summary,
                "status": issue.status,
                "assignee": issue.assignee.map(|name| json!({ "displayName": name })),
            },
            "user": issue.actor.map(|name| json!({ "displayName": name })),
            "comment": comment.unwrap_or(Value::Null),
            "eventType": ctx.keys.event_type.as_ref().or(ctx.keys.event_name.as_ref()),
            "integrationUser": ctx.settings.user,
        });

        Ok(MessageBody::Entity {
            entity_type: ISSUE_STATE_ENTITY.to_string(),
            data,
        })
    }
}
