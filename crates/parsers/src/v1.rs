//! MessageML v1 generation: plain markup text.

use async_trait::async_trait;
use dispatch::{EventDocument, MessageBody, ParseContext, ParserError, WebhookParser};

use crate::fields::{escape, str_at, IssueFields};

/// Renders issue lifecycle events as a one-line markup summary.
#[derive(Debug, Default)]
pub struct IssueParser;

impl IssueParser {
    /// Identifiers handled by [`IssueParser`].
    pub const EVENTS: &'static [&'static str] = &[
        "jira:issue_created",
        "jira:issue_updated",
        "issue_created",
        "issue_updated",
        "issue_generic",
        "issue_assigned",
    ];
}

#[async_trait]
impl WebhookParser for IssueParser {
    fn name(&self) -> &str {
        "IssueParser"
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
        let verb = match ctx.keys.event_type.as_ref().or(ctx.keys.event_name.as_ref()) {
            Some(name) if name.as_str().ends_with("created") => "created",
            Some(name) if name.as_str() == "issue_assigned" => "assigned",
            _ => "updated",
        };

        let mut markup = String::new();
        markup.push_str(&escape(issue.actor.unwrap_or("Someone")));
        markup.push(' ');
        markup.push_str(verb);
        markup.push(' ');
        markup.push_str(&issue_link(&issue));
        if !issue.summary.is_empty() {
            markup.push_str(": ");
            markup.push_str(&escape(issue.summary));
        }
        if let Some(status) = issue.status {
            markup.push_str(&format!(" [{}]", escape(status)));
        }
        if verb == "assigned" {
            if let Some(assignee) = issue.assignee {
                markup.push_str(&format!(" to {}", escape(assignee)));
            }
        }
        Ok(MessageBody::text(markup))
    }
}

// ---------------------------------------------------------------------------

/// Renders comment events.
#[derive(Debug, Default)]
pub struct CommentParser;

impl CommentParser {
    /// Identifiers handled by [`CommentParser`].
    pub const EVENTS: &'static [&'static str] =
        &["issue_commented", "issue_comment_edited", "comment_created", "comment_updated"];
}

#[async_trait]
impl WebhookParser for CommentParser {
    fn name(&self) -> &str {
        "CommentParser"
    }

    fn events(&self) -> &[&'static str] {
        Self::EVENTS
    }

    async fn parse(
        &self,
        _ctx: ParseContext<'_>,
        event: &EventDocument,
    ) -> Result<MessageBody, ParserError> {
        let issue = IssueFields::extract(event)?;
        let body =
            str_at(event, "/comment/body").ok_or_else(|| ParserError::missing("/comment/body"))?;
        let author = str_at(event, "/comment/author/displayName")
            .or(issue.actor)
            .unwrap_or("Someone");

        Ok(MessageBody::text(format!(
            "{} commented on {}: {}",
            escape(author),
            issue_link(&issue),
            escape(body)
        )))
    }
}

fn issue_link(issue: &IssueFields<'_>) -> String {
    match &issue.url {
        Some(url) => format!("<a href=\"{}\">{}</a>", escape(url), escape(issue.key)),
        None => escape(issue.key),
    }
}

#[cfg(test)]
mod tests {
    use dispatch::{DispatchKeys, EventKeys, IntegrationSettings, Parameters};
    use serde_json::json;

    use super::*;

    async fn render(
        parser: &dyn WebhookParser,
        event: serde_json::Value,
    ) -> Result<MessageBody, ParserError> {
        let event = EventDocument::new(event);
        let keys: DispatchKeys = EventKeys::default().extract(&event);
        let parameters = Parameters::new();
        let settings = IntegrationSettings::new("jirabot");
        let ctx = ParseContext {
            parameters: &parameters,
            settings: &settings,
            keys: &keys,
        };
        parser.parse(ctx, &event).await
    }

    #[tokio::test]
    async fn created_issue_renders_link_and_summary() {
        let body = render(
            &IssueParser,
            json!({
                "webhookEvent": "jira:issue_created",
                "user": {"displayName": "Ada"},
                "issue": {
                    "key": "SUP-1",
                    "self": "https://jira.example.com/rest/api/2/issue/10001",
                    "fields": {"summary": "Printer <on fire>", "status": {"name": "Open"}}
                }
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            body,
            MessageBody::text(
                "Ada created <a href=\"https://jira.example.com/browse/SUP-1\">SUP-1</a>: \
                 Printer &lt;on fire&gt; [Open]"
            )
        );
    }

    #[tokio::test]
    async fn assignment_names_the_assignee() {
        let body = render(
            &IssueParser,
            json!({
                "webhookEvent": "jira:issue_updated",
                "issue_event_type_name": "issue_assigned",
                "issue": {"key": "SUP-2", "fields": {"assignee": {"displayName": "Grace"}}}
            }),
        )
        .await
        .unwrap();

        assert_eq!(body, MessageBody::text("Someone assigned SUP-2 to Grace"));
    }

    #[tokio::test]
    async fn comment_without_body_fails() {
        let err = render(
            &CommentParser,
            json!({"issue_event_type_name": "issue_commented", "issue": {"key": "SUP-3"}}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParserError::MissingField { field } if field == "/comment/body"));
    }
}
