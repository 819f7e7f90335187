//! Field extraction shared by both generations.

use dispatch::{EventDocument, ParserError};

/// Issue fields every issue-tracker event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFields<'a> {
    pub key: &'a str,
    pub summary: &'a str,
    pub status: Option<&'a str>,
    pub assignee: Option<&'a str>,
    pub actor: Option<&'a str>,
    pub url: Option<String>,
}

impl<'a> IssueFields<'a> {
    /// Extracts the issue block. The key is mandatory; everything else is
    /// rendered only when present.
    pub fn extract(event: &'a EventDocument) -> Result<Self, ParserError> {
        let key = str_at(event, "/issue/key").ok_or_else(|| ParserError::missing("/issue/key"))?;
        Ok(Self {
            key,
            summary: str_at(event, "/issue/fields/summary").unwrap_or_default(),
            status: str_at(event, "/issue/fields/status/name"),
            assignee: str_at(event, "/issue/fields/assignee/displayName"),
            actor: str_at(event, "/user/displayName"),
            url: str_at(event, "/issue/self").and_then(|api| browse_url(api, key)),
        })
    }
}

/// Non-empty string at a JSON pointer.
pub fn str_at<'a>(event: &'a EventDocument, pointer: &str) -> Option<&'a str> {
    event
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Turns a REST resource URL (`https://host/rest/api/2/issue/10001`) into the
/// human browse URL (`https://host/browse/KEY-1`).
pub fn browse_url(api_url: &str, key: &str) -> Option<String> {
    let base = &api_url[..api_url.find("/rest/api/")?];
    Some(format!("{base}/browse/{key}"))
}

/// Escapes text for inclusion in MessageML markup.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
