//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment. A `.env`
//! file in the working directory is loaded before parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use dispatch::{EventKeys, Parameters, DEFAULT_PARSE_TIMEOUT};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable lines.
    Pretty,
}

#[derive(Debug, Parser)]
#[command(
    name = "jira-relay",
    about = "Render issue-tracker webhook payloads with the generation the agent supports"
)]
pub struct CliConfig {
    /// Payload files to render. Without any, newline-delimited payloads are
    /// read from stdin until EOF.
    pub payloads: Vec<PathBuf>,

    /// Agent endpoint reporting its release, e.g. `https://agent/v1/info`.
    /// Without it the relay stays on the default generation.
    #[arg(long, env = "RELAY_AGENT_VERSION_URL")]
    pub agent_version_url: Option<String>,

    /// Integration user the settings are delivered for.
    #[arg(
        long,
        env = "RELAY_INTEGRATION_USER",
        default_value = "jirawebhookintegration"
    )]
    pub integration_user: String,

    /// Upper bound on one parser invocation, in seconds.
    #[arg(
        long,
        env = "RELAY_PARSE_TIMEOUT_SECS",
        default_value_t = DEFAULT_PARSE_TIMEOUT.as_secs()
    )]
    pub parse_timeout_secs: u64,

    /// Payload field holding the primary event name.
    #[arg(
        long,
        env = "RELAY_EVENT_NAME_FIELD",
        default_value = EventKeys::DEFAULT_EVENT_NAME_FIELD
    )]
    pub event_name_field: String,

    /// Payload field holding the event sub-type.
    #[arg(
        long,
        env = "RELAY_EVENT_TYPE_FIELD",
        default_value = EventKeys::DEFAULT_EVENT_TYPE_FIELD
    )]
    pub event_type_field: String,

    /// Side-channel parameter passed to parsers, as `key=value`. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Log output format.
    #[arg(long, env = "RELAY_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// OTLP collector endpoint. Spans are exported only when set.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl CliConfig {
    /// Loads `.env` (if present) and parses the process arguments.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }

    pub fn event_keys(&self) -> EventKeys {
        EventKeys::new(&self.event_name_field, &self.event_type_field)
    }

    pub fn parameters(&self) -> Parameters {
        self.params.iter().cloned().collect()
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
