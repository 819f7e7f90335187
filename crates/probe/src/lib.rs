//! Agent version discovery over HTTP.
//!
//! Implements [`dispatch::VersionDiscovery`] by querying the agent's version
//! endpoint and mapping the reported release to a [`MessageVersion`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and response decoding live here. The
//! [`dispatch`] crate sees only [`dispatch::VersionDiscovery`].
//!
//! ## Wire format
//!
//! `GET <url>` must answer `2xx` with a JSON object carrying a `version`
//! string, e.g. `{"version": "1.46.0"}`. Other fields are ignored.

use std::time::Duration;

use async_trait::async_trait;
use dispatch::{AgentVersion, DiscoveryError, MessageVersion, VersionDiscovery};
use serde::Deserialize;
use tracing::debug;

/// Default bound on one version request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

/// [`VersionDiscovery`] backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpVersionProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpVersionProbe {
    /// Creates a probe for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DiscoveryError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The endpoint being probed.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl VersionDiscovery for HttpVersionProbe {
    async fn discover(&self) -> Result<MessageVersion, DiscoveryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| DiscoveryError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
            });
        }

        let body: VersionResponse =
            response
                .json()
                .await
                .map_err(|err| DiscoveryError::MalformedVersion {
                    raw: err.to_string(),
                })?;
        let version = message_version(&body.version)?;
        debug!(agent = %body.version, %version, "Agent version discovered");
        Ok(version)
    }
}

/// Maps an agent release string to the generation it supports.
pub fn message_version(raw: &str) -> Result<MessageVersion, DiscoveryError> {
    AgentVersion::parse(raw)
        .map(MessageVersion::for_agent)
        .ok_or_else(|| DiscoveryError::MalformedVersion {
            raw: raw.to_string(),
        })
}
