//! Authorized-integration checks.
//!
//! The OAuth exchange itself belongs to an external [`AuthorizationManager`];
//! this module validates what the relay is handed before delegating, and
//! turns every gap into an [`AuthorizationError`] with a remediation hint.
//! Nothing here ever substitutes a default credential.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AuthorizationError, IntegrationSettings, Parameters};

/// Parameter carrying the temporary token of an OAuth 1.0a callback.
pub const OAUTH_TOKEN: &str = "oauth_token";

/// Parameter carrying the verification code of an OAuth 1.0a callback.
pub const OAUTH_VERIFIER: &str = "oauth_verifier";

/// Port to the component holding issue-tracker credentials.
#[async_trait]
pub trait AuthorizationManager: Send + Sync {
    /// Application registration the tracker needs to set up the OAuth link.
    async fn authorization_model(
        &self,
        settings: &IntegrationSettings,
    ) -> Result<AuthorizationModel, AuthorizationError>;

    /// URL the user must visit to authorize the integration.
    async fn authorization_url(
        &self,
        settings: &IntegrationSettings,
        url: &str,
        user_id: u64,
    ) -> Result<String, AuthorizationError>;

    /// Returns `true` if `user_id` already holds a valid token for `url`.
    async fn is_user_authorized(
        &self,
        settings: &IntegrationSettings,
        url: &str,
        user_id: u64,
    ) -> Result<bool, AuthorizationError>;

    /// Exchanges a temporary token for an access token.
    async fn authorize_temporary_token(
        &self,
        settings: &IntegrationSettings,
        grant: &TemporaryGrant,
    ) -> Result<(), AuthorizationError>;
}

/// How the integration is registered as an application link in the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationModel {
    /// Application name shown to tracker administrators.
    pub application_name: String,
    /// Public URL of the integration.
    pub application_url: String,
    /// Manager-specific registration properties (consumer key, public key).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Parameters of an authorization callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPayload {
    /// Callback parameters as received.
    pub parameters: Parameters,
}

/// A validated temporary token and verification code pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryGrant {
    /// Temporary token issued by the tracker.
    pub token: String,
    /// Verification code confirming the user's consent.
    pub verifier: String,
}

impl TemporaryGrant {
    /// Extracts the grant from callback parameters.
    ///
    /// Both values must be present and non-blank.
    pub fn from_payload(payload: &AuthorizationPayload) -> Result<Self, AuthorizationError> {
        let non_blank = |key: &str| {
            payload
                .parameters
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        match (non_blank(OAUTH_TOKEN), non_blank(OAUTH_VERIFIER)) {
            (Some(token), Some(verifier)) => Ok(Self { token, verifier }),
            _ => Err(insufficient_parameters()),
        }
    }
}

pub(crate) fn insufficient_parameters() -> AuthorizationError {
    AuthorizationError::InsufficientParameters {
        message: format!(
            "Authorization callback is missing '{OAUTH_TOKEN}' or '{OAUTH_VERIFIER}'"
        ),
        solution: "Restart the authorization flow from the issue tracker and make sure the \
                   callback URL is not modified"
            .to_string(),
    }
}

pub(crate) fn no_integration_settings() -> AuthorizationError {
    AuthorizationError::NoIntegrationSettings {
        message: "No integration settings are active for the issue tracker".to_string(),
        solution: "Configure the integration and wait for its settings to be delivered before \
                   authorizing users"
            .to_string(),
    }
}

pub(crate) fn not_configured() -> AuthorizationError {
    AuthorizationError::Rejected {
        message: "User authorization is not configured for this integration".to_string(),
        solution: "Register an authorization manager for the issue tracker".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, &str)]) -> AuthorizationPayload {
        AuthorizationPayload {
            parameters: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn grant_requires_both_values() {
        let grant = TemporaryGrant::from_payload(&payload(&[
            (OAUTH_TOKEN, "tmp"),
            (OAUTH_VERIFIER, "code"),
        ]))
        .unwrap();
        assert_eq!(grant.token, "tmp");
        assert_eq!(grant.verifier, "code");

        for pairs in [
            vec![(OAUTH_TOKEN, "tmp")],
            vec![(OAUTH_VERIFIER, "code")],
            vec![(OAUTH_TOKEN, "  "), (OAUTH_VERIFIER, "code")],
            vec![],
        ] {
            let err = TemporaryGrant::from_payload(&payload(&pairs)).unwrap_err();
            assert!(matches!(err, AuthorizationError::InsufficientParameters { .. }));
            assert!(!err.solution().is_empty());
        }
    }
}
