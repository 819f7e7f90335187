//! Issue-tracker webhook integration façade.
//!
//! [`WebhookIntegration`] is what the transport and the settings service
//! talk to. It owns the dispatcher (and through it the resolver), the
//! current integration settings, and the optional authorization manager.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::info;

use crate::authorization::{
    self, AuthorizationManager, AuthorizationModel, AuthorizationPayload, TemporaryGrant,
};
use crate::dispatcher::Dispatcher;
use crate::resolver::{VersionResolver, VersionTransition};
use crate::{
    AuthorizationError, DispatchError, IntegrationSettings, MessageVersion, RenderedMessage,
    ResolutionError, WebhookPayload,
};

/// Webhook integration rendering issue-tracker events.
pub struct WebhookIntegration {
    dispatcher: Dispatcher,
    settings: ArcSwapOption<IntegrationSettings>,
    authorization: Option<Arc<dyn AuthorizationManager>>,
}

impl WebhookIntegration {
    /// Creates an integration without user authorization support.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            settings: ArcSwapOption::empty(),
            authorization: None,
        }
    }

    /// Enables user authorization through `manager`.
    pub fn with_authorization(mut self, manager: Arc<dyn AuthorizationManager>) -> Self {
        self.authorization = Some(manager);
        self
    }

    /// The resolver behind the dispatcher.
    pub fn resolver(&self) -> &Arc<VersionResolver> {
        self.dispatcher.resolver()
    }

    /// Active settings, if any have been delivered.
    pub fn settings(&self) -> Option<Arc<IntegrationSettings>> {
        self.settings.load_full()
    }

    /// Starts background monitoring.
    pub fn start(&self) {
        self.resolver().start();
    }

    /// Stops background monitoring.
    pub async fn shutdown(&self) {
        self.resolver().shutdown().await;
    }

    /// Installs new settings and propagates them to every parser.
    pub fn on_config_change(&self, settings: IntegrationSettings) {
        self.resolver().on_config_change(&settings);
        info!(user = %settings.user, "Integration settings updated");
        self.settings.store(Some(Arc::new(settings)));
    }

    /// Applies a version-change signal.
    pub async fn on_version_changed(
        &self,
        version: MessageVersion,
    ) -> Result<VersionTransition, ResolutionError> {
        self.resolver().on_version_changed(version).await
    }

    /// Renders an inbound payload with the active generation.
    pub async fn parse(&self, payload: &WebhookPayload) -> Result<RenderedMessage, DispatchError> {
        self.dispatcher.dispatch(payload).await
    }

    /// Application registration for the tracker's OAuth link.
    ///
    /// `None` when no settings are active or authorization is not configured.
    pub async fn authorization_model(
        &self,
    ) -> Result<Option<AuthorizationModel>, AuthorizationError> {
        let (Some(settings), Some(manager)) = (self.settings(), self.authorization.as_ref()) else {
            return Ok(None);
        };
        manager.authorization_model(&settings).await.map(Some)
    }

    /// URL the user must visit to authorize the integration.
    ///
    /// `None` when no settings are active or authorization is not configured.
    pub async fn authorization_url(
        &self,
        url: &str,
        user_id: u64,
    ) -> Result<Option<String>, AuthorizationError> {
        let (Some(settings), Some(manager)) = (self.settings(), self.authorization.as_ref()) else {
            return Ok(None);
        };
        manager
            .authorization_url(&settings, url, user_id)
            .await
            .map(Some)
    }

    /// Returns `true` if the user already authorized the integration.
    ///
    /// Without active settings or an authorization manager, no user is.
    pub async fn is_user_authorized(
        &self,
        url: &str,
        user_id: u64,
    ) -> Result<bool, AuthorizationError> {
        let (Some(settings), Some(manager)) = (self.settings(), self.authorization.as_ref()) else {
            return Ok(false);
        };
        manager.is_user_authorized(&settings, url, user_id).await
    }

    /// Completes an authorization callback.
    pub async fn authorize(
        &self,
        payload: &AuthorizationPayload,
    ) -> Result<(), AuthorizationError> {
        let grant = TemporaryGrant::from_payload(payload)?;
        let settings = self
            .settings()
            .ok_or_else(authorization::no_integration_settings)?;
        let manager = self
            .authorization
            .as_ref()
            .ok_or_else(authorization::not_configured)?;
        manager.authorize_temporary_token(&settings, &grant).await
    }
}
