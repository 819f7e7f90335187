//! Bridges health-monitor ticks to version transitions.
//!
//! The watcher consumes [`ProbeSignal`]s, asks the [`VersionDiscovery`] port
//! which generation the environment currently supports, and feeds the answer
//! to [`VersionResolver::on_version_changed`]. Both failure kinds are logged
//! and leave the active generation in place; the next tick tries again.
//!
//! Signals emitted by a schedule that has since been stopped or restarted
//! are discarded without probing.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::monitor::ProbeSignal;
use crate::resolver::{VersionResolver, VersionTransition};
use crate::{DiscoveryError, MessageVersion, ResolutionError};

/// Port to the external collaborator that knows the environment's version.
#[async_trait]
pub trait VersionDiscovery: Send + Sync {
    /// Returns the generation the environment currently supports.
    async fn discover(&self) -> Result<MessageVersion, DiscoveryError>;
}

/// Failure of one version check.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The environment could not be queried.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// The discovered version has no matching factory.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Consumes probe signals and drives version transitions.
pub struct VersionWatcher {
    resolver: Arc<VersionResolver>,
    discovery: Arc<dyn VersionDiscovery>,
}

impl VersionWatcher {
    /// Creates a watcher for `resolver` backed by `discovery`.
    pub fn new(resolver: Arc<VersionResolver>, discovery: Arc<dyn VersionDiscovery>) -> Self {
        Self {
            resolver,
            discovery,
        }
    }

    /// Runs one version check.
    pub async fn check(&self) -> Result<VersionTransition, WatchError> {
        let version = self.discovery.discover().await?;
        let transition = self.resolver.on_version_changed(version).await?;
        Ok(transition)
    }

    /// Processes signals until `cancel` fires or the monitor side is dropped.
    pub async fn run(self, mut signals: mpsc::Receiver<ProbeSignal>, cancel: CancellationToken) {
        loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            if !self.resolver.monitor().is_current(&signal) {
                debug!(
                    tick = signal.tick,
                    epoch = signal.epoch,
                    "Discarding signal from a stopped schedule"
                );
                continue;
            }

            debug!(service = signal.service, tick = signal.tick, "Checking agent version");
            match self.check().await {
                Ok(transition) if transition.changed() => {
                    info!(
                        previous = %transition.previous,
                        current = %transition.current,
                        "Agent message version changed"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, tick = signal.tick, "Agent version check failed"),
            }
        }
        debug!("Version watcher stopped");
    }

    /// Spawns [`VersionWatcher::run`] onto the current runtime.
    pub fn spawn(
        self,
        signals: mpsc::Receiver<ProbeSignal>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(signals, cancel))
    }
}
