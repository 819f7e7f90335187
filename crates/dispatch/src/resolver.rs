//! Version resolver: owner of the active parser generation.
//!
//! The active factory lives in a single [`ArcSwap`] slot. Dispatch calls take
//! one `Arc` snapshot of it and keep that snapshot for their whole execution;
//! a version transition replaces the slot's pointer in one store. Readers
//! never block the writer and never observe a registry under construction,
//! because registries are fully built before the resolver exists.
//!
//! Transitions are serialized by an async mutex so two concurrent version
//! signals cannot interleave their monitor adjustments.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, instrument, warn};

use crate::monitor::HealthMonitor;
use crate::registry::ParserFactory;
use crate::{IntegrationSettings, MessageVersion, ResolutionError};

/// Outcome of a successful version transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionTransition {
    /// Generation active before the signal.
    pub previous: MessageVersion,
    /// Generation active after the signal.
    pub current: MessageVersion,
}

impl VersionTransition {
    /// Returns `true` if the active generation changed.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

// ---------------------------------------------------------------------------

/// Holds the active factory and reacts to version-change signals.
#[derive(Debug)]
pub struct VersionResolver {
    factories: Vec<Arc<ParserFactory>>,
    active: ArcSwap<ParserFactory>,
    monitor: HealthMonitor,
    transitions: tokio::sync::Mutex<()>,
}

impl VersionResolver {
    /// Creates a resolver with [`MessageVersion::DEFAULT`] active.
    ///
    /// Fails if no factory, or more than one, accepts the default version.
    /// The monitor is not started; call [`VersionResolver::start`].
    pub fn new(
        factories: Vec<Arc<ParserFactory>>,
        monitor: HealthMonitor,
    ) -> Result<Self, ResolutionError> {
        let initial = select_factory(&factories, MessageVersion::DEFAULT)?;
        info!(
            version = %initial.generation(),
            factories = factories.len(),
            "Parser generation initialised"
        );
        Ok(Self {
            factories,
            active: ArcSwap::new(initial),
            monitor,
            transitions: tokio::sync::Mutex::new(()),
        })
    }

    /// Snapshot of the active factory.
    ///
    /// Hold it for at most one dispatch; a later call may return a different
    /// generation.
    pub fn active(&self) -> Arc<ParserFactory> {
        self.active.load_full()
    }

    /// Generation of the active factory.
    pub fn active_version(&self) -> MessageVersion {
        self.active.load().generation()
    }

    /// The fixed set of configured factories.
    pub fn factories(&self) -> &[Arc<ParserFactory>] {
        &self.factories
    }

    /// The health monitor whose cadence follows the active version.
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Starts the health monitor unless the active version is already terminal.
    pub fn start(&self) {
        if !self.active_version().is_terminal() {
            self.monitor.start();
        }
    }

    /// Stops the health monitor and waits for its task to exit.
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }

    /// Installs the factory accepting `version` and adjusts the monitor.
    ///
    /// Idempotent: repeating a signal re-selects the same factory. On a
    /// configuration mismatch the active factory and the monitor are left
    /// untouched and the error is returned to the caller only.
    #[instrument(skip_all, fields(version = %version))]
    pub async fn on_version_changed(
        &self,
        version: MessageVersion,
    ) -> Result<VersionTransition, ResolutionError> {
        let _serialized = self.transitions.lock().await;
        let previous = self.active_version();

        let factory = match select_factory(&self.factories, version) {
            Ok(factory) => factory,
            Err(err) => {
                warn!(
                    active = %previous,
                    error = %err,
                    "Message version mismatch, keeping active parser generation"
                );
                return Err(err);
            }
        };

        if Arc::ptr_eq(&self.active.load(), &factory) {
            debug!("Parser generation already active");
        } else {
            self.active.store(factory);
            info!(previous = %previous, current = %version, "Parser generation swapped");
        }

        if version.is_terminal() {
            self.monitor.stop().await;
        } else {
            self.monitor.start();
        }

        Ok(VersionTransition {
            previous,
            current: version,
        })
    }

    /// Forwards new settings to every factory.
    ///
    /// Inactive generations are updated too so a later swap installs a
    /// factory that is already current.
    pub fn on_config_change(&self, settings: &IntegrationSettings) {
        for factory in &self.factories {
            factory.on_config_change(settings);
        }
        debug!(user = %settings.user, "Integration settings propagated");
    }
}

/// Returns the unique factory accepting `version`.
pub fn select_factory(
    factories: &[Arc<ParserFactory>],
    version: MessageVersion,
) -> Result<Arc<ParserFactory>, ResolutionError> {
    if factories.is_empty() {
        return Err(ResolutionError::NoFactories);
    }
    let mut matching = factories.iter().filter(|f| f.accepts(version));
    match (matching.next(), matching.count()) {
        (None, _) => Err(ResolutionError::NoMatchingFactory { version }),
        (Some(factory), 0) => Ok(Arc::clone(factory)),
        (Some(_), others) => Err(ResolutionError::AmbiguousFactories {
            version,
            count: others + 1,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::monitor::ProbeSchedule;

    fn monitor() -> HealthMonitor {
        let schedule =
            ProbeSchedule::new(Duration::from_secs(5), Duration::from_secs(60)).unwrap();
        HealthMonitor::new(schedule).0
    }

    fn factory(version: MessageVersion) -> Arc<ParserFactory> {
        Arc::new(ParserFactory::new(version, Vec::new()))
    }

    fn both() -> Vec<Arc<ParserFactory>> {
        vec![factory(MessageVersion::V1), factory(MessageVersion::V2)]
    }

    #[test]
    fn starts_on_default_generation() {
        let resolver = VersionResolver::new(both(), monitor()).unwrap();
        assert_eq!(resolver.active_version(), MessageVersion::DEFAULT);
        assert!(!resolver.monitor().is_running());
    }

    #[test]
    fn construction_surfaces_configuration_errors() {
        assert_eq!(
            VersionResolver::new(Vec::new(), monitor()).unwrap_err(),
            ResolutionError::NoFactories
        );
        assert_eq!(
            VersionResolver::new(vec![factory(MessageVersion::V2)], monitor()).unwrap_err(),
            ResolutionError::NoMatchingFactory {
                version: MessageVersion::V1
            }
        );
        assert_eq!(
            VersionResolver::new(
                vec![factory(MessageVersion::V1), factory(MessageVersion::V1)],
                monitor()
            )
            .unwrap_err(),
            ResolutionError::AmbiguousFactories {
                version: MessageVersion::V1,
                count: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn every_registered_version_becomes_active() {
        let resolver = VersionResolver::new(both(), monitor()).unwrap();
        for version in MessageVersion::ALL {
            resolver.on_version_changed(version).await.unwrap();
            assert!(resolver.active().accepts(version));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_version_keeps_active_factory() {
        let resolver = VersionResolver::new(vec![factory(MessageVersion::V1)], monitor()).unwrap();
        resolver.start();
        let before = resolver.active();

        let err = resolver
            .on_version_changed(MessageVersion::V2)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ResolutionError::NoMatchingFactory {
                version: MessageVersion::V2
            }
        );
        assert!(Arc::ptr_eq(&before, &resolver.active()));
        assert!(resolver.monitor().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_signal_is_a_no_op() {
        let resolver = VersionResolver::new(both(), monitor()).unwrap();
        let first = resolver.on_version_changed(MessageVersion::V2).await.unwrap();
        let snapshot = resolver.active();
        let second = resolver.on_version_changed(MessageVersion::V2).await.unwrap();

        assert!(first.changed());
        assert!(!second.changed());
        assert!(Arc::ptr_eq(&snapshot, &resolver.active()));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_version_stops_monitor_and_regression_restarts_it() {
        let resolver = VersionResolver::new(both(), monitor()).unwrap();
        resolver.start();
        assert!(resolver.monitor().is_running());

        resolver.on_version_changed(MessageVersion::V2).await.unwrap();
        assert!(!resolver.monitor().is_running());

        resolver.on_version_changed(MessageVersion::V1).await.unwrap();
        assert!(resolver.monitor().is_running());

        resolver.shutdown().await;
        assert!(!resolver.monitor().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_skips_monitor_when_terminal() {
        let resolver = VersionResolver::new(both(), monitor()).unwrap();
        resolver.on_version_changed(MessageVersion::V2).await.unwrap();
        resolver.start();
        assert!(!resolver.monitor().is_running());
    }

    #[test]
    fn config_change_reaches_inactive_generations() {
        let resolver = VersionResolver::new(both(), monitor()).unwrap();
        resolver.on_config_change(&IntegrationSettings::new("jirauser"));
        for factory in resolver.factories() {
            assert_eq!(factory.settings().user, "jirauser");
        }
    }
}
