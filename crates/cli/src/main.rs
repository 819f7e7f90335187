//! Webhook relay entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Load configuration** from flags, the environment and `.env`.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or pretty
//!    layer, plus an OTLP exporter when a collector endpoint is configured.
//! 3. **Construct the core**: one parser factory per generation, the health
//!    monitor, the resolver, the dispatcher and the integration façade.
//! 4. **Watch the agent** when a version endpoint is configured, switching
//!    generations as the agent is upgraded or rolled back.
//! 5. **Render payloads** from files, or newline-delimited from stdin, and
//!    print each rendered message as one JSON line on stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dispatch::{
    Dispatcher, HealthMonitor, IntegrationSettings, NullParser, Parameters, ProbeSchedule,
    VersionResolver, VersionWatcher, WebhookIntegration, WebhookPayload,
};
use probe::HttpVersionProbe;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod telemetry;

use config::CliConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CliConfig::load();
    let telemetry = telemetry::init(config.log_format, config.otlp_endpoint.as_deref())?;

    let result = run(config).await;
    if let Err(err) = &result {
        error!(error = %err, "Relay failed");
    }

    telemetry.shutdown();
    result
}

async fn run(config: CliConfig) -> Result<()> {
    let (monitor, signals) = HealthMonitor::new(ProbeSchedule::default());
    let resolver = Arc::new(
        VersionResolver::new(parsers::all_factories(), monitor)
            .context("parser factories are misconfigured")?,
    );
    let dispatcher = Dispatcher::new(resolver.clone(), Arc::new(NullParser))
        .with_event_keys(config.event_keys())
        .with_parse_timeout(config.parse_timeout());
    let integration = WebhookIntegration::new(dispatcher);
    integration.on_config_change(IntegrationSettings::new(&config.integration_user));

    let cancel = CancellationToken::new();
    let watcher = match &config.agent_version_url {
        Some(url) => {
            let probe = HttpVersionProbe::new(url.clone(), probe::DEFAULT_REQUEST_TIMEOUT)?;
            let watcher = VersionWatcher::new(resolver.clone(), Arc::new(probe));
            if let Err(err) = watcher.check().await {
                warn!(error = %err, url = %url, "Initial agent version check failed");
            }
            integration.start();
            Some(watcher.spawn(signals, cancel.clone()))
        }
        None => {
            info!(
                version = %resolver.active_version(),
                "No agent version endpoint configured; generation is fixed"
            );
            None
        }
    };

    let parameters = config.parameters();
    let outcome = if config.payloads.is_empty() {
        render_stdin(&integration, &parameters).await
    } else {
        render_files(&integration, &parameters, &config.payloads).await
    };

    integration.shutdown().await;
    cancel.cancel();
    if let Some(watcher) = watcher {
        watcher.await.context("version watcher task failed")?;
    }

    let failures = outcome?;
    if failures > 0 {
        bail!("{failures} payload(s) could not be rendered");
    }
    Ok(())
}

/// Renders one payload and prints it. Returns `false` on a dispatch failure.
async fn render(
    integration: &WebhookIntegration,
    payload: WebhookPayload,
    source: &str,
) -> Result<bool> {
    match integration.parse(&payload).await {
        Ok(message) => {
            println!("{}", serde_json::to_string(&message)?);
            Ok(true)
        }
        Err(err) => {
            error!(source, error = %err, "Payload could not be rendered");
            Ok(false)
        }
    }
}

async fn render_files(
    integration: &WebhookIntegration,
    parameters: &Parameters,
    paths: &[impl AsRef<Path>],
) -> Result<usize> {
    let mut failures = 0;
    for path in paths {
        let path = path.as_ref();
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read payload {}", path.display()))?;
        let payload = WebhookPayload::new(body, parameters.clone());
        if !render(integration, payload, &path.display().to_string()).await? {
            failures += 1;
        }
    }
    Ok(failures)
}

async fn render_stdin(integration: &WebhookIntegration, parameters: &Parameters) -> Result<usize> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failures = 0;
    let mut line_no = 0usize;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping");
                break;
            }
        };
        let Some(line) = line else { break };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let payload = WebhookPayload::new(line, parameters.clone());
        if !render(integration, payload, &format!("stdin:{line_no}")).await? {
            failures += 1;
        }
    }
    Ok(failures)
}
