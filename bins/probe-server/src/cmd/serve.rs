use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use probe_api_server::AppState;
use probe_engine::{Alerts, StagePorts, StageRegistry, StagingQueue, trigger};

use crate::config::{ProbeConfig, ServeArgs};
use crate::error::ServerError;

/// How long stopped tasks get to finish before they are aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("probe-server starting");

    // --- Load config ---
    let config = ProbeConfig::load(&args.config)?;
    tracing::info!(config = %args.config, stages = config.stages.len(), "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Create stages ---
    let alerts = Arc::new(Alerts::new(config.max_alerts));
    let registry = Arc::new(StageRegistry::new(alerts));
    let mut ports = HashMap::new();
    for stage_cfg in config.stages {
        let stage = registry.register(stage_cfg);
        ports.insert(
            stage.id().to_string(),
            StagePorts::for_stage(&stage, config.delivered_buffer),
        );
    }

    // --- Spawn trigger loops ---
    let interval = Duration::from_millis(config.trigger_interval_ms);
    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for stage in registry.stages() {
        let Some(stage_ports) = ports.get(stage.id()).cloned() else {
            continue;
        };
        handles.push(spawn_trigger_task(stage, stage_ports, interval, token.clone()));
    }

    // --- API server ---
    let state = AppState::new(registry.clone(), ports);
    let api_port = config.api_port;
    let api_token = token.clone();
    let mut api_handle =
        tokio::spawn(async move { probe_api_server::run(api_port, state, api_token).await });

    tracing::info!(port = api_port, "server ready");

    // --- Wait for Ctrl+C, or the API failing to start ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
        }
        api = &mut api_handle => {
            token.cancel();
            return match api {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Api(e)),
                Err(e) => Err(ServerError::Api(format!("api task: {e}"))),
            };
        }
    }

    // Signal all tasks to stop cooperatively
    token.cancel();

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    for h in &mut handles {
        if tokio::time::timeout_at(deadline, &mut *h).await.is_err() {
            h.abort();
        }
    }
    if tokio::time::timeout_at(deadline, &mut api_handle).await.is_err() {
        api_handle.abort();
    }

    for stage in registry.stages() {
        let summary = stage.summary();
        tracing::info!(
            stage = %summary.id,
            held = summary.held,
            routed = summary.routed,
            "stage stopped, discarding held records"
        );
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Run [`trigger`] for one stage until `token` is cancelled. Busy passes
/// run back to back; an idle or failed pass waits `interval`.
fn spawn_trigger_task(
    stage: Arc<StagingQueue>,
    ports: StagePorts,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let idle = match trigger(&stage, ports.upstream.as_ref(), ports.downstream.as_ref()) {
                Ok(outcome) => outcome.is_idle(),
                Err(e) => {
                    tracing::warn!(stage = %stage.id(), error = %e, "trigger failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = token.cancelled() => break,
                }
            } else if token.is_cancelled() {
                break;
            } else {
                tokio::task::yield_now().await;
            }
        }
        tracing::info!(stage = %stage.id(), "trigger loop stopped");
    })
}
