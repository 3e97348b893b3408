//! Process entry point: load config, wire the pipeline, run cycles on an
//! interval until a stop signal arrives.

use std::sync::Arc;

use mqobs::collector::{Collector, CollectorConfig, GraphQlUpstreamClient};
use mqobs::config::PipelineConfig;
use mqobs::cycle_stats::{CycleEventBus, CycleStats};
use mqobs::health::{HealthMonitor, HealthMonitorConfig};
use mqobs::orchestrator::Orchestrator;
use mqobs::streamer::{HttpIngestClient, Streamer, StreamerConfig};
use mqobs::synthesizer::Synthesizer;
use mqobs::transformer::Transformer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        account_id = %config.account_id,
        region = ?config.region,
        provider = %config.provider,
        interval_ms = config.monitoring_interval.as_millis() as u64,
        "starting pipeline"
    );

    let upstream = GraphQlUpstreamClient::new(config.region.query_endpoint(), config.api_key.as_str());
    let collector = Collector::new(
        upstream,
        CollectorConfig { lookback: config.lookback, ..CollectorConfig::default() },
    );

    let transformer = match Transformer::new(config.provider.clone()) {
        Ok(transformer) => transformer,
        Err(err) => {
            tracing::error!(%err, "field-mapping table failed validation at startup");
            std::process::exit(1);
        }
    };

    let synthesizer =
        Synthesizer::new(config.account_id.clone(), None, None, config.alert_thresholds);

    let ingest_endpoint = config.region.ingest_endpoint(&config.account_id);
    let ingest = HttpIngestClient::new(ingest_endpoint, config.api_key.as_str());
    let streamer = Streamer::new(ingest, StreamerConfig::default());

    let health = Arc::new(HealthMonitor::new(HealthMonitorConfig {
        check_interval: config.health_check_interval,
        ..HealthMonitorConfig::default()
    }));
    health.register("collector", "stage", true, None, None).await;
    health.register("transformer", "stage", false, None, None).await;
    health.register("synthesizer", "stage", false, None, None).await;
    health.register("streamer", "stage", true, None, None).await;
    let health_loop = health.spawn_loop();

    let stats = Arc::new(CycleStats::new());
    let events = CycleEventBus::default();
    let mut progress = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            tracing::debug!(?event, "cycle progress");
        }
    });

    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        collector,
        transformer,
        synthesizer,
        streamer,
        health,
        stats,
        events,
    ));

    let shutdown = async {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        #[cfg(unix)]
        let terminate = async {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
            term.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        tracing::info!("shutdown signal received, draining in-flight cycle");
    };

    // `run` awaits any in-flight cycle before returning, which is the grace
    // period for a final best-effort batch.
    orchestrator.run(config.monitoring_interval, shutdown).await;
    health_loop.abort();

    tracing::info!("stopped");
}
