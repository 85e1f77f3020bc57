use evm_balance_exporter::{
    serve_metrics, BalanceMonitor, BalanceMonitorConfig, Config, JsonRpcClient, PollTimings,
    PrometheusRecorder,
};
use eyre::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // YAML file when a path is passed, environment variables otherwise
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref());

    init_tracing(config.as_ref().map(|c| c.log_level.as_str()).unwrap_or("info"));
    info!(version = env!("CARGO_PKG_VERSION"), "Starting EVM balance exporter");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return Err(e);
        }
    };

    let monitor_config = match BalanceMonitorConfig::new(
        config.chains,
        config.addresses,
        PollTimings::new(config.interval_secs),
    ) {
        Ok(monitor_config) => monitor_config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return Err(e.into());
        }
    };
    let timings = monitor_config.timings();

    info!(
        chains = monitor_config.chains().len(),
        addresses = monitor_config.addresses().len(),
        prometheus_port = config.prometheus_port,
        interval_secs = config.interval_secs,
        "Configuration loaded"
    );

    let recorder = Arc::new(PrometheusRecorder::new()?);
    let client = JsonRpcClient::with_timeout(recorder.clone(), timings.request_timeout)?;
    let monitor = Arc::new(BalanceMonitor::new(client, monitor_config, recorder.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let port = config.prometheus_port;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let server_rx = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = serve_metrics(recorder, listener, server_rx).await {
            error!(error = %e, "Metrics server failed");
        }
    });
    info!("Metrics available at http://localhost:{}/metrics", port);

    let monitor_handle = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.run(shutdown_rx).await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    // An in-flight request is allowed to finish or time out
    let grace = timings.request_timeout + timings.request_delay;
    if tokio::time::timeout(grace, monitor_handle).await.is_err() {
        warn!("Monitoring task did not stop in time");
    }
    let _ = server_handle.await;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
