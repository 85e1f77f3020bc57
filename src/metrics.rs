//! Prometheus metrics for balance monitoring.
//!
//! Gauges and counters live in a private registry which `serve_metrics`
//! renders on `/metrics`. Recording never fails from the caller's point of
//! view: label errors are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use eyre::Result;
use prometheus::core::Collector;
use prometheus::proto::Metric;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::monitoring::stopped;

/// Label values identifying one watched address on one chain.
#[derive(Debug, Clone, Copy)]
pub struct BalanceLabels<'a> {
    pub chain: &'a str,
    pub address: &'a str,
    pub label: &'a str,
    pub token_symbol: &'a str,
}

/// Outcome of a single balance request, the `status` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failed,
}

impl RequestStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Failed => "failed",
        }
    }
}

/// Sink for everything the poller and RPC client observe.
pub trait MetricsRecorder: Send + Sync {
    fn set_balance_raw(&self, labels: BalanceLabels<'_>, value: f64);
    fn set_balance_decimal(&self, labels: BalanceLabels<'_>, value: f64);
    /// Timestamp of the last successful update, seconds since the epoch.
    fn set_last_update(&self, labels: BalanceLabels<'_>, timestamp: f64);
    fn inc_requests(&self, chain: &str, status: RequestStatus);
    fn inc_errors(&self, chain: &str, kind: ErrorKind);
}

/// `MetricsRecorder` backed by the prometheus crate.
pub struct PrometheusRecorder {
    registry: Registry,
    balance_wei: GaugeVec,
    balance_decimal: GaugeVec,
    requests: IntCounterVec,
    errors: IntCounterVec,
    last_update: GaugeVec,
}

impl PrometheusRecorder {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let balance_wei = GaugeVec::new(
            Opts::new("evm_balance_wei", "Native token balance in wei"),
            &BALANCE_LABELS,
        )?;

        let balance_decimal = GaugeVec::new(
            Opts::new("evm_balance_decimal", "Native token balance in decimal form"),
            &BALANCE_LABELS,
        )?;

        let requests = IntCounterVec::new(
            Opts::new(
                "evm_balance_requests_total",
                "Total number of balance requests",
            ),
            &REQUEST_LABELS,
        )?;

        let errors = IntCounterVec::new(
            Opts::new(
                "evm_balance_errors_total",
                "Total number of balance request errors",
            ),
            &ERROR_LABELS,
        )?;

        let last_update = GaugeVec::new(
            Opts::new(
                "evm_balance_last_update_timestamp",
                "Timestamp of last successful balance update",
            ),
            &UPDATE_LABELS,
        )?;

        registry.register(Box::new(balance_wei.clone()))?;
        registry.register(Box::new(balance_decimal.clone()))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(last_update.clone()))?;

        Ok(Self {
            registry,
            balance_wei,
            balance_decimal,
            requests,
            errors,
            last_update,
        })
    }

    /// Encode every registered metric in the text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn balance_raw(&self, labels: BalanceLabels<'_>) -> Option<f64> {
        gauge_value(&self.balance_wei, &BALANCE_LABELS, &balance_values(&labels))
    }

    pub fn balance_decimal(&self, labels: BalanceLabels<'_>) -> Option<f64> {
        gauge_value(&self.balance_decimal, &BALANCE_LABELS, &balance_values(&labels))
    }

    pub fn last_update(&self, labels: BalanceLabels<'_>) -> Option<f64> {
        gauge_value(
            &self.last_update,
            &UPDATE_LABELS,
            &[labels.chain, labels.address, labels.label],
        )
    }

    pub fn requests(&self, chain: &str, status: RequestStatus) -> u64 {
        counter_value(&self.requests, &REQUEST_LABELS, &[chain, status.as_label()])
    }

    pub fn errors(&self, chain: &str, kind: ErrorKind) -> u64 {
        counter_value(&self.errors, &ERROR_LABELS, &[chain, kind.as_label()])
    }
}

const BALANCE_LABELS: [&str; 4] = ["chain", "address", "label", "token_symbol"];
const UPDATE_LABELS: [&str; 3] = ["chain", "address", "label"];
const REQUEST_LABELS: [&str; 2] = ["chain", "status"];
const ERROR_LABELS: [&str; 2] = ["chain", "error_type"];

fn balance_values<'a>(labels: &BalanceLabels<'a>) -> [&'a str; 4] {
    [labels.chain, labels.address, labels.label, labels.token_symbol]
}

/// Sample with exactly these label values, `None` if it was never touched.
fn find_sample<C: Collector>(vec: &C, names: &[&str], values: &[&str]) -> Option<Metric> {
    let expected: HashMap<&str, &str> = names.iter().copied().zip(values.iter().copied()).collect();
    vec.collect()
        .into_iter()
        .flat_map(|family| family.get_metric().to_vec())
        .find(|metric| {
            metric
                .get_label()
                .iter()
                .all(|pair| expected.get(pair.get_name()) == Some(&pair.get_value()))
        })
}

fn gauge_value(vec: &GaugeVec, names: &[&str], values: &[&str]) -> Option<f64> {
    find_sample(vec, names, values).map(|metric| metric.get_gauge().get_value())
}

fn counter_value(vec: &IntCounterVec, names: &[&str], values: &[&str]) -> u64 {
    find_sample(vec, names, values)
        .map(|metric| metric.get_counter().get_value() as u64)
        .unwrap_or(0)
}

impl MetricsRecorder for PrometheusRecorder {
    fn set_balance_raw(&self, labels: BalanceLabels<'_>, value: f64) {
        match self.balance_wei.get_metric_with_label_values(&balance_values(&labels)) {
            Ok(gauge) => gauge.set(value),
            Err(e) => warn!(chain = labels.chain, error = %e, "Failed to record evm_balance_wei"),
        }
    }

    fn set_balance_decimal(&self, labels: BalanceLabels<'_>, value: f64) {
        match self
            .balance_decimal
            .get_metric_with_label_values(&balance_values(&labels))
        {
            Ok(gauge) => gauge.set(value),
            Err(e) => warn!(chain = labels.chain, error = %e, "Failed to record evm_balance_decimal"),
        }
    }

    fn set_last_update(&self, labels: BalanceLabels<'_>, timestamp: f64) {
        match self
            .last_update
            .get_metric_with_label_values(&[labels.chain, labels.address, labels.label])
        {
            Ok(gauge) => gauge.set(timestamp),
            Err(e) => warn!(
                chain = labels.chain,
                error = %e,
                "Failed to record evm_balance_last_update_timestamp"
            ),
        }
    }

    fn inc_requests(&self, chain: &str, status: RequestStatus) {
        match self
            .requests
            .get_metric_with_label_values(&[chain, status.as_label()])
        {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(chain, error = %e, "Failed to record evm_balance_requests_total"),
        }
    }

    fn inc_errors(&self, chain: &str, kind: ErrorKind) {
        match self.errors.get_metric_with_label_values(&[chain, kind.as_label()]) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(chain, error = %e, "Failed to record evm_balance_errors_total"),
        }
    }
}

/// Serve `GET /metrics` on `listener` until `shutdown` flips to true.
pub async fn serve_metrics(
    recorder: Arc<PrometheusRecorder>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let recorder = Arc::clone(&recorder);
            async move { recorder.render() }
        }),
    );

    info!(address = %listener.local_addr()?, "Prometheus metrics server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stopped(&mut shutdown).await;
        })
        .await?;

    Ok(())
}
