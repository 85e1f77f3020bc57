use chrono::Utc;
use eyre::{eyre, Result};
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{AddressConfig, ChainConfig};
use crate::error::ConfigError;
use crate::metrics::{BalanceLabels, MetricsRecorder};
use crate::rpc::{BalanceSource, DEFAULT_REQUEST_TIMEOUT};
use crate::units::{to_decimal, to_f64};

/// Delays driving the polling loop
#[derive(Debug, Clone, Copy)]
pub struct PollTimings {
    /// Sleep between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Pause after every request inside a cycle
    pub request_delay: Duration,
    /// Sleep after a cycle failed before polling again
    pub error_backoff: Duration,
    pub request_timeout: Duration,
}

impl PollTimings {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            ..Self::default()
        }
    }
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            request_delay: Duration::from_millis(100),
            error_backoff: Duration::from_secs(10),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Validated chains and watched addresses
#[derive(Debug, Clone)]
pub struct BalanceMonitorConfig {
    chains: Vec<ChainConfig>,
    by_name: HashMap<String, usize>,
    addresses: Vec<AddressConfig>,
    timings: PollTimings,
}

impl BalanceMonitorConfig {
    /// Every chain named by an address must be defined, and chain names must
    /// be unique. Repeated chain names inside one address collapse to the first.
    pub fn new(
        chains: Vec<ChainConfig>,
        addresses: Vec<AddressConfig>,
        timings: PollTimings,
    ) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::with_capacity(chains.len());
        for (index, chain) in chains.iter().enumerate() {
            if by_name.insert(chain.name.clone(), index).is_some() {
                return Err(ConfigError::DuplicateChain(chain.name.clone()));
            }
        }

        let mut validated = Vec::with_capacity(addresses.len());
        for mut address in addresses {
            let mut seen = Vec::with_capacity(address.chains.len());
            for chain in address.chains.drain(..) {
                if !by_name.contains_key(&chain) {
                    return Err(ConfigError::UnknownChain {
                        label: address.label.clone(),
                        chain,
                        known: chains.iter().map(|c| c.name.clone()).collect(),
                    });
                }
                if !seen.contains(&chain) {
                    seen.push(chain);
                }
            }
            address.chains = seen;
            validated.push(address);
        }

        Ok(Self {
            chains,
            by_name,
            addresses: validated,
            timings,
        })
    }

    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.by_name.get(name).map(|&index| &self.chains[index])
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    pub fn addresses(&self) -> &[AddressConfig] {
        &self.addresses
    }

    pub fn timings(&self) -> PollTimings {
        self.timings
    }

    /// Addresses grouped by chain, keyed by the chain's position in the
    /// configuration so iteration follows chain definition order, not the
    /// order in which addresses first reference a chain.
    pub fn fan_out(&self) -> Vec<(&ChainConfig, Vec<&AddressConfig>)> {
        let mut buckets: BTreeMap<usize, Vec<&AddressConfig>> = BTreeMap::new();
        for address in &self.addresses {
            for chain in &address.chains {
                if let Some(&index) = self.by_name.get(chain) {
                    buckets.entry(index).or_default().push(address);
                }
            }
        }

        buckets
            .into_iter()
            .map(|(index, addresses)| (&self.chains[index], addresses))
            .collect()
    }
}

/// Counts for one completed pass over the fan-out map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// How a single guarded cycle ended
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed(eyre::Report),
    Cancelled(CycleReport),
}

/// Balance monitoring
pub struct BalanceMonitor<S> {
    source: S,
    config: BalanceMonitorConfig,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<S: BalanceSource> BalanceMonitor<S> {
    pub fn new(source: S, config: BalanceMonitorConfig, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            source,
            config,
            metrics,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Query every (chain, address) pair once, sequentially.
    ///
    /// Failed requests leave the previous gauge values in place. The flag is
    /// true when `shutdown` was set between two requests and the pass stopped
    /// early.
    pub async fn check(&self, shutdown: &watch::Receiver<bool>) -> (CycleReport, bool) {
        info!("Starting balance update cycle");
        let mut report = CycleReport::default();

        for (chain, addresses) in self.config.fan_out() {
            info!(
                chain = %chain.name,
                addresses = addresses.len(),
                "Updating balances for chain"
            );

            for address in addresses {
                if *shutdown.borrow() {
                    return (report, true);
                }

                let labels = BalanceLabels {
                    chain: &chain.name,
                    address: &address.address,
                    label: &address.label,
                    token_symbol: &chain.native_token_symbol,
                };

                match self.source.get_balance(chain, &address.address).await {
                    Ok(raw) => {
                        let decimal = to_decimal(raw, chain.decimals);
                        self.metrics.set_balance_raw(labels, to_f64(raw));
                        self.metrics.set_balance_decimal(labels, decimal);
                        self.metrics.set_last_update(labels, now_secs());
                        report.succeeded += 1;

                        info!(
                            chain = %chain.name,
                            address = %address.address,
                            label = %address.label,
                            "Updated balance: {:.6} {}",
                            decimal,
                            chain.native_token_symbol
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            chain = %chain.name,
                            address = %address.address,
                            label = %address.label,
                            error = %e,
                            "Failed to get balance"
                        );
                    }
                }

                tokio::time::sleep(self.config.timings.request_delay).await;
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Balance update cycle completed"
        );
        (report, false)
    }

    /// Run one cycle, converting a panic into `CycleOutcome::Failed`.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleOutcome {
        match AssertUnwindSafe(self.check(shutdown)).catch_unwind().await {
            Ok((report, false)) => CycleOutcome::Completed(report),
            Ok((report, true)) => CycleOutcome::Cancelled(report),
            Err(panic) => CycleOutcome::Failed(eyre!("cycle panicked: {}", panic_message(&*panic))),
        }
    }

    /// Poll until `shutdown` becomes true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let timings = self.config.timings;
        info!(interval_secs = timings.interval.as_secs(), "Starting monitoring");

        loop {
            let pause = match self.run_cycle(&shutdown).await {
                CycleOutcome::Completed(_) => timings.interval,
                CycleOutcome::Cancelled(_) => break,
                CycleOutcome::Failed(e) => {
                    error!(error = %e, "Error in monitoring loop");
                    timings.error_backoff
                }
            };

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stopped(&mut shutdown) => break,
            }
        }

        info!("Monitoring stopped");
    }
}

/// Resolves once shutdown is requested or the sender is gone.
pub async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
