use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::config::ChainConfig;
use crate::error::RequestError;
use crate::metrics::{MetricsRecorder, RequestStatus};
use crate::units::hex_to_u256;

/// Timeout applied to every `eth_getBalance` call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything able to report the native balance of an address on a chain
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn get_balance(&self, chain: &ChainConfig, address: &str) -> Result<U256, RequestError>;
}

#[async_trait]
impl<T: BalanceSource + ?Sized> BalanceSource for Arc<T> {
    async fn get_balance(&self, chain: &ChainConfig, address: &str) -> Result<U256, RequestError> {
        (**self).get_balance(chain, address).await
    }
}

/// Plain JSON-RPC over HTTP, one request per call and no retries
pub struct JsonRpcClient {
    http: reqwest::Client,
    metrics: Arc<dyn MetricsRecorder>,
}

impl JsonRpcClient {
    pub fn new(metrics: Arc<dyn MetricsRecorder>) -> Result<Self, RequestError> {
        Self::with_timeout(metrics, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        metrics: Arc<dyn MetricsRecorder>,
        timeout: Duration,
    ) -> Result<Self, RequestError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("evm-balance-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, metrics })
    }

    async fn request(&self, chain: &ChainConfig, address: &str) -> Result<U256, RequestError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "eth_getBalance",
            "params": [address, "latest"],
            "id": 1,
        });

        let response = self
            .http
            .post(&chain.rpc_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        parse_balance_response(&serde_json::from_slice(&body)?)
    }
}

/// Interpret a decoded JSON-RPC response body.
///
/// An `error` member wins over `result`. A string `result` is decoded
/// fail-open: malformed hex becomes zero.
pub fn parse_balance_response(data: &Value) -> Result<U256, RequestError> {
    if let Some(err) = data.get("error").filter(|err| !err.is_null()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown RPC error");
        return Err(RequestError::Rpc(message.to_string()));
    }

    match data.get("result") {
        None => Err(RequestError::MissingResult),
        Some(Value::String(hex)) => Ok(hex_to_u256(hex)),
        Some(other) => Err(RequestError::Unexpected(format!(
            "result is not a hex string: {}",
            other
        ))),
    }
}

#[async_trait]
impl BalanceSource for JsonRpcClient {
    async fn get_balance(&self, chain: &ChainConfig, address: &str) -> Result<U256, RequestError> {
        match self.request(chain, address).await {
            Ok(balance) => {
                self.metrics.inc_requests(&chain.name, RequestStatus::Success);
                Ok(balance)
            }
            Err(e) => {
                error!(chain = %chain.name, address, error = %e, "Balance request failed");
                self.metrics.inc_errors(&chain.name, e.kind());
                self.metrics.inc_requests(&chain.name, RequestStatus::Failed);
                Err(e)
            }
        }
    }
}
