pub mod config;
pub mod error;
pub mod metrics;
pub mod monitoring;
pub mod rpc;
pub mod units;

pub use config::{AddressConfig, ChainConfig, Config};
pub use error::{ConfigError, ErrorKind, RequestError};
pub use metrics::{serve_metrics, BalanceLabels, MetricsRecorder, PrometheusRecorder, RequestStatus};
pub use monitoring::{
    BalanceMonitor, BalanceMonitorConfig, CycleOutcome, CycleReport, PollTimings,
};
pub use rpc::{parse_balance_response, BalanceSource, JsonRpcClient};
pub use units::{hex_to_u256, to_decimal};
