mod balance;

pub use balance::{
    stopped, BalanceMonitor, BalanceMonitorConfig, CycleOutcome, CycleReport, PollTimings,
};
