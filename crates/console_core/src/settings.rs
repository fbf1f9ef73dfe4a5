use std::time::Duration;

use shared::domain::StrategyConfig;

use crate::{
    logbook::DEFAULT_LOG_CAPACITY,
    planner::{DEFAULT_FEE_RATE, DEFAULT_TARGET_VOLUME},
    telemetry::DEFAULT_POLL_INTERVAL,
    transport::DEFAULT_BACKEND_URL,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSettings {
    pub backend_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub log_capacity: usize,
    pub fee_rate: f64,
    /// While running, telemetry older than this is flagged as stale.
    pub stale_after: Duration,
    pub planner_target: f64,
    pub strategy: StrategyConfig,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(10),
            log_capacity: DEFAULT_LOG_CAPACITY,
            fee_rate: DEFAULT_FEE_RATE,
            stale_after: Duration::from_secs(10),
            planner_target: DEFAULT_TARGET_VOLUME,
            strategy: StrategyConfig::default(),
        }
    }
}
