//! Engine tuning.

use limit_order_core::config::RpcConfig;
use std::time::Duration;

use crate::gas::GasConfig;
use crate::poller::PollerConfig;
use crate::submitter::ConfirmationConfig;

/// Settings for every engine component, with production defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub gas: GasConfig,
    pub confirmation: ConfirmationConfig,
    pub poller: PollerConfig,
    /// Timeout for preflight queries, nonce lookup and broadcast.
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gas: GasConfig::default(),
            confirmation: ConfirmationConfig::default(),
            poller: PollerConfig::default(),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Apply one per-call timeout to every component.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self.gas.call_timeout = timeout;
        self.confirmation.call_timeout = timeout;
        self.poller.call_timeout = timeout;
        self
    }

    pub fn from_rpc(rpc: &RpcConfig) -> Self {
        Self::default().with_call_timeout(Duration::from_secs(rpc.timeout_secs))
    }
}
