//! Trading Engine
//!
//! Preflight checks, gas estimation, fill transaction submission, background
//! confirmation polling and the order submission pipeline for 1inch limit orders.

pub mod config;
pub mod gas;
pub mod pipeline;
pub mod poller;
pub mod preflight;
pub mod submitter;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use gas::{calculate_fee, FeeEstimate, GasConfig, GasEstimator, GasQuote, GWEI};
pub use pipeline::{
    ExecutionLog, OrderPipeline, OrderRequest, PipelineError, PipelineResult, Stage,
    SubmissionReceipt,
};
pub use poller::{
    PollResult, PollerConfig, PollerHandle, PollerTracker, RecordClaim, RecordClaims,
    SkipReason, TransactionPoller,
};
pub use preflight::{CheckOutcome, PreflightChecker, PreflightReport};
pub use submitter::{
    ConfirmationConfig, ConfirmationOutcome, PreparedTransaction, TransactionSubmitter,
};
