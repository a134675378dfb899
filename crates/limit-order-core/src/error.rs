//! Error types for limit order construction, signing and submission.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed address, amount or key supplied by the caller.
    #[error("Invalid input: {0}")]
    Input(String),

    /// EIP-712 schema/value mismatch.
    #[error("EIP-712 digest error: {0}")]
    Digest(String),

    #[error("Signing error: {0}")]
    Signing(String),

    /// Balance or allowance is insufficient, or could not be confirmed.
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    /// Transport failure or timeout talking to the RPC endpoint.
    #[error("Network error: {message}")]
    Network { message: String, timed_out: bool },

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Broadcast rejected by the node or not acknowledged in time.
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Transaction store error: {0}")]
    Store(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(operation: &str, secs: u64) -> Self {
        Error::Network {
            message: format!("{} timed out after {}s", operation, secs),
            timed_out: true,
        }
    }

    /// Whether this is a transport-level failure rather than a definitive answer.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Network { timed_out: true, .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network {
            timed_out: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
