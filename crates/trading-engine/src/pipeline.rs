//! End-to-end order submission.
//!
//! `create_and_submit_order` runs order creation, signing, gas estimation,
//! preflight, transaction signing, broadcast and the confirmation wait as one
//! sequence and stops at the first failing stage. Only one submission runs
//! per pipeline at a time; a second concurrent call is rejected with
//! [`PipelineError::Busy`] rather than queued, so nonces are never raced.
//!
//! The wallet is loaded from its [`WalletSource`] at the start of each run and
//! dropped as soon as the fill transaction is signed.

use alloy_primitives::{Address, B256, U256};
use auth::{WalletError, WalletSource};
use chrono::Utc;
use limit_order_core::api::ChainRpc;
use limit_order_core::config::{NetworkConfig, TokenInfo};
use limit_order_core::db::TransactionStore;
use limit_order_core::signing::{OrderFactory, OrderSigner};
use limit_order_core::types::{format_native, truncate_hex, PriceSource, TransactionRecord};
use limit_order_core::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::gas::GasEstimator;
use crate::poller::{PollerTracker, RecordClaims, TransactionPoller};
use crate::preflight::PreflightChecker;
use crate::submitter::{ConfirmationOutcome, TransactionSubmitter};

/// Pipeline stage, reported with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Wallet,
    Order,
    Digest,
    Signing,
    Gas,
    Preflight,
    Submission,
    Record,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Wallet => "wallet",
            Stage::Order => "order",
            Stage::Digest => "digest",
            Stage::Signing => "signing",
            Stage::Gas => "gas",
            Stage::Preflight => "preflight",
            Stage::Submission => "submission",
            Stage::Record => "record",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, ThisError)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Error,
    },

    #[error("wallet stage failed: {0}")]
    Wallet(#[from] WalletError),

    #[error("an order submission is already in progress")]
    Busy,
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            PipelineError::Wallet(_) => Some(Stage::Wallet),
            PipelineError::Busy => None,
        }
    }

    /// Underlying engine error, if any.
    pub fn engine_error(&self) -> Option<&Error> {
        match self {
            PipelineError::Stage { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

trait AtStage<T> {
    fn at(self, stage: Stage) -> PipelineResult<T>;
}

impl<T> AtStage<T> for limit_order_core::Result<T> {
    fn at(self, stage: Stage) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Stage { stage, source })
    }
}

/// Append-only, per-run list of human-readable steps.
///
/// Each step is also emitted as an `info!` event and forwarded to the sink,
/// if one was supplied.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    entries: Vec<String>,
    sink: Option<mpsc::UnboundedSender<String>>,
}

impl ExecutionLog {
    pub fn new(sink: Option<mpsc::UnboundedSender<String>>) -> Self {
        Self {
            entries: Vec::new(),
            sink,
        }
    }

    pub fn step(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(step = self.entries.len() + 1, "{}", message);
        if let Some(sink) = &self.sink {
            // A closed receiver only means nobody is watching.
            let _ = sink.send(message.clone());
        }
        self.entries.push(message);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

/// Parameters of one order, in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub maker_asset: Address,
    pub taker_asset: Address,
    pub making_amount: U256,
    pub taking_amount: U256,
    pub expiry_seconds: u64,
}

/// Result of a submission that reached the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: B256,
    pub record_id: Uuid,
    pub order_hash: B256,
    pub confirmation: ConfirmationOutcome,
}

/// Order submission orchestrator.
pub struct OrderPipeline {
    network: NetworkConfig,
    rpc: Arc<dyn ChainRpc>,
    wallets: Arc<dyn WalletSource>,
    store: Arc<dyn TransactionStore>,
    prices: Option<Arc<dyn PriceSource>>,
    config: EngineConfig,
    gas: GasEstimator,
    preflight: PreflightChecker,
    submitter: TransactionSubmitter,
    signer: OrderSigner,
    factory: OrderFactory,
    claims: RecordClaims,
    tracker: Option<PollerTracker>,
    log_sink: Option<mpsc::UnboundedSender<String>>,
    running: Mutex<()>,
    last_log: RwLock<Vec<String>>,
}

impl OrderPipeline {
    pub fn new(
        network: NetworkConfig,
        rpc: Arc<dyn ChainRpc>,
        wallets: Arc<dyn WalletSource>,
        store: Arc<dyn TransactionStore>,
        config: EngineConfig,
    ) -> limit_order_core::Result<Self> {
        let signer = OrderSigner::new(network.eip712_domain())?;
        let gas = GasEstimator::new(rpc.clone(), config.gas.clone());
        let preflight = PreflightChecker::new(rpc.clone(), network.router, config.call_timeout);
        let submitter = TransactionSubmitter::new(
            rpc.clone(),
            network.chain_id,
            network.router,
            config.confirmation.clone(),
        );

        Ok(Self {
            network,
            rpc,
            wallets,
            store,
            prices: None,
            config,
            gas,
            preflight,
            submitter,
            signer,
            factory: OrderFactory::new(),
            claims: RecordClaims::new(),
            tracker: None,
            log_sink: None,
            running: Mutex::new(()),
            last_log: RwLock::new(Vec::new()),
        })
    }

    pub fn with_price_source(mut self, prices: Arc<dyn PriceSource>) -> Self {
        self.prices = Some(prices);
        self
    }

    /// Hand records whose confirmation wait timed out to a running poller.
    pub fn with_poller(mut self, tracker: PollerTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Forward every execution log step to `sink` as it happens.
    pub fn with_log_sink(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// A poller sharing this pipeline's chain, store and record claims.
    pub fn build_poller(&self) -> TransactionPoller {
        TransactionPoller::new(
            self.rpc.clone(),
            self.store.clone(),
            self.config.poller.clone(),
            self.claims.clone(),
        )
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Steps of the most recent run, successful or not.
    pub async fn execution_log(&self) -> Vec<String> {
        self.last_log.read().await.clone()
    }

    /// Create, sign and submit one order, then wait for its confirmation.
    ///
    /// A confirmation timeout is not an error: the record stays pending and
    /// is handed to the poller if one is attached.
    ///
    /// # Arguments
    ///
    /// * `request` - Assets and base-unit amounts of the order, and its
    ///   lifetime in seconds
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Busy`] if another submission is running, and
    /// otherwise the first stage that failed. Once the transaction has been
    /// broadcast the call always succeeds; record store failures after that
    /// point are logged.
    pub async fn create_and_submit_order(&self, request: OrderRequest) -> PipelineResult<SubmissionReceipt> {
        let _running = self.running.try_lock().map_err(|_| PipelineError::Busy)?;

        let mut log = ExecutionLog::new(self.log_sink.clone());
        let result = self.run(&request, &mut log).await;
        if let Err(e) = &result {
            log.step(format!("Halted: {}", e));
        }
        *self.last_log.write().await = log.into_entries();
        result
    }

    fn token(&self, address: Address) -> PipelineResult<&TokenInfo> {
        self.network
            .token_by_address(address)
            .ok_or_else(|| {
                Error::Input(format!(
                    "token {} is not configured for {}",
                    address, self.network.name
                ))
            })
            .at(Stage::Order)
    }

    async fn run(&self, request: &OrderRequest, log: &mut ExecutionLog) -> PipelineResult<SubmissionReceipt> {
        let wallet = self.wallets.load().await?;
        log.step(format!("Wallet loaded: {}", wallet.masked_address()));

        let maker_token = self.token(request.maker_asset)?;
        let taker_token = self.token(request.taker_asset)?;

        let draft = self
            .factory
            .create_order(
                wallet.address(),
                request.maker_asset,
                request.taker_asset,
                request.making_amount,
                request.taking_amount,
                request.expiry_seconds,
            )
            .at(Stage::Order)?;
        if !draft.is_valid() {
            return Err(Error::Input(draft.issues.join("; "))).at(Stage::Order);
        }
        let order = draft.order;
        let traits = order.traits().at(Stage::Order)?;
        log.step(format!(
            "Order created: {} {} for {} {}, salt {}, nonce {}, expiry {}",
            order.making_amount,
            maker_token.symbol,
            order.taking_amount,
            taker_token.symbol,
            order.salt,
            traits.nonce,
            traits.expiry
        ));

        let digest = self.signer.order_digest(&order).at(Stage::Digest)?;
        log.step(format!(
            "Digest computed: domain {}, struct {}, digest {}",
            truncate_hex(&digest.domain_separator.to_string()),
            truncate_hex(&digest.struct_hash.to_string()),
            truncate_hex(&digest.digest.to_string())
        ));

        let signed = self
            .signer
            .sign_order(&order, wallet.signer())
            .at(Stage::Signing)?;
        log.step(format!(
            "Order signed: r {}, vs {}",
            truncate_hex(&signed.signature.r.to_string()),
            truncate_hex(&signed.signature.vs.to_string())
        ));

        let quote = self.gas.quote().await.at(Stage::Gas)?;
        let max_fee = quote.max_fee().at(Stage::Gas)?;
        let required = self.gas.required_balance(&quote).at(Stage::Gas)?;
        log.step(format!(
            "Gas: base {} wei, tip {} wei, max fee {} wei/gas, limit {}, worst case {} {}",
            quote.base_fee,
            quote.max_priority_fee_per_gas,
            quote.max_fee_per_gas,
            quote.gas_limit,
            max_fee.native,
            self.network.native_symbol
        ));

        let report = self.preflight.run(&order, required).await;
        log.step(format!(
            "Preflight: balance {}, allowance {}",
            report.balance, report.allowance
        ));
        report.into_result().at(Stage::Preflight)?;

        let prepared = self
            .submitter
            .prepare(&signed, &quote, wallet.signer())
            .await
            .at(Stage::Submission)?;
        drop(wallet);
        log.step(format!(
            "Transaction signed: nonce {}, {} bytes, hash {}",
            prepared.nonce,
            prepared.raw.len(),
            prepared.tx_hash
        ));

        let mut record = TransactionRecord::new(
            order.maker,
            maker_token,
            taker_token,
            order.making_amount,
            order.taking_amount,
        )
        .at(Stage::Record)?
        .with_order_hash(signed.order_hash);
        if let Some(prices) = &self.prices {
            match prices.get_price(&maker_token.symbol).await {
                Ok(usd) => {
                    let making = record.making_amount;
                    record = record.with_usd_value(making * usd);
                }
                Err(e) => warn!(symbol = %maker_token.symbol, error = %e, "USD price unavailable"),
            }
        }
        self.store.save(&record).await.at(Stage::Record)?;
        let claim = self.claims.try_claim(record.id);
        log.step(format!("Pending record saved: {}", record.id));

        let tx_hash = match self.submitter.broadcast(&prepared).await {
            Ok(hash) => hash,
            Err(e) => {
                if record.mark_failed(e.to_string()).is_ok() {
                    if let Err(store_err) = self.store.update(&record).await {
                        warn!(record_id = %record.id, error = %store_err, "Failed to persist submission failure");
                    }
                }
                return Err(e).at(Stage::Submission);
            }
        };
        // The transaction is on-chain from here on, so store failures are
        // logged and the hash is still returned.
        log.step(format!("Broadcast: {}", tx_hash));
        match record.set_tx_hash(tx_hash) {
            Ok(()) => self.persist(&record, "tx hash").await,
            Err(e) => warn!(record_id = %record.id, error = %e, "Could not attach tx hash to record"),
        }

        let confirmation = self.submitter.wait_for_confirmation(tx_hash).await;
        match &confirmation {
            ConfirmationOutcome::Confirmed(receipt) | ConfirmationOutcome::Reverted(receipt) => {
                record.record_poll(Utc::now());
                match record.apply_receipt(receipt) {
                    Ok(()) => self.persist(&record, "receipt").await,
                    Err(e) => warn!(record_id = %record.id, error = %e, "Could not apply receipt to record"),
                }
                let fee = match record.fee_paid().map(format_native) {
                    Some(Ok(native)) => format!(", fee {} {}", native, self.network.native_symbol),
                    _ => String::new(),
                };
                log.step(format!(
                    "Transaction {}: block {}, gas used {}{}",
                    if receipt.success { "confirmed" } else { "failed" },
                    receipt.block_number.map_or("?".to_string(), |b| b.to_string()),
                    receipt.gas_used.map_or("?".to_string(), |g| g.to_string()),
                    fee
                ));
            }
            ConfirmationOutcome::TimedOut { attempts } => {
                log.step(format!(
                    "No receipt after {} attempts; record {} stays pending",
                    attempts, record.id
                ));
                drop(claim);
                if let Some(tracker) = &self.tracker {
                    if !tracker.track(record.id) {
                        warn!(record_id = %record.id, "Poller is not running; record will not be tracked");
                    }
                }
            }
        }

        Ok(SubmissionReceipt {
            tx_hash,
            record_id: record.id,
            order_hash: signed.order_hash,
            confirmation,
        })
    }
}

impl OrderPipeline {
    async fn persist(&self, record: &TransactionRecord, what: &str) {
        if let Err(e) = self.store.update(record).await {
            warn!(record_id = %record.id, error = %e, "Failed to persist {}", what);
        }
    }
}

impl fmt::Debug for OrderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderPipeline")
            .field("network", &self.network.name)
            .field("config", &self.config)
            .field("poller_attached", &self.tracker.is_some())
            .finish()
    }
}
