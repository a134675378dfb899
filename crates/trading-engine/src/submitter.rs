//! Fill transaction assembly, broadcast and confirmation wait.

use alloy_consensus::{SignableTransaction, TxEip1559};
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use limit_order_core::api::{encode_fill_order, ChainRpc, TransactionReceipt};
use limit_order_core::signing::SignedOrder;
use limit_order_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::gas::GasQuote;

/// EIP-2718 type byte of EIP-1559 transactions.
const EIP1559_TX_TYPE: u8 = 0x02;

/// Receipt polling after broadcast.
#[derive(Debug, Clone)]
pub struct ConfirmationConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Timeout for each receipt query.
    pub call_timeout: Duration,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// How the confirmation wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed(TransactionReceipt),
    Reverted(TransactionReceipt),
    /// No receipt within the attempt budget. The transaction may still land.
    TimedOut { attempts: u32 },
}

impl ConfirmationOutcome {
    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        match self {
            ConfirmationOutcome::Confirmed(r) | ConfirmationOutcome::Reverted(r) => Some(r),
            ConfirmationOutcome::TimedOut { .. } => None,
        }
    }
}

/// A signed, encoded fill transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub raw: Bytes,
    pub tx_hash: B256,
    pub nonce: u64,
    pub calldata: Bytes,
}

/// Builds, signs and broadcasts `fillOrder` transactions.
#[derive(Clone)]
pub struct TransactionSubmitter {
    rpc: Arc<dyn ChainRpc>,
    chain_id: u64,
    router: Address,
    confirmation: ConfirmationConfig,
    call_timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        chain_id: u64,
        router: Address,
        confirmation: ConfirmationConfig,
    ) -> Self {
        let call_timeout = confirmation.call_timeout;
        Self {
            rpc,
            chain_id,
            router,
            confirmation,
            call_timeout,
        }
    }

    /// Unsigned EIP-1559 transaction calling `fillOrder` for the order's full
    /// taking amount with zero taker traits.
    pub fn build_fill_transaction(
        &self,
        signed: &SignedOrder,
        nonce: u64,
        gas: &GasQuote,
    ) -> TxEip1559 {
        let input = encode_fill_order(signed, signed.order.taking_amount, U256::ZERO);
        TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit: gas.gas_limit,
            max_fee_per_gas: gas.max_fee_per_gas,
            max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
            to: TxKind::Call(self.router),
            value: U256::ZERO,
            access_list: Default::default(),
            input,
        }
    }

    /// Sign and encode a transaction as `0x02 ‖ rlp(signed fields)`.
    pub fn sign_transaction(
        mut tx: TxEip1559,
        signer: &PrivateKeySigner,
    ) -> Result<PreparedTransaction> {
        let signature = signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| Error::Signing(format!("failed to sign transaction: {}", e)))?;

        let nonce = tx.nonce;
        let calldata = tx.input.clone();
        let signed = tx.into_signed(signature);

        let mut raw = vec![EIP1559_TX_TYPE];
        signed.rlp_encode(&mut raw);
        let tx_hash = *signed.hash();

        Ok(PreparedTransaction {
            raw: Bytes::from(raw),
            tx_hash,
            nonce,
            calldata,
        })
    }

    /// Fetch the pending nonce, build and sign the fill transaction.
    ///
    /// # Arguments
    ///
    /// * `signed` - The signed order to fill
    /// * `gas` - Fee quote for the transaction
    /// * `signer` - Maker key; borrowed only for the duration of the call
    ///
    /// # Errors
    ///
    /// Returns a network error if the nonce lookup fails or times out, or a
    /// signing error if the transaction cannot be signed.
    pub async fn prepare(
        &self,
        signed: &SignedOrder,
        gas: &GasQuote,
        signer: &PrivateKeySigner,
    ) -> Result<PreparedTransaction> {
        let nonce = tokio::time::timeout(self.call_timeout, self.rpc.pending_nonce(signed.order.maker))
            .await
            .map_err(|_| Error::timeout("eth_getTransactionCount", self.call_timeout.as_secs()))??;

        let tx = self.build_fill_transaction(signed, nonce, gas);
        let prepared = Self::sign_transaction(tx, signer)?;
        debug!(nonce, tx_hash = %prepared.tx_hash, bytes = prepared.raw.len(), "Signed fill transaction");
        Ok(prepared)
    }

    /// Broadcast once. Never retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Submission`] for any failure, including a timeout.
    pub async fn broadcast(&self, prepared: &PreparedTransaction) -> Result<B256> {
        let sent = tokio::time::timeout(
            self.call_timeout,
            self.rpc.send_raw_transaction(prepared.raw.clone()),
        )
        .await;

        let hash = match sent {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => return Err(Error::Submission(e.to_string())),
            Err(_) => {
                return Err(Error::Submission(format!(
                    "eth_sendRawTransaction timed out after {}s",
                    self.call_timeout.as_secs()
                )))
            }
        };

        if hash != prepared.tx_hash {
            warn!(node = %hash, local = %prepared.tx_hash, "Node reported a different transaction hash");
        }
        info!(tx_hash = %hash, nonce = prepared.nonce, "Fill transaction broadcast");
        Ok(hash)
    }

    /// Poll for a receipt until it appears or the attempt budget runs out.
    ///
    /// Query failures count as an attempt without a receipt.
    pub async fn wait_for_confirmation(&self, tx_hash: B256) -> ConfirmationOutcome {
        for attempt in 1..=self.confirmation.max_attempts {
            tokio::time::sleep(self.confirmation.interval).await;

            let polled = tokio::time::timeout(
                self.confirmation.call_timeout,
                self.rpc.transaction_receipt(tx_hash),
            )
            .await;

            match polled {
                Ok(Ok(Some(receipt))) => {
                    info!(
                        tx_hash = %tx_hash,
                        success = receipt.success,
                        block = ?receipt.block_number,
                        gas_used = ?receipt.gas_used,
                        attempt,
                        "Receipt received"
                    );
                    return if receipt.success {
                        ConfirmationOutcome::Confirmed(receipt)
                    } else {
                        ConfirmationOutcome::Reverted(receipt)
                    };
                }
                Ok(Ok(None)) => debug!(tx_hash = %tx_hash, attempt, "Not yet mined"),
                Ok(Err(e)) => warn!(tx_hash = %tx_hash, attempt, error = %e, "Receipt query failed"),
                Err(_) => warn!(tx_hash = %tx_hash, attempt, "Receipt query timed out"),
            }
        }

        warn!(
            tx_hash = %tx_hash,
            attempts = self.confirmation.max_attempts,
            "No receipt yet; leaving transaction pending"
        );
        ConfirmationOutcome::TimedOut {
            attempts: self.confirmation.max_attempts,
        }
    }
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("chain_id", &self.chain_id)
            .field("router", &self.router)
            .field("confirmation", &self.confirmation)
            .finish()
    }
}
