//! Background confirmation polling for pending transaction records.
//!
//! Record ids reach the worker through a channel. Each tick polls every
//! tracked record that is due, concurrently, and no lock is held across the
//! receipt query. A per-record claim keeps two tasks from updating the same
//! record at once. Stopping the worker lets the current tick finish, so an
//! update that has started always reaches the store.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use limit_order_core::api::ChainRpc;
use limit_order_core::db::{TransactionQuery, TransactionStore};
use limit_order_core::types::{TransactionStatus, MIN_POLL_SPACING_SECS, POLLING_WINDOW_SECS};
use limit_order_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between ticks.
    pub tick: Duration,
    /// Records older than this are no longer polled.
    pub window: ChronoDuration,
    /// Minimum time between two polls of the same record.
    pub min_spacing: ChronoDuration,
    /// Timeout for each receipt query.
    pub call_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            window: ChronoDuration::seconds(POLLING_WINDOW_SECS),
            min_spacing: ChronoDuration::seconds(MIN_POLL_SPACING_SECS),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Set of record ids currently being updated by some task.
#[derive(Debug, Clone, Default)]
pub struct RecordClaims {
    inner: Arc<DashMap<Uuid, ()>>,
}

impl RecordClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`, or `None` if another task holds it.
    pub fn try_claim(&self, id: Uuid) -> Option<RecordClaim> {
        match self.inner.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(RecordClaim {
                    claims: self.inner.clone(),
                    id,
                })
            }
        }
    }

    pub fn is_claimed(&self, id: Uuid) -> bool {
        self.inner.contains_key(&id)
    }
}

/// Releases its claim when dropped.
#[derive(Debug)]
pub struct RecordClaim {
    claims: Arc<DashMap<Uuid, ()>>,
    id: Uuid,
}

impl RecordClaim {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for RecordClaim {
    fn drop(&mut self) {
        self.claims.remove(&self.id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another task holds the record.
    InFlight,
    /// No hash has been attached yet.
    NoHash,
    /// Polled less than the minimum spacing ago.
    TooSoon,
}

/// What one poll of one record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    Skipped(SkipReason),
    /// Queried, no receipt yet.
    StillPending,
    /// Receipt applied; the record is now in this status.
    Updated(TransactionStatus),
    /// Record had already left pending.
    Finished(TransactionStatus),
    /// Polling window elapsed with the record still pending.
    Expired,
    /// No record with this id exists.
    Missing,
}

impl PollResult {
    /// Whether the record should stay on the tracked list.
    pub fn keep_tracking(&self) -> bool {
        matches!(
            self,
            PollResult::Skipped(_) | PollResult::StillPending
        )
    }
}

/// Polls receipts for pending records and persists the results.
pub struct TransactionPoller {
    rpc: Arc<dyn ChainRpc>,
    store: Arc<dyn TransactionStore>,
    config: PollerConfig,
    claims: RecordClaims,
}

impl TransactionPoller {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn TransactionStore>,
        config: PollerConfig,
        claims: RecordClaims,
    ) -> Self {
        Self {
            rpc,
            store,
            config,
            claims,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn claims(&self) -> &RecordClaims {
        &self.claims
    }

    /// Poll one record now.
    pub async fn poll_record(&self, id: Uuid) -> Result<PollResult> {
        self.poll_record_at(id, Utc::now()).await
    }

    /// Poll one record as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the store or RPC error that interrupted the poll. The record is
    /// left as it was and can be polled again.
    pub async fn poll_record_at(&self, id: Uuid, now: DateTime<Utc>) -> Result<PollResult> {
        let Some(_claim) = self.claims.try_claim(id) else {
            return Ok(PollResult::Skipped(SkipReason::InFlight));
        };

        let Some(mut record) = self.store.get(id).await? else {
            return Ok(PollResult::Missing);
        };

        if !record.is_pending() {
            return Ok(PollResult::Finished(record.status));
        }
        if !record.needs_polling_within(now, self.config.window) {
            debug!(record_id = %id, "Polling window elapsed; leaving record pending");
            return Ok(PollResult::Expired);
        }
        let Some(tx_hash) = record.tx_hash else {
            return Ok(PollResult::Skipped(SkipReason::NoHash));
        };
        if record.time_until_next_poll_with(now, self.config.min_spacing) > ChronoDuration::zero() {
            return Ok(PollResult::Skipped(SkipReason::TooSoon));
        }

        let receipt = tokio::time::timeout(self.config.call_timeout, self.rpc.transaction_receipt(tx_hash))
            .await
            .map_err(|_| Error::timeout("eth_getTransactionReceipt", self.config.call_timeout.as_secs()))??;

        record.record_poll(now);
        let result = match receipt {
            Some(receipt) => {
                record.apply_receipt(&receipt)?;
                info!(
                    record_id = %id,
                    tx_hash = %tx_hash,
                    status = %record.status,
                    block = ?record.block_number,
                    "Transaction record updated from receipt"
                );
                PollResult::Updated(record.status)
            }
            None => PollResult::StillPending,
        };
        self.store.update(&record).await?;
        Ok(result)
    }

    /// Poll every id in `ids` concurrently.
    ///
    /// Failures are returned per record and never abort the others.
    pub async fn poll_due(&self, ids: &[Uuid], now: DateTime<Utc>) -> Vec<(Uuid, Result<PollResult>)> {
        let polls = ids.iter().map(|&id| async move { (id, self.poll_record_at(id, now).await) });
        join_all(polls).await
    }

    /// Pending records that are still inside the polling window.
    pub async fn load_pending(&self) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let pending = self
            .store
            .query(&TransactionQuery::new().status(TransactionStatus::Pending))
            .await?;
        Ok(pending
            .into_iter()
            .filter(|r| r.needs_polling_within(now, self.config.window))
            .map(|r| r.id)
            .collect())
    }

    /// Poll every tracked record once and drop the ones that are done.
    ///
    /// `tracked` maps each record id to when it started being tracked. A
    /// failed poll keeps the record for the next tick; it is only dropped on
    /// error once it has been tracked for longer than the polling window.
    pub async fn run_tick(&self, tracked: &mut HashMap<Uuid, DateTime<Utc>>, now: DateTime<Utc>) {
        if tracked.is_empty() {
            return;
        }
        let ids: Vec<Uuid> = tracked.keys().copied().collect();
        for (id, result) in self.poll_due(&ids, now).await {
            match result {
                Ok(outcome) if outcome.keep_tracking() => {}
                Ok(outcome) => {
                    debug!(record_id = %id, ?outcome, "Record no longer tracked");
                    tracked.remove(&id);
                }
                Err(e) => {
                    let since = tracked.get(&id).copied().unwrap_or(now);
                    if now - since > self.config.window {
                        warn!(record_id = %id, error = %e, "Receipt poll failed past the polling window; dropping record");
                        tracked.remove(&id);
                    } else {
                        warn!(record_id = %id, error = %e, "Receipt poll failed; retrying next tick");
                    }
                }
            }
        }
    }

    /// Start the polling worker.
    ///
    /// Pending records already in the store are picked up at startup.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (track_tx, mut track_rx) = mpsc::unbounded_channel::<Uuid>();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let started = Utc::now();
            let mut tracked: HashMap<Uuid, DateTime<Utc>> = match self.load_pending().await {
                Ok(ids) => ids.into_iter().map(|id| (id, started)).collect(),
                Err(e) => {
                    warn!(error = %e, "Failed to load pending records");
                    HashMap::new()
                }
            };
            info!(tracked = tracked.len(), tick_ms = self.config.tick.as_millis() as u64, "Transaction poller started");

            let mut ticker = tokio::time::interval(self.config.tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    Some(id) = track_rx.recv() => {
                        tracked.entry(id).or_insert_with(Utc::now);
                    }
                    _ = ticker.tick() => {
                        self.run_tick(&mut tracked, Utc::now()).await;
                    }
                }
            }

            info!(tracked = tracked.len(), "Transaction poller stopped");
        });

        PollerHandle {
            track_tx,
            stop_tx,
            join,
        }
    }
}

/// Cloneable sender that hands record ids to a running poller.
#[derive(Debug, Clone)]
pub struct PollerTracker {
    track_tx: mpsc::UnboundedSender<Uuid>,
}

impl PollerTracker {
    /// False once the worker has exited.
    pub fn track(&self, id: Uuid) -> bool {
        self.track_tx.send(id).is_ok()
    }
}

/// Control handle for a running poller.
#[derive(Debug)]
pub struct PollerHandle {
    track_tx: mpsc::UnboundedSender<Uuid>,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Add a record to the tracked set. False once the worker has exited.
    pub fn track(&self, id: Uuid) -> bool {
        self.track_tx.send(id).is_ok()
    }

    pub fn tracker(&self) -> PollerTracker {
        PollerTracker {
            track_tx: self.track_tx.clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop ticking and wait for the current tick to complete.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Transaction poller task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use alloy_primitives::{Address, B256, U256};
    use limit_order_core::api::TransactionReceipt;
    use limit_order_core::config::NetworkConfig;
    use limit_order_core::db::MemoryTransactionStore;
    use limit_order_core::types::TransactionRecord;

    fn record(hash: Option<B256>, created_at: DateTime<Utc>) -> TransactionRecord {
        let network = NetworkConfig::polygon();
        let mut record = TransactionRecord::new(
            Address::repeat_byte(0x01),
            &network.token_a,
            &network.token_b,
            U256::from(10_000_000_000_000_000u64),
            U256::from(10_000u64),
        )
        .unwrap()
        .with_created_at(created_at);
        if let Some(hash) = hash {
            record.set_tx_hash(hash).unwrap();
        }
        record
    }

    fn receipt(hash: B256, success: bool) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(55_000_000),
            gas_used: Some(150_000),
            effective_gas_price: Some(40_000_000_000),
            success,
        }
    }

    fn poller(rpc: MockChain, store: Arc<MemoryTransactionStore>) -> TransactionPoller {
        let config = PollerConfig {
            tick: Duration::from_millis(10),
            ..PollerConfig::default()
        };
        TransactionPoller::new(Arc::new(rpc), store, config, RecordClaims::new())
    }

    #[tokio::test]
    async fn test_receipt_confirms_record() {
        let hash = B256::repeat_byte(0xaa);
        let store = Arc::new(MemoryTransactionStore::new());
        let rec = record(Some(hash), Utc::now());
        store.save(&rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt()
            .times(1)
            .returning(move |h| Ok(Some(receipt(h, true))));

        let result = poller(rpc, store.clone()).poll_record(rec.id).await.unwrap();
        assert_eq!(result, PollResult::Updated(TransactionStatus::Confirmed));

        let stored = store.get(rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Confirmed);
        assert_eq!(stored.block_number, Some(55_000_000));
        assert_eq!(stored.gas_used, Some(150_000));
        assert!(stored.last_polled_at.is_some());
    }

    #[tokio::test]
    async fn test_reverted_receipt_fails_record() {
        let hash = B256::repeat_byte(0xab);
        let store = Arc::new(MemoryTransactionStore::new());
        let rec = record(Some(hash), Utc::now());
        store.save(&rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt()
            .returning(move |h| Ok(Some(receipt(h, false))));

        let result = poller(rpc, store.clone()).poll_record(rec.id).await.unwrap();
        assert_eq!(result, PollResult::Updated(TransactionStatus::Failed));
        assert!(!result.keep_tracking());
    }

    #[tokio::test]
    async fn test_minimum_spacing_between_polls() {
        let store = Arc::new(MemoryTransactionStore::new());
        let now = Utc::now();
        let rec = record(Some(B256::repeat_byte(1)), now);
        store.save(&rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt().times(2).returning(|_| Ok(None));
        let poller = poller(rpc, store.clone());

        assert_eq!(poller.poll_record_at(rec.id, now).await.unwrap(), PollResult::StillPending);
        assert_eq!(
            poller
                .poll_record_at(rec.id, now + ChronoDuration::seconds(1))
                .await
                .unwrap(),
            PollResult::Skipped(SkipReason::TooSoon)
        );
        assert_eq!(
            poller
                .poll_record_at(rec.id, now + ChronoDuration::seconds(5))
                .await
                .unwrap(),
            PollResult::StillPending
        );
    }

    #[tokio::test]
    async fn test_expired_record_left_pending() {
        let store = Arc::new(MemoryTransactionStore::new());
        let rec = record(Some(B256::repeat_byte(2)), Utc::now() - ChronoDuration::seconds(121));
        store.save(&rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt().never();

        let result = poller(rpc, store.clone()).poll_record(rec.id).await.unwrap();
        assert_eq!(result, PollResult::Expired);
        assert_eq!(
            store.get(rec.id).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_skips_without_hash_or_when_claimed() {
        let store = Arc::new(MemoryTransactionStore::new());
        let unhashed = record(None, Utc::now());
        let hashed = record(Some(B256::repeat_byte(3)), Utc::now());
        store.save(&unhashed).await.unwrap();
        store.save(&hashed).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt().never();
        let poller = poller(rpc, store);

        assert_eq!(
            poller.poll_record(unhashed.id).await.unwrap(),
            PollResult::Skipped(SkipReason::NoHash)
        );

        let _claim = poller.claims().try_claim(hashed.id).unwrap();
        assert_eq!(
            poller.poll_record(hashed.id).await.unwrap(),
            PollResult::Skipped(SkipReason::InFlight)
        );
    }

    #[tokio::test]
    async fn test_terminal_record_is_finished() {
        let store = Arc::new(MemoryTransactionStore::new());
        let mut rec = record(Some(B256::repeat_byte(4)), Utc::now());
        rec.cancel().unwrap();
        store.save(&rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt().never();

        assert_eq!(
            poller(rpc, store).poll_record(rec.id).await.unwrap(),
            PollResult::Finished(TransactionStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let bad = B256::repeat_byte(0x0b);
        let good = B256::repeat_byte(0x0c);
        let store = Arc::new(MemoryTransactionStore::new());
        let bad_rec = record(Some(bad), Utc::now());
        let good_rec = record(Some(good), Utc::now());
        store.save(&bad_rec).await.unwrap();
        store.save(&good_rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt().returning(move |h| {
            if h == bad {
                Err(Error::network("connection reset"))
            } else {
                Ok(Some(receipt(h, true)))
            }
        });

        let results = poller(rpc, store.clone())
            .poll_due(&[bad_rec.id, good_rec.id], Utc::now())
            .await;
        assert_eq!(results.len(), 2);
        for (id, result) in results {
            if id == bad_rec.id {
                assert!(result.unwrap_err().is_network());
            } else {
                assert_eq!(result.unwrap(), PollResult::Updated(TransactionStatus::Confirmed));
            }
        }
        assert_eq!(
            store.get(bad_rec.id).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_rpc_error_retried_on_next_tick() {
        let hash = B256::repeat_byte(0x0d);
        let store = Arc::new(MemoryTransactionStore::new());
        let rec = record(Some(hash), Utc::now());
        store.save(&rec).await.unwrap();

        let mut seq = mockall::Sequence::new();
        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(Error::Rpc {
                    code: -32005,
                    message: "rate limited".to_string(),
                })
            });
        rpc.expect_transaction_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |h| Ok(Some(receipt(h, true))));
        let poller = poller(rpc, store.clone());

        let start = Utc::now();
        let mut tracked = HashMap::from([(rec.id, start)]);
        poller.run_tick(&mut tracked, start).await;
        assert!(tracked.contains_key(&rec.id));
        assert_eq!(
            store.get(rec.id).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );

        poller
            .run_tick(&mut tracked, start + ChronoDuration::seconds(5))
            .await;
        assert!(tracked.is_empty());
        assert_eq!(
            store.get(rec.id).await.unwrap().unwrap().status,
            TransactionStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_failing_record_dropped_after_window() {
        let store = Arc::new(MemoryTransactionStore::new());
        let rec = record(Some(B256::repeat_byte(0x0e)), Utc::now());
        store.save(&rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt()
            .returning(|_| Err(Error::network("connection refused")));
        let poller = poller(rpc, store);

        // Tracked long ago, but the record itself is still inside its window.
        let now = Utc::now();
        let mut tracked = HashMap::from([(rec.id, now - ChronoDuration::seconds(121))]);
        poller.run_tick(&mut tracked, now).await;
        assert!(tracked.is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_is_not_tracked() {
        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt().never();
        let poller = poller(rpc, Arc::new(MemoryTransactionStore::new()));

        let id = Uuid::new_v4();
        assert_eq!(poller.poll_record(id).await.unwrap(), PollResult::Missing);
        let mut tracked = HashMap::from([(id, Utc::now())]);
        poller.run_tick(&mut tracked, Utc::now()).await;
        assert!(tracked.is_empty());
    }

    #[tokio::test]
    async fn test_claims_release_on_drop() {
        let claims = RecordClaims::new();
        let id = Uuid::new_v4();
        {
            let claim = claims.try_claim(id).unwrap();
            assert_eq!(claim.id(), id);
            assert!(claims.try_claim(id).is_none());
        }
        assert!(!claims.is_claimed(id));
    }

    #[tokio::test]
    async fn test_worker_confirms_tracked_record_and_stops() {
        let hash = B256::repeat_byte(0xcc);
        let store = Arc::new(MemoryTransactionStore::new());
        // Saved without a hash so startup ignores nothing and the hash arrives later.
        let mut rec = record(None, Utc::now());
        store.save(&rec).await.unwrap();

        let mut rpc = MockChain::new();
        rpc.expect_transaction_receipt()
            .returning(move |h| Ok(Some(receipt(h, true))));

        let handle = Arc::new(poller(rpc, store.clone())).spawn();
        rec.set_tx_hash(hash).unwrap();
        store.update(&rec).await.unwrap();
        assert!(handle.track(rec.id));

        let mut confirmed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.get(rec.id).await.unwrap().unwrap().status == TransactionStatus::Confirmed {
                confirmed = true;
                break;
            }
        }
        assert!(confirmed);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_startup_picks_up_pending_records() {
        let store = Arc::new(MemoryTransactionStore::new());
        let fresh = record(Some(B256::repeat_byte(5)), Utc::now());
        let stale = record(Some(B256::repeat_byte(6)), Utc::now() - ChronoDuration::seconds(300));
        store.save(&fresh).await.unwrap();
        store.save(&stale).await.unwrap();

        let poller = poller(MockChain::new(), store);
        assert_eq!(poller.load_pending().await.unwrap(), vec![fresh.id]);
    }
}
