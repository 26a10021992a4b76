//! In-memory order/batch catalog (spec §4.5). Orders and batches are held
//! as values keyed by id — no object graph, cross-references are id-only
//! (spec §9 "cyclic references"). Mirrors this corpus's `DashMap`-backed
//! `InMemoryStore`, generalized to the order/batch domain and to the
//! per-(market,side) `OpenBatchIndex` this protocol needs.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::debug;

use crate::types::{Batch, BatchId, BatchStatus, Order, OrderId, OrderStatus, Side, UnmatchedDeposit};

pub(crate) fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Catalog of orders and batches, plus the open-batch accept point and the
/// idempotent deposit-signature set. All maps are `DashMap`s; the only
/// explicit lock guards the open-index critical section during submit,
/// matching spec §5 ("the OpenBatchIndex is protected by its own lock; it
/// is only consulted during submit and released before heavy work").
pub struct BatchStore {
    orders: DashMap<OrderId, Order>,
    batches: DashMap<BatchId, Batch>,
    open_index: DashMap<(String, Side), BatchId>,
    open_index_lock: Mutex<()>,
    unmatched_deposits: DashMap<String, UnmatchedDeposit>,
    processed_signatures: DashMap<String, ()>,
}

impl Default for BatchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            batches: DashMap::new(),
            open_index: DashMap::new(),
            open_index_lock: Mutex::new(()),
            unmatched_deposits: DashMap::new(),
            processed_signatures: DashMap::new(),
        }
    }

    /// Appends `order` to the open batch for its (marketId, side), creating
    /// one if none is open or the open one is full. Transitions
    /// `collecting -> ready` and unregisters from the open index once the
    /// batch hits `max_batch_size` (spec I3).
    pub fn submit_order(&self, mut order: Order, max_batch_size: usize) -> BatchId {
        let key = (order.market_id.clone(), order.side);
        let amount = order.usdc_amount_micros;

        let batch_id = {
            let _guard = self.open_index_lock.lock().unwrap();
            let reusable = self.open_index.get(&key).and_then(|entry| {
                let id = *entry.value();
                let usable = self
                    .batches
                    .get(&id)
                    .map(|b| b.status == BatchStatus::Collecting && b.order_ids.len() < max_batch_size)
                    .unwrap_or(false);
                usable.then_some(id)
            });

            match reusable {
                Some(id) => id,
                None => {
                    let batch = Batch::new(order.market_id.clone(), order.side, now_epoch());
                    let id = batch.id;
                    self.batches.insert(id, batch);
                    self.open_index.insert(key.clone(), id);
                    id
                }
            }
        };

        order.batch_id = batch_id;
        let order_id = order.id;
        self.orders.insert(order_id, order);

        let mut became_full = false;
        if let Some(mut batch) = self.batches.get_mut(&batch_id) {
            batch.order_ids.push(order_id);
            batch.total_usdc_committed_micros += amount;
            became_full = batch.order_ids.len() >= max_batch_size;
        }

        if became_full {
            self.mark_ready(batch_id);
        }

        debug!(%batch_id, %order_id, "order submitted");
        batch_id
    }

    /// Transitions a batch from `from` to `to` only if its current status is
    /// exactly `from`. Returns whether the transition happened — the
    /// compare-and-swap `BatchLifecycle` relies on to avoid two concurrent
    /// `execute` calls both entering `executing`.
    pub fn try_transition_batch(&self, id: BatchId, from: BatchStatus, to: BatchStatus) -> bool {
        match self.batches.get_mut(&id) {
            Some(mut entry) if entry.status == from => {
                entry.status = to;
                true
            }
            _ => false,
        }
    }

    /// Transitions an order from `from` to `to`; a non-matching current
    /// status is silently ignored (spec §4.6 `activate`: "else ignore").
    pub fn try_transition_order(&self, id: OrderId, from: crate::types::OrderStatus, to: crate::types::OrderStatus) -> bool {
        match self.orders.get_mut(&id) {
            Some(mut entry) if entry.status == from => {
                entry.status = to;
                true
            }
            _ => false,
        }
    }

    /// `collecting -> ready`; idempotent, unregisters from the open index.
    pub fn mark_ready(&self, batch_id: BatchId) -> bool {
        let transitioned = match self.batches.get_mut(&batch_id) {
            Some(mut batch) if batch.status == BatchStatus::Collecting => {
                batch.status = BatchStatus::Ready;
                true
            }
            _ => false,
        };
        if transitioned {
            let _guard = self.open_index_lock.lock().unwrap();
            self.open_index.retain(|_, id| *id != batch_id);
        }
        transitioned
    }

    /// Inserts `order` into a dedicated single-order batch that is never
    /// registered in the open index — used for the deposit matcher's
    /// "impromptu" structured-memo path (spec §4.7 step 3), which executes
    /// immediately rather than waiting to fill alongside other orders.
    pub fn submit_standalone(&self, mut order: Order) -> BatchId {
        let mut batch = Batch::new(order.market_id.clone(), order.side, now_epoch());
        let batch_id = batch.id;
        order.batch_id = batch_id;
        let order_id = order.id;
        let amount = order.usdc_amount_micros;
        batch.order_ids.push(order_id);
        batch.total_usdc_committed_micros = amount;
        batch.funded_usdc_total_micros = amount;
        self.orders.insert(order_id, order);
        self.batches.insert(batch_id, batch);
        batch_id
    }

    pub fn get_order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|r| r.value().clone())
    }

    pub fn get_batch(&self, id: BatchId) -> Option<Batch> {
        self.batches.get(&id).map(|r| r.value().clone())
    }

    pub fn list_orders(&self, batch_id: BatchId) -> Vec<Order> {
        self.batches
            .get(&batch_id)
            .map(|b| {
                b.order_ids
                    .iter()
                    .filter_map(|id| self.get_order(*id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn open_batches(&self) -> Vec<Batch> {
        self.batches
            .iter()
            .filter(|r| r.status == BatchStatus::Collecting)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn ready_batches(&self) -> Vec<Batch> {
        self.batches
            .iter()
            .filter(|r| r.status == BatchStatus::Ready)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn all_batches(&self) -> Vec<Batch> {
        self.batches.iter().map(|r| r.value().clone()).collect()
    }

    /// Applies `f` to the order in place if present. Used by
    /// `BatchLifecycle`/`DepositMatcher` to drive state transitions without
    /// a read-then-write race.
    pub fn update_order<F: FnOnce(&mut Order)>(&self, id: OrderId, f: F) -> bool {
        match self.orders.get_mut(&id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn update_batch<F: FnOnce(&mut Batch)>(&self, id: BatchId, f: F) -> bool {
        match self.batches.get_mut(&id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    /// Transitions every `pending_deposit` order past its TTL to `expired`
    /// (spec §4.11 Scheduler tick, spec I8).
    pub fn expire_stale_pending_deposits(&self, now: u64) -> usize {
        let mut expired = 0;
        for mut entry in self.orders.iter_mut() {
            if entry.status == OrderStatus::PendingDeposit && now > entry.deposit_expires_at {
                entry.status = OrderStatus::Expired;
                expired += 1;
            }
        }
        expired
    }

    pub fn add_unmatched(&self, deposit: UnmatchedDeposit) {
        self.unmatched_deposits.insert(deposit.txid.clone(), deposit);
    }

    pub fn list_unmatched(&self, include_resolved: bool) -> Vec<UnmatchedDeposit> {
        self.unmatched_deposits
            .iter()
            .filter(|r| include_resolved || !r.resolved)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn resolve_unmatched(&self, txid: &str) -> bool {
        match self.unmatched_deposits.get_mut(txid) {
            Some(mut entry) => {
                entry.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Drops resolved unmatched deposits older than `retention_secs`.
    pub fn reap_unmatched(&self, retention_secs: u64) -> usize {
        let now = now_epoch();
        let before = self.unmatched_deposits.len();
        self.unmatched_deposits
            .retain(|_, d| !(d.resolved && now.saturating_sub(d.seen_at) > retention_secs));
        before - self.unmatched_deposits.len()
    }

    pub fn is_processed(&self, signature: &str) -> bool {
        self.processed_signatures.contains_key(signature)
    }

    pub fn mark_processed(&self, signature: &str) {
        self.processed_signatures.insert(signature.to_string(), ());
    }

    pub(crate) fn snapshot_orders(&self) -> Vec<Order> {
        self.orders.iter().map(|r| r.value().clone()).collect()
    }

    pub(crate) fn snapshot_batches(&self) -> Vec<Batch> {
        self.batches.iter().map(|r| r.value().clone()).collect()
    }

    pub(crate) fn snapshot_open_index(&self) -> Vec<(String, Side, BatchId)> {
        self.open_index
            .iter()
            .map(|r| (r.key().0.clone(), r.key().1, *r.value()))
            .collect()
    }

    pub(crate) fn snapshot_unmatched(&self) -> Vec<UnmatchedDeposit> {
        self.unmatched_deposits.iter().map(|r| r.value().clone()).collect()
    }

    pub(crate) fn snapshot_processed(&self) -> Vec<String> {
        self.processed_signatures.iter().map(|r| r.key().clone()).collect()
    }

    /// Rebuilds state from a persisted snapshot (spec §4.5 "restart recovery
    /// MUST re-establish OpenBatchIndex consistent with persisted batches").
    /// The open index is recomputed from batch status rather than trusted
    /// verbatim from the snapshot, so a crash between "batch filled" and
    /// "index updated" self-heals on restart.
    pub fn restore(
        &self,
        orders: Vec<Order>,
        batches: Vec<Batch>,
        unmatched: Vec<UnmatchedDeposit>,
        processed: Vec<String>,
    ) {
        for order in orders {
            self.orders.insert(order.id, order);
        }
        for batch in batches {
            if batch.status == BatchStatus::Collecting {
                self.open_index
                    .insert((batch.market_id.clone(), batch.side), batch.id);
            }
            self.batches.insert(batch.id, batch);
        }
        for deposit in unmatched {
            self.unmatched_deposits.insert(deposit.txid.clone(), deposit);
        }
        for sig in processed {
            self.processed_signatures.insert(sig, ());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldCodec;
    use crate::types::{DistributionEntry, OrderStatus, Salt};

    fn sample_order(market_id: &str, side: Side, amount: u128) -> Order {
        Order {
            id: OrderId::new(),
            batch_id: BatchId::new(),
            market_id: market_id.to_string(),
            side,
            usdc_amount_micros: amount,
            distribution: vec![DistributionEntry {
                address: "11111111111111111111111111111111".into(),
                bps: 10_000,
            }],
            salt: Salt::random(),
            commitment_hash: FieldCodec::amount_field(amount),
            status: OrderStatus::PendingDeposit,
            created_at: now_epoch(),
            deposit_expires_at: now_epoch() + 3600,
            deposit_tx: None,
            deposit_sender: None,
            deposit_confirmed_at: None,
            effective_usdc_spent_micros: None,
            shares_received: None,
            refund_amount_micros: None,
            distribution_results: Vec::new(),
            is_encrypted: false,
            encrypted_payload: None,
        }
    }

    #[test]
    fn submit_creates_batch_and_appends() {
        let store = BatchStore::new();
        let batch_id = store.submit_order(sample_order("MKT-A", Side::Yes, 1_000_000), 25);
        let batch = store.get_batch(batch_id).unwrap();
        assert_eq!(batch.order_ids.len(), 1);
        assert_eq!(batch.status, BatchStatus::Collecting);
    }

    #[test]
    fn submit_reuses_open_batch_for_same_key() {
        let store = BatchStore::new();
        let a = store.submit_order(sample_order("MKT-A", Side::Yes, 1_000_000), 25);
        let b = store.submit_order(sample_order("MKT-A", Side::Yes, 2_000_000), 25);
        assert_eq!(a, b);
        assert_eq!(store.get_batch(a).unwrap().order_ids.len(), 2);
    }

    #[test]
    fn submit_separates_by_side_and_market() {
        let store = BatchStore::new();
        let a = store.submit_order(sample_order("MKT-A", Side::Yes, 1_000_000), 25);
        let b = store.submit_order(sample_order("MKT-A", Side::No, 1_000_000), 25);
        let c = store.submit_order(sample_order("MKT-B", Side::Yes, 1_000_000), 25);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn batch_closes_and_unregisters_when_full() {
        let store = BatchStore::new();
        let a = store.submit_order(sample_order("MKT-A", Side::Yes, 1_000_000), 1);
        assert_eq!(store.get_batch(a).unwrap().status, BatchStatus::Ready);
        let b = store.submit_order(sample_order("MKT-A", Side::Yes, 1_000_000), 1);
        assert_ne!(a, b, "a full batch must not accept further orders");
    }

    #[test]
    fn no_two_open_batches_share_market_and_side() {
        let store = BatchStore::new();
        for _ in 0..5 {
            store.submit_order(sample_order("MKT-A", Side::Yes, 1_000_000), 25);
        }
        assert_eq!(store.open_batches().len(), 1);
    }

    #[test]
    fn processed_signatures_are_idempotent() {
        let store = BatchStore::new();
        assert!(!store.is_processed("sig1"));
        store.mark_processed("sig1");
        assert!(store.is_processed("sig1"));
    }
}
