//! `BatchLifecycle`: the batch/order state machine and main orchestrator
//! (spec §4.6). Long-running collaborator calls (venue execution, proof
//! generation, chain sends) happen outside any store lock — the batch
//! record is only touched to read or transition status, matching this
//! corpus's rule of keeping suspension points off the hot lock path.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::chain::{send_with_retry, ChainSender};
use crate::commitment::CommitmentBuilder;
use crate::config::RelayConfig;
use crate::distribution::{DistributionPlanner, FundedOrderInput, VenueFill};
use crate::error::AppError;
use crate::merkle::MerkleBuilder;
use crate::proof::{ProofGenerator, ProofRequest};
use crate::store::BatchStore;
use crate::types::{
    BatchId, BatchStatus, DistributionEntry, DistributionResult, Order, OrderId, OrderStatus, Salt,
    Side,
};
use crate::venue::{ExecutionRequest, VenueExecutor, VenueFailureKind};

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone)]
pub struct SubmitOrderPayload {
    pub market_id: String,
    pub side: Side,
    pub usdc_amount_micros: u128,
    pub distribution: Vec<DistributionEntry>,
    pub salt: Option<Salt>,
    pub yes_token_mint: Option<String>,
    pub no_token_mint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitOrderResponse {
    pub order_id: OrderId,
    pub batch_id: BatchId,
    pub commitment_hash: crate::field::Fr,
    pub status: OrderStatus,
    pub deposit_address: String,
    pub deposit_expires_at: u64,
}

/// Validates a payload's invariants shared by both the plaintext and
/// encrypted submit paths (spec §4.6 `submit` step 1).
pub fn validate_distribution(distribution: &[DistributionEntry]) -> Result<(), AppError> {
    if distribution.is_empty() || distribution.len() > 10 {
        return Err(AppError::BadInput(
            "distribution must have between 1 and 10 destinations".into(),
        ));
    }
    let total: u32 = distribution.iter().map(|d| d.bps).sum();
    if total != 10_000 {
        return Err(AppError::BadInput(format!(
            "distribution bps must sum to 10000, got {total}"
        )));
    }
    if distribution.iter().any(|d| d.bps == 0) {
        return Err(AppError::BadInput("distribution bps must be strictly positive".into()));
    }
    for d in distribution {
        crate::field::FieldCodec::address_field(&d.address)?;
    }
    Ok(())
}

pub struct BatchLifecycle<V, P, C> {
    store: Arc<BatchStore>,
    config: RelayConfig,
    commitment: CommitmentBuilder,
    merkle: MerkleBuilder,
    venue: Arc<V>,
    prover: Arc<P>,
    chain: Arc<C>,
}

impl<V, P, C> BatchLifecycle<V, P, C>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainSender + crate::chain::ChainWatcher,
{
    pub fn new(store: Arc<BatchStore>, config: RelayConfig, venue: Arc<V>, prover: Arc<P>, chain: Arc<C>) -> Self {
        Self {
            store,
            config,
            commitment: CommitmentBuilder::new(),
            merkle: MerkleBuilder::new(),
            venue,
            prover,
            chain,
        }
    }

    pub fn store(&self) -> &Arc<BatchStore> {
        &self.store
    }

    pub async fn venue_get_market(&self, market_id: &str) -> Option<crate::venue::MarketInfo> {
        self.venue.get_market(market_id).await.ok()
    }

    pub fn chain_deposit_address(&self) -> &str {
        self.chain.deposit_address()
    }

    pub async fn chain_transfer_usdc(&self, to_address: &str, amount_micros: u128) -> Result<String, String> {
        send_with_retry(|| self.chain.transfer_usdc(to_address, amount_micros)).await
    }

    /// spec §4.6 `submit`.
    pub fn submit(&self, payload: SubmitOrderPayload) -> Result<SubmitOrderResponse, AppError> {
        if payload.usdc_amount_micros == 0 {
            return Err(AppError::BadInput("usdcAmount must be > 0".into()));
        }
        validate_distribution(&payload.distribution)?;

        let salt = payload.salt.unwrap_or_else(Salt::random);
        let primary = &payload.distribution[0];
        let commitment_hash = self.commitment.commitment_hash(
            &payload.market_id,
            payload.side,
            payload.usdc_amount_micros,
            &primary.address,
            &salt,
            &payload.distribution,
        )?;

        let now = now_epoch();
        let order = Order {
            id: OrderId::new(),
            batch_id: BatchId::new(), // overwritten by BatchStore::submit_order
            market_id: payload.market_id.clone(),
            side: payload.side,
            usdc_amount_micros: payload.usdc_amount_micros,
            distribution: payload.distribution,
            salt,
            commitment_hash,
            status: OrderStatus::PendingDeposit,
            created_at: now,
            deposit_expires_at: now + self.config.deposit_expiry_secs,
            deposit_tx: None,
            deposit_sender: None,
            deposit_confirmed_at: None,
            effective_usdc_spent_micros: None,
            shares_received: None,
            refund_amount_micros: None,
            distribution_results: Vec::new(),
            is_encrypted: false,
            encrypted_payload: None,
        };
        let order_id = order.id;
        let deposit_expires_at = order.deposit_expires_at;

        let batch_id = self.store.submit_order(order, self.config.max_batch_size);
        self.cache_token_mints(batch_id, payload.yes_token_mint, payload.no_token_mint);

        Ok(SubmitOrderResponse {
            order_id,
            batch_id,
            commitment_hash,
            status: OrderStatus::PendingDeposit,
            deposit_address: self.chain.deposit_address().to_string(),
            deposit_expires_at,
        })
    }

    /// spec §6 `POST /order/encrypted`: the amount/distribution are opaque
    /// to the relay, so no commitment or distribution validation happens
    /// here — the order is placed into a batch keyed on (marketId, side)
    /// and carries only the ciphertext blob and the flag.
    pub fn submit_encrypted(
        &self,
        market_id: String,
        side: Side,
        ciphertext: String,
    ) -> Result<SubmitOrderResponse, AppError> {
        let now = now_epoch();
        let salt = Salt::random();
        // With no plaintext amount/address the commitment collapses to a
        // hash of the ciphertext itself; this binds the opaque order into
        // the Merkle leaf set without revealing its contents.
        let commitment_hash = {
            use ark_ff::PrimeField;
            crate::field::Fr::from_be_bytes_mod_order(ciphertext.as_bytes())
        };
        let order = Order {
            id: OrderId::new(),
            batch_id: BatchId::new(),
            market_id: market_id.clone(),
            side,
            usdc_amount_micros: 0,
            distribution: Vec::new(),
            salt,
            commitment_hash,
            status: OrderStatus::PendingDeposit,
            created_at: now,
            deposit_expires_at: now + self.config.deposit_expiry_secs,
            deposit_tx: None,
            deposit_sender: None,
            deposit_confirmed_at: None,
            effective_usdc_spent_micros: None,
            shares_received: None,
            refund_amount_micros: None,
            distribution_results: Vec::new(),
            is_encrypted: true,
            encrypted_payload: Some(ciphertext),
        };
        let order_id = order.id;
        let deposit_expires_at = order.deposit_expires_at;
        let batch_id = self.store.submit_order(order, self.config.max_batch_size);
        self.store.update_batch(batch_id, |b| b.is_encrypted = true);

        Ok(SubmitOrderResponse {
            order_id,
            batch_id,
            commitment_hash,
            status: OrderStatus::PendingDeposit,
            deposit_address: self.chain.deposit_address().to_string(),
            deposit_expires_at,
        })
    }

    /// spec §4.7 step 3, structured-memo path: a deposit carrying its own
    /// order spec is already funded the instant it's observed, so it skips
    /// `pending_deposit` entirely and lands directly in its own batch ready
    /// to execute.
    pub fn submit_funded_standalone(
        &self,
        market_id: String,
        side: Side,
        usdc_amount_micros: u128,
        distribution: Vec<DistributionEntry>,
        deposit_tx: String,
        deposit_sender: String,
    ) -> Result<BatchId, AppError> {
        validate_distribution(&distribution)?;
        let salt = Salt::random();
        let primary = &distribution[0];
        let commitment_hash = self.commitment.commitment_hash(
            &market_id,
            side,
            usdc_amount_micros,
            &primary.address,
            &salt,
            &distribution,
        )?;
        let now = now_epoch();
        let order = Order {
            id: OrderId::new(),
            batch_id: BatchId::new(),
            market_id,
            side,
            usdc_amount_micros,
            distribution,
            salt,
            commitment_hash,
            status: OrderStatus::Pending,
            created_at: now,
            deposit_expires_at: now + self.config.deposit_expiry_secs,
            deposit_tx: Some(deposit_tx),
            deposit_sender: Some(deposit_sender),
            deposit_confirmed_at: Some(now),
            effective_usdc_spent_micros: None,
            shares_received: None,
            refund_amount_micros: None,
            distribution_results: Vec::new(),
            is_encrypted: false,
            encrypted_payload: None,
        };
        Ok(self.store.submit_standalone(order))
    }

    fn cache_token_mints(&self, batch_id: BatchId, yes_mint: Option<String>, no_mint: Option<String>) {
        if yes_mint.is_none() && no_mint.is_none() {
            return;
        }
        self.store.update_batch(batch_id, |b| {
            if b.yes_token_mint.is_none() {
                b.yes_token_mint = yes_mint;
            }
            if b.no_token_mint.is_none() {
                b.no_token_mint = no_mint;
            }
        });
    }

    /// spec §4.6 `activate`, called by `DepositMatcher`.
    pub fn activate(&self, order_id: OrderId, tx: String, sender: String) {
        let now = now_epoch();
        let transitioned =
            self.store
                .try_transition_order(order_id, OrderStatus::PendingDeposit, OrderStatus::Pending);
        if transitioned {
            self.store.update_order(order_id, |o| {
                o.deposit_tx = Some(tx);
                o.deposit_sender = Some(sender);
                o.deposit_confirmed_at = Some(now);
            });
        }
    }

    /// spec §4.6 `closeBatch`.
    pub fn close_batch(&self, batch_id: BatchId) -> Result<(), AppError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .ok_or_else(|| AppError::NotFound(format!("batch {batch_id}")))?;
        match batch.status {
            BatchStatus::Collecting => {
                self.store.mark_ready(batch_id);
                Ok(())
            }
            BatchStatus::Ready => Ok(()),
            other => Err(AppError::StateConflict(format!(
                "batch {batch_id} cannot be closed from status {other:?}"
            ))),
        }
    }

    /// spec §4.6 `execute`. Pre-condition failures (batch missing, not
    /// `ready`) surface synchronously as `AppError`; once execution starts,
    /// every further failure is recorded on the batch itself and this
    /// returns `Ok(())` — callers read the batch record for the outcome.
    pub async fn execute(&self, batch_id: BatchId) -> Result<(), AppError> {
        if !self
            .store
            .try_transition_batch(batch_id, BatchStatus::Ready, BatchStatus::Executing)
        {
            let exists = self.store.get_batch(batch_id).is_some();
            return if exists {
                Err(AppError::StateConflict(format!("batch {batch_id} is not ready")))
            } else {
                Err(AppError::NotFound(format!("batch {batch_id}")))
            };
        }

        let batch = self.store.get_batch(batch_id).expect("just transitioned");
        let all_orders = self.store.list_orders(batch_id);
        let funded: Vec<Order> = all_orders
            .into_iter()
            .filter(|o| o.status == OrderStatus::Pending)
            .collect();

        if funded.is_empty() {
            self.fail_batch(batch_id, "no_funded_orders");
            return Ok(());
        }

        let funded_total: u128 = funded.iter().map(|o| o.usdc_amount_micros).sum();
        self.store.update_batch(batch_id, |b| b.funded_usdc_total_micros = funded_total);

        let output_mint = match batch.side {
            Side::Yes => batch.yes_token_mint.clone(),
            Side::No => batch.no_token_mint.clone(),
        };

        let execution = tokio::time::timeout(
            self.config.venue_execution_timeout,
            self.venue.execute(ExecutionRequest {
                market_id: batch.market_id.clone(),
                side: batch.side,
                usdc_amount_micros: funded_total,
                slippage_bps: 100,
                output_mint,
            }),
        )
        .await;

        let receipt = match execution {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(kind)) => {
                warn!(%batch_id, %kind, "venue execution failed");
                self.fail_batch(batch_id, &format!("venue_failure:{kind}"));
                return Ok(());
            }
            Err(_elapsed) => {
                warn!(%batch_id, "venue execution timed out");
                self.fail_batch(batch_id, &format!("venue_failure:{}", VenueFailureKind::Timeout));
                return Ok(());
            }
        };

        self.store.update_batch(batch_id, |b| {
            b.actual_usdc_spent_micros = Some(receipt.usdc_spent_micros);
            b.actual_shares_received = Some(receipt.shares_received);
            b.average_price = Some(receipt.average_price.clone());
            b.fill_percentage = Some(receipt.fill_percentage);
            b.venue_tx = Some(receipt.venue_tx.clone());
            b.execution_completed_at = Some(now_epoch());
            b.status = BatchStatus::Proving;
        });

        let allocations = DistributionPlanner::plan(
            &funded
                .iter()
                .map(|o| FundedOrderInput {
                    order_id: o.id,
                    usdc_amount_micros: o.usdc_amount_micros,
                    distribution: o.distribution.clone(),
                })
                .collect::<Vec<_>>(),
            VenueFill {
                usdc_spent_micros: receipt.usdc_spent_micros,
                shares_received: receipt.shares_received,
            },
        );

        let commitments: Vec<_> = funded.iter().map(|o| o.commitment_hash).collect();
        let root = self.merkle.root(&commitments);
        let allocation_shares: Vec<u128> = allocations.iter().map(|a| a.shares).collect();

        self.store.update_batch(batch_id, |b| b.merkle_root = Some(root));

        let proof = match self
            .prover
            .generate(ProofRequest {
                root,
                total_in_micros: funded_total,
                total_out_shares: receipt.shares_received,
                market_id: batch.market_id.clone(),
                side: batch.side,
                commitments,
                allocation_shares,
            })
            .await
        {
            Ok(proof) => proof,
            Err(e) => {
                error!(%batch_id, error = %e, "proof generation failed");
                self.fail_batch(batch_id, "proof_failure");
                return Ok(());
            }
        };

        self.store.update_batch(batch_id, |b| {
            b.proof_blob = Some(proof.proof_blob.clone());
            b.public_inputs = proof.public_inputs.clone();
            b.proof_verified = Some(proof.verified);
            b.status = BatchStatus::Distributing;
        });

        for alloc in &allocations {
            let order = funded.iter().find(|o| o.id == alloc.order_id).expect("allocation for known order");
            let mint = match batch.side {
                Side::Yes => batch.yes_token_mint.clone(),
                Side::No => batch.no_token_mint.clone(),
            }
            .unwrap_or_else(|| format!("{}-{:?}", batch.market_id, batch.side));

            let mut results = Vec::with_capacity(alloc.destinations.len());
            for dest in &alloc.destinations {
                let txid = if dest.shares > 0 {
                    match send_with_retry(|| self.chain.transfer_token(&mint, &dest.address, dest.shares)).await {
                        Ok(txid) => Some(txid),
                        Err(e) => {
                            warn!(order_id = %order.id, address = %dest.address, error = %e, "share transfer failed");
                            None
                        }
                    }
                } else {
                    None
                };
                results.push(DistributionResult {
                    address: dest.address.clone(),
                    shares: dest.shares,
                    txid,
                });
            }

            if alloc.refund_micros > 0 {
                let primary = &order.distribution[0].address;
                if let Err(e) = send_with_retry(|| self.chain.transfer_usdc(primary, alloc.refund_micros)).await {
                    warn!(order_id = %order.id, error = %e, "refund transfer failed");
                }
            }

            let order_id = order.id;
            let effective_spent = alloc.effective_usdc_spent_micros;
            let refund = alloc.refund_micros;
            let shares = alloc.shares;
            self.store.update_order(order_id, |o| {
                o.effective_usdc_spent_micros = Some(effective_spent);
                o.refund_amount_micros = Some(refund);
                o.shares_received = Some(shares);
                o.distribution_results = results;
                o.status = OrderStatus::Completed;
            });
        }

        self.store.update_batch(batch_id, |b| {
            b.status = BatchStatus::Completed;
            b.distribution_completed_at = Some(now_epoch());
        });

        info!(%batch_id, orders = funded.len(), "batch completed");
        Ok(())
    }

    fn fail_batch(&self, batch_id: BatchId, reason: &str) {
        self.store.update_batch(batch_id, |b| {
            b.status = BatchStatus::Failed;
            b.failure_reason = Some(reason.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;
    use crate::proof::MockProver;
    use crate::venue::MockVenue;

    fn lifecycle() -> BatchLifecycle<MockVenue, MockProver, MockChain> {
        let store = Arc::new(BatchStore::new());
        let config = RelayConfig {
            host: "0.0.0.0".into(),
            port: 0,
            max_batch_size: 25,
            min_batch_size: 1,
            batch_timeout_secs: 60,
            deposit_expiry_secs: 3600,
            deposit_poll_interval: std::time::Duration::from_secs(15),
            amount_match_tolerance_micros: 10_000,
            unmatched_retention_secs: 7 * 86_400,
            scheduler_tick: std::time::Duration::from_secs(1),
            venue_execution_timeout: std::time::Duration::from_secs(30),
            snapshot_interval_secs: 30,
            allowed_origins: Vec::new(),
        };
        BatchLifecycle::new(
            store,
            config,
            Arc::new(MockVenue::default()),
            Arc::new(MockProver),
            Arc::new(MockChain::new("custody-address")),
        )
    }

    fn payload(market_id: &str, amount: u128, dist: Vec<(&str, u32)>) -> SubmitOrderPayload {
        SubmitOrderPayload {
            market_id: market_id.to_string(),
            side: Side::Yes,
            usdc_amount_micros: amount,
            distribution: dist
                .into_iter()
                .map(|(a, bps)| DistributionEntry { address: a.to_string(), bps })
                .collect(),
            salt: None,
            yes_token_mint: None,
            no_token_mint: None,
        }
    }

    #[test]
    fn submit_rejects_bad_distribution_sum() {
        let lc = lifecycle();
        let err = lc
            .submit(payload("MKT-A", 10_000_000, vec![("11111111111111111111111111111111", 9000)]))
            .unwrap_err();
        assert!(matches!(err, AppError::BadInput(_)));
    }

    #[tokio::test]
    async fn single_order_full_fill_end_to_end() {
        let lc = lifecycle();
        let resp = lc
            .submit(payload(
                "MKT-A",
                10_000_000,
                vec![("11111111111111111111111111111111", 10000)],
            ))
            .unwrap();
        lc.activate(resp.order_id, "tx1".into(), "sender1".into());
        lc.close_batch(resp.batch_id).unwrap();
        lc.execute(resp.batch_id).await.unwrap();

        let batch = lc.store.get_batch(resp.batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert!(batch.proof_verified.unwrap());

        let order = lc.store.get_order(resp.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.shares_received, Some(20_000_000));
        assert_eq!(order.refund_amount_micros, Some(0));
    }

    #[tokio::test]
    async fn execute_fails_batch_with_no_funded_orders() {
        let lc = lifecycle();
        let resp = lc
            .submit(payload(
                "MKT-A",
                10_000_000,
                vec![("11111111111111111111111111111111", 10000)],
            ))
            .unwrap();
        lc.close_batch(resp.batch_id).unwrap();
        lc.execute(resp.batch_id).await.unwrap();
        let batch = lc.store.get_batch(resp.batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(batch.failure_reason.as_deref(), Some("no_funded_orders"));
    }

    #[tokio::test]
    async fn execute_rejects_batch_not_ready() {
        let lc = lifecycle();
        let resp = lc
            .submit(payload(
                "MKT-A",
                10_000_000,
                vec![("11111111111111111111111111111111", 10000)],
            ))
            .unwrap();
        let err = lc.execute(resp.batch_id).await.unwrap_err();
        assert!(matches!(err, AppError::StateConflict(_)));
    }
}
