//! Watches the custody account for incoming USDC and turns confirmed
//! transfers into order activations, refunds, or orphaned deposits (spec
//! §4.7). Single-threaded over its own scanning cursor, mirroring this
//! corpus's tree-sync background poller.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::chain::{ChainDeposit, ChainSender, ChainWatcher};
use crate::config::RelayConfig;
use crate::field::parse_usdc_micros;
use crate::lifecycle::BatchLifecycle;
use crate::proof::ProofGenerator;
use crate::store::BatchStore;
use crate::types::{DistributionEntry, MemoKind, OrderId, Side, UnmatchedDeposit};
use crate::venue::VenueExecutor;

fn now_epoch() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub struct DepositMatcher<V, P, C> {
    lifecycle: Arc<BatchLifecycle<V, P, C>>,
    chain: Arc<C>,
    config: RelayConfig,
    cursor: Mutex<Option<String>>,
}

impl<V, P, C> DepositMatcher<V, P, C>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    pub fn new(lifecycle: Arc<BatchLifecycle<V, P, C>>, chain: Arc<C>, config: RelayConfig) -> Self {
        Self {
            lifecycle,
            chain,
            config,
            cursor: Mutex::new(None),
        }
    }

    fn store(&self) -> &Arc<BatchStore> {
        self.lifecycle.store()
    }

    /// One scan iteration: pulls new deposits since the cursor, processes
    /// each oldest-first, and advances the cursor only past what was
    /// actually consumed (spec §4.7 steps 1-4).
    pub async fn poll_once(&self) -> Result<usize, String> {
        let since = self.cursor.lock().unwrap().clone();
        let deposits = self.chain.poll_deposits(since.as_deref()).await?;

        let mut processed = 0;
        for deposit in deposits {
            if self.store().is_processed(&deposit.txid) {
                *self.cursor.lock().unwrap() = Some(deposit.txid.clone());
                continue;
            }
            self.process_deposit(&deposit).await;
            self.store().mark_processed(&deposit.txid);
            *self.cursor.lock().unwrap() = Some(deposit.txid.clone());
            processed += 1;
        }
        Ok(processed)
    }

    async fn process_deposit(&self, deposit: &ChainDeposit) {
        match MemoKind::parse(deposit.memo.as_deref()) {
            MemoKind::Structured {
                market_ticker,
                outcome_mint,
                amount,
                destinations,
                ..
            } => {
                self.handle_structured(deposit, &market_ticker, &outcome_mint, &amount, destinations)
                    .await;
            }
            MemoKind::OrderId(order_id) => self.handle_order_id(deposit, order_id).await,
            MemoKind::Unknown(_) => self.handle_orphan(deposit),
        }
    }

    async fn handle_structured(
        &self,
        deposit: &ChainDeposit,
        market_ticker: &str,
        outcome_mint: &str,
        amount: &str,
        destinations: Vec<String>,
    ) {
        let parsed_amount = match parse_usdc_micros(amount) {
            Ok(v) => v,
            Err(e) => {
                warn!(txid = %deposit.txid, error = %e, "structured memo has invalid amount, treating as orphan");
                self.handle_orphan(deposit);
                return;
            }
        };

        let side = match self.resolve_side(market_ticker, outcome_mint).await {
            Some(side) => side,
            None => {
                warn!(txid = %deposit.txid, %outcome_mint, "structured memo mint did not match either side, treating as orphan");
                self.handle_orphan(deposit);
                return;
            }
        };

        let distribution = even_split(&destinations);
        match self.lifecycle.submit_funded_standalone(
            market_ticker.to_string(),
            side,
            parsed_amount,
            distribution,
            deposit.txid.clone(),
            deposit.sender_address.clone(),
        ) {
            Ok(batch_id) => {
                info!(txid = %deposit.txid, %batch_id, "structured memo activated impromptu order");
                if let Err(e) = self.lifecycle.close_batch(batch_id) {
                    warn!(%batch_id, error = %e, "could not close impromptu batch");
                    return;
                }
                if let Err(e) = self.lifecycle.execute(batch_id).await {
                    warn!(%batch_id, error = %e, "impromptu execution failed to start");
                }
            }
            Err(e) => {
                warn!(txid = %deposit.txid, error = %e, "structured memo rejected, treating as orphan");
                self.handle_orphan(deposit);
            }
        }
    }

    async fn resolve_side(&self, market_ticker: &str, outcome_mint: &str) -> Option<Side> {
        let market = self.lifecycle.venue_get_market(market_ticker).await?;
        if market.yes_mint == outcome_mint {
            Some(Side::Yes)
        } else if market.no_mint == outcome_mint {
            Some(Side::No)
        } else {
            None
        }
    }

    async fn handle_order_id(&self, deposit: &ChainDeposit, order_id: OrderId) {
        let Some(order) = self.store().get_order(order_id) else {
            warn!(txid = %deposit.txid, %order_id, "memo named an unknown order, treating as orphan");
            self.handle_orphan(deposit);
            return;
        };

        let delta = order.usdc_amount_micros.abs_diff(deposit.amount_micros);
        if delta <= self.config.amount_match_tolerance_micros {
            self.lifecycle
                .activate(order_id, deposit.txid.clone(), deposit.sender_address.clone());
            info!(%order_id, txid = %deposit.txid, "order activated from deposit");
        } else {
            warn!(%order_id, txid = %deposit.txid, declared = order.usdc_amount_micros, received = deposit.amount_micros, "deposit amount mismatch, refunding sender");
            if let Err(e) = crate::chain::send_with_retry(|| {
                self.chain.transfer_usdc(&deposit.sender_address, deposit.amount_micros)
            })
            .await
            {
                warn!(%order_id, error = %e, "mismatch refund failed");
            }
        }
    }

    fn handle_orphan(&self, deposit: &ChainDeposit) {
        self.store().add_unmatched(UnmatchedDeposit {
            txid: deposit.txid.clone(),
            sender_address: deposit.sender_address.clone(),
            amount_micros: deposit.amount_micros,
            memo: deposit.memo.clone(),
            seen_at: now_epoch(),
            resolved: false,
        });
    }

    /// Spawns the background poll loop at `config.deposit_poll_interval`.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.deposit_poll_interval);
            loop {
                interval.tick().await;
                match self.poll_once().await {
                    Ok(0) => {}
                    Ok(n) => info!(n, "deposit matcher processed new deposits"),
                    Err(e) => warn!(error = %e, "deposit poll failed, will retry next tick"),
                }
            }
        })
    }
}

/// Splits 10000 bps evenly across `addresses`, with the last destination
/// absorbing the remainder — structured memos carry no explicit bps.
fn even_split(addresses: &[String]) -> Vec<DistributionEntry> {
    let n = addresses.len().max(1) as u32;
    let share = 10_000 / n;
    let mut out: Vec<DistributionEntry> = addresses
        .iter()
        .take(addresses.len().saturating_sub(1))
        .map(|addr| DistributionEntry {
            address: addr.clone(),
            bps: share,
        })
        .collect();
    let allocated: u32 = out.iter().map(|d| d.bps).sum();
    if let Some(last) = addresses.last() {
        out.push(DistributionEntry {
            address: last.clone(),
            bps: 10_000 - allocated,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_single_destination_gets_everything() {
        let dist = even_split(&["addr1".to_string()]);
        assert_eq!(dist.len(), 1);
        assert_eq!(dist[0].bps, 10_000);
    }

    #[test]
    fn even_split_absorbs_remainder_on_last() {
        let dist = even_split(&["a".into(), "b".into(), "c".into()]);
        let total: u32 = dist.iter().map(|d| d.bps).sum();
        assert_eq!(total, 10_000);
        assert_eq!(dist[0].bps, 3333);
        assert_eq!(dist[2].bps, 3334);
    }
}
