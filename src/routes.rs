//! Thin HTTP surface (spec §4.12, §6) onto `BatchStore`/`BatchLifecycle`/
//! `DepositMatcher`/`Scheduler`. Handlers validate request shape and
//! delegate everything else; no auth or rate-limiting lives here — both are
//! out-of-scope external collaborators per this protocol's component list.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chain::{ChainSender, ChainWatcher};
use crate::config::RelayConfig;
use crate::deposit_matcher::DepositMatcher;
use crate::error::AppError;
use crate::field::parse_usdc_micros;
use crate::lifecycle::{BatchLifecycle, SubmitOrderPayload};
use crate::proof::ProofGenerator;
use crate::scheduler::Scheduler;
use crate::store::BatchStore;
use crate::types::{BatchId, DistributionEntry, OrderId, Side};
use crate::venue::VenueExecutor;

pub struct AppState<V, P, C> {
    pub lifecycle: Arc<BatchLifecycle<V, P, C>>,
    pub deposit_matcher: Arc<DepositMatcher<V, P, C>>,
    pub scheduler: Arc<Scheduler<V, P, C>>,
    pub config: RelayConfig,
}

impl<V, P, C> AppState<V, P, C> {
    fn store(&self) -> &Arc<BatchStore>
    where
        V: VenueExecutor,
        P: ProofGenerator,
        C: ChainWatcher + ChainSender,
    {
        self.lifecycle.store()
    }
}

// ---------------------------------------------------------------------------
// Request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DistributionEntryBody {
    wallet: String,
    percentage: u32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitOrderBody {
    market_id: String,
    side: String,
    usdc_amount: String,
    #[serde(default)]
    distribution: Vec<DistributionEntryBody>,
    /// Legacy single-destination shorthand; equivalent to
    /// `distribution: [{wallet, percentage: 10000}]`.
    #[serde(default)]
    destination_wallet: Option<String>,
    #[serde(default)]
    salt: Option<String>,
    #[serde(default)]
    yes_token_mint: Option<String>,
    #[serde(default)]
    no_token_mint: Option<String>,
}

impl SubmitOrderBody {
    fn into_payload(self) -> Result<SubmitOrderPayload, AppError> {
        let side = Side::parse(&self.side)?;
        let usdc_amount_micros = parse_usdc_micros(&self.usdc_amount)?;

        let distribution = if !self.distribution.is_empty() {
            self.distribution
                .into_iter()
                .map(|d| DistributionEntry {
                    address: d.wallet,
                    bps: d.percentage,
                })
                .collect()
        } else if let Some(wallet) = self.destination_wallet {
            vec![DistributionEntry { address: wallet, bps: 10_000 }]
        } else {
            return Err(AppError::BadInput(
                "distribution or destinationWallet is required".into(),
            ));
        };

        let salt = self
            .salt
            .map(|s| crate::types::Salt::from_hex(&s))
            .transpose()?;

        Ok(SubmitOrderPayload {
            market_id: self.market_id,
            side,
            usdc_amount_micros,
            distribution,
            salt,
            yes_token_mint: self.yes_token_mint,
            no_token_mint: self.no_token_mint,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitEncryptedBody {
    market_id: String,
    side: String,
    ciphertext: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitOrderResponseBody {
    success: bool,
    order_id: String,
    batch_id: String,
    commitment_hash: String,
    status: &'static str,
    deposit: DepositInfo,
}

#[derive(Debug, Serialize)]
struct DepositInfo {
    address: String,
    amount: String,
    memo: String,
    expires_at: u64,
}

fn hash_hex(f: &crate::field::Fr) -> String {
    use ark_ff::{BigInteger, PrimeField};
    format!("0x{}", hex::encode(f.into_bigint().to_bytes_be()))
}

fn parse_order_id(s: &str) -> Result<OrderId, AppError> {
    s.parse().map_err(|_| AppError::BadInput(format!("invalid order id: {s}")))
}

fn parse_batch_id(s: &str) -> Result<BatchId, AppError> {
    s.parse().map_err(|_| AppError::BadInput(format!("invalid batch id: {s}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn status<V, P, C>(State(state): State<Arc<AppState<V, P, C>>>) -> impl IntoResponse
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let batches = state.store().all_batches();
    let collecting = batches.iter().filter(|b| b.status == crate::types::BatchStatus::Collecting).count();
    let completed = batches.iter().filter(|b| b.status == crate::types::BatchStatus::Completed).count();
    let total_orders: usize = batches.iter().map(|b| b.order_ids.len()).sum();

    Json(json!({
        // Balances come from the chain collaborator, which this protocol
        // only uses for transfers and deposit scanning, not balance queries.
        "wallet": { "address": state.lifecycle.chain_deposit_address() },
        "stats": {
            "totalBatches": batches.len(),
            "totalOrders": total_orders,
            "collecting": collecting,
            "completed": completed,
        },
    }))
}

pub async fn deposit_address<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
) -> impl IntoResponse
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let address = state.lifecycle.chain_deposit_address().to_string();
    Json(json!({ "address": address, "type": "usdc_custody" }))
}

pub async fn submit_order<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Json(body): Json<SubmitOrderBody>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let payload = body.into_payload()?;
    let amount_str = crate::field::format_usdc_micros(payload.usdc_amount_micros);
    let resp = state.lifecycle.submit(payload)?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(SubmitOrderResponseBody {
            success: true,
            order_id: resp.order_id.to_string(),
            batch_id: resp.batch_id.to_string(),
            commitment_hash: hash_hex(&resp.commitment_hash),
            status: "pending_deposit",
            deposit: DepositInfo {
                address: resp.deposit_address,
                amount: amount_str,
                memo: resp.order_id.to_string(),
                expires_at: resp.deposit_expires_at,
            },
        }),
    ))
}

pub async fn submit_encrypted<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Json(body): Json<SubmitEncryptedBody>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let side = Side::parse(&body.side)?;
    let resp = state.lifecycle.submit_encrypted(body.market_id, side, body.ciphertext)?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(SubmitOrderResponseBody {
            success: true,
            order_id: resp.order_id.to_string(),
            batch_id: resp.batch_id.to_string(),
            commitment_hash: hash_hex(&resp.commitment_hash),
            status: "pending_deposit",
            deposit: DepositInfo {
                address: resp.deposit_address,
                amount: "0".to_string(),
                memo: resp.order_id.to_string(),
                expires_at: resp.deposit_expires_at,
            },
        }),
    ))
}

pub async fn get_order<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let order_id = parse_order_id(&id)?;
    let order = state
        .store()
        .get_order(order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;
    Ok(Json(order))
}

pub async fn get_batch<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let batch_id = parse_batch_id(&id)?;
    let batch = state
        .store()
        .get_batch(batch_id)
        .ok_or_else(|| AppError::NotFound(format!("batch {id}")))?;
    Ok(Json(batch))
}

pub async fn list_batches<V, P, C>(State(state): State<Arc<AppState<V, P, C>>>) -> impl IntoResponse
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    Json(state.store().all_batches())
}

pub async fn list_ready_batches<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
) -> impl IntoResponse
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    Json(state.store().ready_batches())
}

pub async fn execute_batch<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let batch_id = parse_batch_id(&id)?;
    state.lifecycle.close_batch(batch_id)?;
    state.lifecycle.execute(batch_id).await?;
    let batch = state.store().get_batch(batch_id).ok_or_else(|| AppError::NotFound(format!("batch {id}")))?;
    Ok(Json(json!({ "status": batch.status, "batchId": id })))
}

pub async fn execute_ready<V, P, C>(State(state): State<Arc<AppState<V, P, C>>>) -> impl IntoResponse
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let n = state.scheduler.execute_all_ready().await;
    Json(json!({ "triggered": n }))
}

pub async fn get_proof<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let batch_id = parse_batch_id(&id)?;
    let batch = state
        .store()
        .get_batch(batch_id)
        .ok_or_else(|| AppError::NotFound(format!("batch {id}")))?;

    let status = match batch.status {
        crate::types::BatchStatus::Completed if batch.proof_verified == Some(true) => "verified",
        crate::types::BatchStatus::Proving | crate::types::BatchStatus::Distributing => "generating",
        crate::types::BatchStatus::Failed if batch.proof_blob.is_none() => "none",
        _ if batch.proof_blob.is_some() => "pending",
        _ => "none",
    };

    Ok(Json(json!({
        "hasProof": batch.proof_blob.is_some(),
        "status": status,
        "proofHash": batch.proof_blob,
        "publicInputs": batch.public_inputs,
        "executionInfo": {
            "actualUsdcSpent": batch.actual_usdc_spent_micros,
            "actualSharesReceived": batch.actual_shares_received,
            "fillPercentage": batch.fill_percentage,
        },
    })))
}

pub async fn list_unmatched<V, P, C>(State(state): State<Arc<AppState<V, P, C>>>) -> impl IntoResponse
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    Json(state.store().list_unmatched(false))
}

#[derive(Debug, Deserialize)]
pub struct MatchDepositBody {
    signature: String,
    order_id: String,
}

pub async fn match_deposit<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Json(body): Json<MatchDepositBody>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let order_id = parse_order_id(&body.order_id)?;
    let deposit = state
        .store()
        .list_unmatched(true)
        .into_iter()
        .find(|d| d.txid == body.signature)
        .ok_or_else(|| AppError::NotFound(format!("unmatched deposit {}", body.signature)))?;

    state.lifecycle.activate(order_id, deposit.txid.clone(), deposit.sender_address.clone());
    state.store().resolve_unmatched(&deposit.txid);

    Ok(Json(json!({ "status": "matched", "orderId": body.order_id })))
}

#[derive(Debug, Deserialize)]
pub struct RefundDepositBody {
    signature: String,
}

pub async fn refund_deposit<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Json(body): Json<RefundDepositBody>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let deposit = state
        .store()
        .list_unmatched(true)
        .into_iter()
        .find(|d| d.txid == body.signature)
        .ok_or_else(|| AppError::NotFound(format!("unmatched deposit {}", body.signature)))?;

    let txid = state
        .lifecycle
        .chain_transfer_usdc(&deposit.sender_address, deposit.amount_micros)
        .await
        .map_err(AppError::VenueFailure)?;
    state.store().resolve_unmatched(&deposit.txid);

    Ok(Json(json!({ "status": "refunded", "txid": txid })))
}

#[derive(Debug, Deserialize)]
pub struct ActivateOrderBody {
    deposit_tx_signature: String,
    sender_wallet: String,
}

pub async fn activate_order<V, P, C>(
    State(state): State<Arc<AppState<V, P, C>>>,
    Path(id): Path<String>,
    Json(body): Json<ActivateOrderBody>,
) -> Result<impl IntoResponse, AppError>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    let order_id = parse_order_id(&id)?;
    state
        .store()
        .get_order(order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;
    state.lifecycle.activate(order_id, body.deposit_tx_signature, body.sender_wallet);
    let order = state.store().get_order(order_id).expect("order exists");
    Ok(Json(json!({ "status": order.status, "orderId": id })))
}
