//! JSON snapshot persistence (spec §6 "Persisted state"): a single
//! versioned document capturing orders, batches, the open-batch index, the
//! processed-signature set, and unmatched deposits. Written on a timer and
//! on graceful shutdown; loaded once at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::BatchStore;
use crate::types::{Batch, Order, Side, UnmatchedDeposit};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct OpenIndexEntry {
    market_id: String,
    side: Side,
    batch_id: crate::types::BatchId,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    orders: Vec<Order>,
    batches: Vec<Batch>,
    /// Recomputed from batch status on load; carried here only for
    /// diagnostics, never trusted over `Batch::status` (see
    /// `BatchStore::restore`).
    open_index: Vec<OpenIndexEntry>,
    processed_signatures: Vec<String>,
    unmatched_deposits: Vec<UnmatchedDeposit>,
}

/// Serializes the store to `path` atomically: written to a sibling `.tmp`
/// file first, then renamed over the destination so a crash mid-write never
/// leaves a truncated snapshot.
pub fn save(store: &BatchStore, path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        orders: store.snapshot_orders(),
        batches: store.snapshot_batches(),
        open_index: store
            .snapshot_open_index()
            .into_iter()
            .map(|(market_id, side, batch_id)| OpenIndexEntry {
                market_id,
                side,
                batch_id,
            })
            .collect(),
        processed_signatures: store.snapshot_processed(),
        unmatched_deposits: store.snapshot_unmatched(),
    };

    let json = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;

    info!(
        path = %path.display(),
        orders = snapshot.orders.len(),
        batches = snapshot.batches.len(),
        "wrote store snapshot"
    );
    Ok(())
}

/// Loads a snapshot into `store`, recomputing the open-batch index from
/// batch status rather than trusting the persisted `open_index` verbatim. A
/// missing file is not an error — it just means a fresh store.
pub fn load(store: &BatchStore, path: impl AsRef<Path>) -> std::io::Result<bool> {
    let path = path.as_ref();
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no snapshot found, starting fresh");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let snapshot: Snapshot = serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    if snapshot.version != SNAPSHOT_VERSION {
        warn!(
            found = snapshot.version,
            expected = SNAPSHOT_VERSION,
            "snapshot version mismatch, loading best-effort"
        );
    }

    let orders_len = snapshot.orders.len();
    let batches_len = snapshot.batches.len();
    store.restore(
        snapshot.orders,
        snapshot.batches,
        snapshot.unmatched_deposits,
        snapshot.processed_signatures,
    );

    info!(path = %path.display(), orders = orders_len, batches = batches_len, "restored store snapshot");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldCodec;
    use crate::types::{DistributionEntry, OrderId, OrderStatus, Salt};

    fn sample_order() -> Order {
        let amount = 1_000_000u128;
        Order {
            id: OrderId::new(),
            batch_id: crate::types::BatchId::new(),
            market_id: "MKT-A".into(),
            side: Side::Yes,
            usdc_amount_micros: amount,
            distribution: vec![DistributionEntry {
                address: "11111111111111111111111111111111".into(),
                bps: 10_000,
            }],
            salt: Salt::random(),
            commitment_hash: FieldCodec::amount_field(amount),
            status: OrderStatus::PendingDeposit,
            created_at: 0,
            deposit_expires_at: 3600,
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
    fn save_then_load_round_trips_orders_and_batches() {
        let store = BatchStore::new();
        store.submit_order(sample_order(), 25);

        let path = std::env::temp_dir().join(format!("relay-snapshot-test-{}.json", uuid::Uuid::new_v4()));

        save(&store, &path).unwrap();

        let restored = BatchStore::new();
        let loaded = load(&restored, &path).unwrap();
        assert!(loaded);
        assert_eq!(restored.snapshot_orders().len(), 1);
        assert_eq!(restored.open_batches().len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_missing_file_is_not_an_error() {
        let store = BatchStore::new();
        let loaded = load(&store, "/nonexistent/path/does-not-exist.json").unwrap();
        assert!(!loaded);
    }
}
