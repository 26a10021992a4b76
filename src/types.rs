//! Core data model (spec §3): orders, batches, and the small value types
//! they're built from. Cross-references between orders and batches are
//! id-only — both are stored as values in `BatchStore`, never as an object
//! graph (spec §9 "Cyclic references").

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Opaque unique order identifier; doubles as the on-chain deposit memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OrderId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Opaque unique batch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BatchId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Ok(Side::Yes),
            "NO" => Ok(Side::No),
            other => Err(AppError::BadInput(format!("side must be YES or NO, got {other}"))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// A random field element salted into the commitment hash. Serialized as a
/// hex string; decoded the same way an address field is (big-endian bytes
/// mod P).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Salt(#[serde(with = "hex_bytes32")] pub [u8; 32]);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, AppError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let decoded =
            hex::decode(trimmed).map_err(|e| AppError::BadInput(format!("salt is not valid hex: {e}")))?;
        if decoded.len() > 32 {
            return Err(AppError::BadInput("salt must be at most 32 bytes".into()));
        }
        let mut bytes = [0u8; 32];
        bytes[32 - decoded.len()..].copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let trimmed = s.strip_prefix("0x").unwrap_or(&s);
        let decoded = hex::decode(trimmed).map_err(serde::de::Error::custom)?;
        let mut bytes = [0u8; 32];
        if decoded.len() > 32 {
            return Err(serde::de::Error::custom("salt exceeds 32 bytes"));
        }
        bytes[32 - decoded.len()..].copy_from_slice(&decoded);
        Ok(bytes)
    }
}

/// One destination in an order's share-distribution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEntry {
    pub address: String,
    /// Basis points, 1..=10000, strictly positive.
    pub bps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingDeposit,
    Pending,
    Executing,
    Completed,
    Refunded,
    Expired,
}

/// Per-destination distribution outcome, populated after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionResult {
    pub address: String,
    pub shares: u128,
    pub txid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub batch_id: BatchId,
    pub market_id: String,
    pub side: Side,
    /// USDC amount in micro-units (10^-6 USDC), matching the 6dp wire format.
    pub usdc_amount_micros: u128,
    pub distribution: Vec<DistributionEntry>,
    pub salt: Salt,
    #[serde(with = "hex_field")]
    pub commitment_hash: crate::field::Fr,
    pub status: OrderStatus,
    pub created_at: u64,
    pub deposit_expires_at: u64,
    pub deposit_tx: Option<String>,
    pub deposit_sender: Option<String>,
    pub deposit_confirmed_at: Option<u64>,
    pub effective_usdc_spent_micros: Option<u128>,
    pub shares_received: Option<u128>,
    pub refund_amount_micros: Option<u128>,
    pub distribution_results: Vec<DistributionResult>,
    pub is_encrypted: bool,
    /// Opaque ciphertext blob for `/order/encrypted` submissions; the relay
    /// never inspects it (spec §6 "POST /order/encrypted").
    pub encrypted_payload: Option<String>,
}

pub(crate) mod hex_field {
    use ark_ff::{BigInteger, PrimeField};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::field::Fr;

    pub fn serialize<S: Serializer>(f: &Fr, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(f.into_bigint().to_bytes_be())))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(d)?;
        let trimmed = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(trimmed).map_err(serde::de::Error::custom)?;
        Ok(Fr::from_be_bytes_mod_order(&bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Collecting,
    Ready,
    Executing,
    Proving,
    Distributing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub market_id: String,
    pub side: Side,
    pub status: BatchStatus,
    /// Insertion order preserved; drives Merkle leaf / allocation ordering.
    pub order_ids: Vec<OrderId>,
    pub total_usdc_committed_micros: u128,
    pub funded_usdc_total_micros: u128,
    pub created_at: u64,
    pub actual_usdc_spent_micros: Option<u128>,
    pub actual_shares_received: Option<u128>,
    pub average_price: Option<String>,
    pub fill_percentage: Option<f64>,
    pub venue_tx: Option<String>,
    pub execution_completed_at: Option<u64>,
    pub distribution_completed_at: Option<u64>,
    #[serde(with = "hex_field_opt")]
    pub merkle_root: Option<crate::field::Fr>,
    pub proof_blob: Option<String>,
    pub public_inputs: Vec<String>,
    pub proof_verified: Option<bool>,
    pub yes_token_mint: Option<String>,
    pub no_token_mint: Option<String>,
    pub is_encrypted: bool,
    pub failure_reason: Option<String>,
}

mod hex_field_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::field::Fr;

    pub fn serialize<S: Serializer>(f: &Option<Fr>, s: S) -> Result<S::Ok, S::Error> {
        match f {
            Some(f) => super::hex_field::serialize(f, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Fr>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        match opt {
            None => Ok(None),
            Some(s) => {
                let trimmed = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(trimmed).map_err(serde::de::Error::custom)?;
                use ark_ff::PrimeField;
                Ok(Some(Fr::from_be_bytes_mod_order(&bytes)))
            }
        }
    }
}

impl Batch {
    pub fn new(market_id: String, side: Side, now: u64) -> Self {
        Self {
            id: BatchId::new(),
            market_id,
            side,
            status: BatchStatus::Collecting,
            order_ids: Vec::new(),
            total_usdc_committed_micros: 0,
            funded_usdc_total_micros: 0,
            created_at: now,
            actual_usdc_spent_micros: None,
            actual_shares_received: None,
            average_price: None,
            fill_percentage: None,
            venue_tx: None,
            execution_completed_at: None,
            distribution_completed_at: None,
            merkle_root: None,
            proof_blob: None,
            public_inputs: Vec::new(),
            proof_verified: None,
            yes_token_mint: None,
            no_token_mint: None,
            is_encrypted: false,
            failure_reason: None,
        }
    }
}

/// A chain deposit that could not be matched to an order (spec §4.7 step 3,
/// "no memo or unknown").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedDeposit {
    pub txid: String,
    pub sender_address: String,
    pub amount_micros: u128,
    pub memo: Option<String>,
    pub seen_at: u64,
    pub resolved: bool,
}

/// Parsed memo kind attached to a chain transfer (spec §9 "tagged variant
/// for memo kinds").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoKind {
    OrderId(OrderId),
    Structured {
        action: String,
        market_ticker: String,
        outcome_mint: String,
        amount: String,
        slippage_bps: u32,
        destinations: Vec<String>,
    },
    Unknown(Option<String>),
}

impl MemoKind {
    /// Parses a raw on-chain memo string per spec §4.7 / §6.
    pub fn parse(memo: Option<&str>) -> Self {
        let Some(memo) = memo else {
            return MemoKind::Unknown(None);
        };
        if let Some(rest) = memo.strip_prefix("APP|") {
            let parts: Vec<&str> = rest.split('|').collect();
            if parts.len() == 6 {
                if let Ok(slippage_bps) = parts[4].parse::<u32>() {
                    return MemoKind::Structured {
                        action: parts[0].to_string(),
                        market_ticker: parts[1].to_string(),
                        outcome_mint: parts[2].to_string(),
                        amount: parts[3].to_string(),
                        slippage_bps,
                        destinations: parts[5].split(';').map(str::to_string).collect(),
                    };
                }
            }
            return MemoKind::Unknown(Some(memo.to_string()));
        }
        match memo.parse::<OrderId>() {
            Ok(id) => MemoKind::OrderId(id),
            Err(_) => MemoKind::Unknown(Some(memo.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_kind_parses_order_id() {
        let id = OrderId::new();
        assert_eq!(MemoKind::parse(Some(&id.to_string())), MemoKind::OrderId(id));
    }

    #[test]
    fn memo_kind_parses_structured() {
        let memo = "APP|swap|MKT-A|mintXYZ|10.00|50|addr1;addr2";
        match MemoKind::parse(Some(memo)) {
            MemoKind::Structured {
                action,
                market_ticker,
                destinations,
                slippage_bps,
                ..
            } => {
                assert_eq!(action, "swap");
                assert_eq!(market_ticker, "MKT-A");
                assert_eq!(slippage_bps, 50);
                assert_eq!(destinations, vec!["addr1".to_string(), "addr2".to_string()]);
            }
            other => panic!("expected structured memo, got {other:?}"),
        }
    }

    #[test]
    fn memo_kind_unknown_for_garbage() {
        assert_eq!(MemoKind::parse(Some("not-an-order-id")), MemoKind::Unknown(Some("not-an-order-id".into())));
        assert_eq!(MemoKind::parse(None), MemoKind::Unknown(None));
    }

    #[test]
    fn salt_hex_roundtrip() {
        let salt = Salt::random();
        let s = serde_json::to_string(&salt).unwrap();
        let back: Salt = serde_json::from_str(&s).unwrap();
        assert_eq!(salt, back);
    }
}
