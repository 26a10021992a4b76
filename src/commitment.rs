//! Per-order commitment hash and distribution hash (spec §4.3).
//!
//! The composition here is a fixed protocol constant shared with the
//! off-process `ProofGenerator`: any deviation between this crate and the
//! prover's binding would invalidate every proof the relay produces, so the
//! formula below must never be "simplified" without updating both sides.

use crate::error::AppError;
use crate::field::{FieldCodec, Fr};
use crate::hash::HashEngine;
use crate::types::{DistributionEntry, Order, Salt, Side};

pub struct CommitmentBuilder {
    hasher: HashEngine,
}

impl Default for CommitmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitmentBuilder {
    pub fn new() -> Self {
        Self {
            hasher: HashEngine::new(),
        }
    }

    /// `distributionHash(distribution) = hashN([hash2(addressField(d.addr), d.bps) ...])`.
    /// Collapses to the encoded primary-address field when `|distribution| == 1`
    /// (spec convention, preserved for backward compatibility).
    pub fn distribution_hash(&self, distribution: &[DistributionEntry]) -> Result<Fr, AppError> {
        if distribution.len() == 1 {
            return FieldCodec::address_field(&distribution[0].address);
        }
        let mut leaves = Vec::with_capacity(distribution.len());
        for entry in distribution {
            let addr = FieldCodec::address_field(&entry.address)?;
            leaves.push(self.hasher.hash2(addr, Fr::from(entry.bps as u64)));
        }
        Ok(self.hasher.hash_n(&leaves))
    }

    /// `commitmentHash(order) = hash2(hash5(ticker, side, amount, primaryAddr, salt), distributionHash)`.
    pub fn commitment_hash(
        &self,
        market_id: &str,
        side: Side,
        usdc_amount_micros: u128,
        primary_address: &str,
        salt: &Salt,
        distribution: &[DistributionEntry],
    ) -> Result<Fr, AppError> {
        let ticker = FieldCodec::ticker_field(market_id)?;
        let side_f = FieldCodec::side_field(side);
        let amount = FieldCodec::amount_field(usdc_amount_micros);
        let primary = FieldCodec::address_field(primary_address)?;
        let salt_f = FieldCodec::salt_field(salt);

        let base = self.hasher.hash5(ticker, side_f, amount, primary, salt_f);
        let dist_hash = self.distribution_hash(distribution)?;
        Ok(self.hasher.hash2(base, dist_hash))
    }

    /// Convenience wrapper computing the commitment hash for an `Order`
    /// struct (used by `BatchLifecycle::submit` and for re-derivation in tests).
    pub fn commitment_hash_for_order(&self, order: &Order) -> Result<Fr, AppError> {
        let primary = order
            .distribution
            .first()
            .ok_or_else(|| AppError::BadInput("distribution must not be empty".into()))?;
        self.commitment_hash(
            &order.market_id,
            order.side,
            order.usdc_amount_micros,
            &primary.address,
            &order.salt,
            &order.distribution,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(addr: &str, bps: u32) -> DistributionEntry {
        DistributionEntry {
            address: addr.to_string(),
            bps,
        }
    }

    #[test]
    fn commitment_hash_is_deterministic() {
        let cb = CommitmentBuilder::new();
        let salt = Salt::from_hex("0x01").unwrap();
        let distribution = vec![dist("11111111111111111111111111111111", 10000)];
        let a = cb
            .commitment_hash("MKT-A", Side::Yes, 10_000_000, &distribution[0].address, &salt, &distribution)
            .unwrap();
        let b = cb
            .commitment_hash("MKT-A", Side::Yes, 10_000_000, &distribution[0].address, &salt, &distribution)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn commitment_hash_changes_with_amount() {
        let cb = CommitmentBuilder::new();
        let salt = Salt::from_hex("0x01").unwrap();
        let distribution = vec![dist("11111111111111111111111111111111", 10000)];
        let a = cb
            .commitment_hash("MKT-A", Side::Yes, 10_000_000, &distribution[0].address, &salt, &distribution)
            .unwrap();
        let b = cb
            .commitment_hash("MKT-A", Side::Yes, 20_000_000, &distribution[0].address, &salt, &distribution)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn single_destination_distribution_hash_collapses_to_address_field() {
        let cb = CommitmentBuilder::new();
        let distribution = vec![dist("11111111111111111111111111111111", 10000)];
        let got = cb.distribution_hash(&distribution).unwrap();
        let expected = FieldCodec::address_field(&distribution[0].address).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn multi_destination_distribution_hash_uses_hash_n() {
        let cb = CommitmentBuilder::new();
        let distribution = vec![dist("11111111111111111111111111111111", 5000), dist("22222222222222222222222222222222", 5000)];
        let got = cb.distribution_hash(&distribution).unwrap();
        // Must not collapse to either individual address field.
        assert_ne!(got, FieldCodec::address_field(&distribution[0].address).unwrap());
        assert_ne!(got, FieldCodec::address_field(&distribution[1].address).unwrap());
    }
}
