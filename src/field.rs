//! Canonical encoding of order fields into BN254 scalar-field elements.
//!
//! Mirrors how this corpus binds domain values to a prime field for an
//! off-process circuit (see e.g. the MiMC/Poseidon commitment encodings used
//! by privacy-pool style programs): every conversion is pure, total for
//! syntactically valid input, and reduces mod the field order rather than
//! rejecting out-of-range values.

use ark_ff::PrimeField;

use crate::error::AppError;
use crate::types::{Salt, Side};

pub type Fr = ark_bn254::Fr;

/// Converts order-level inputs into `Fr` elements.
///
/// All conversions agree bit-exact across platforms: they only depend on
/// integer/byte manipulation plus `Fr::from_be_bytes_mod_order`, which is a
/// pure function of the input bytes.
pub struct FieldCodec;

impl FieldCodec {
    /// `ticker -> field`: UTF-8 bytes packed MSB-first, reduced mod P.
    pub fn ticker_field(ticker: &str) -> Result<Fr, AppError> {
        if ticker.is_empty() || ticker.len() > 64 {
            return Err(AppError::BadInput(format!(
                "marketId length {} out of range (1..=64)",
                ticker.len()
            )));
        }
        Ok(Fr::from_be_bytes_mod_order(ticker.as_bytes()))
    }

    /// `side -> field`: YES=1, NO=0.
    pub fn side_field(side: Side) -> Fr {
        match side {
            Side::Yes => Fr::from(1u64),
            Side::No => Fr::from(0u64),
        }
    }

    /// `amount -> field`: decimal string parsed as fixed-point 10^6
    /// micro-units, then reduced mod P.
    pub fn amount_field(micro_units: u128) -> Fr {
        Fr::from_be_bytes_mod_order(&micro_units.to_be_bytes())
    }

    /// `address -> field`: base58-decoded to a 32-byte big-endian integer,
    /// reduced mod P.
    pub fn address_field(address: &str) -> Result<Fr, AppError> {
        let bytes = bs58::decode(address)
            .into_vec()
            .map_err(|e| AppError::BadInput(format!("address is not valid base58: {e}")))?;
        if bytes.is_empty() || bytes.len() > 32 {
            return Err(AppError::BadInput(format!(
                "address decodes to {} bytes, expected 1..=32",
                bytes.len()
            )));
        }
        Ok(Fr::from_be_bytes_mod_order(&bytes))
    }

    /// `salt -> field`: integer reduced mod P.
    pub fn salt_field(salt: &Salt) -> Fr {
        Fr::from_be_bytes_mod_order(&salt.0)
    }
}

/// Parses a decimal USDC amount string (up to 6dp) into integer micro-units.
/// Returns `BadInput` for non-positive, malformed, or over-precision values.
pub fn parse_usdc_micros(amount: &str) -> Result<u128, AppError> {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    let dec = Decimal::from_str(amount)
        .map_err(|_| AppError::BadInput(format!("usdcAmount is not a valid decimal: {amount}")))?;
    if dec.scale() > 6 {
        return Err(AppError::BadInput(
            "usdcAmount must have at most 6 decimal places".into(),
        ));
    }
    if dec <= Decimal::ZERO {
        return Err(AppError::BadInput("usdcAmount must be > 0".into()));
    }
    let micros = dec * Decimal::from(1_000_000u64);
    let micros = micros
        .round()
        .to_string()
        .parse::<u128>()
        .map_err(|_| AppError::BadInput("usdcAmount out of range".into()))?;
    Ok(micros)
}

/// Formats integer micro-units back into a 6dp decimal string.
pub fn format_usdc_micros(micros: u128) -> String {
    use rust_decimal::Decimal;
    let dec = Decimal::from(micros) / Decimal::from(1_000_000u64);
    dec.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_field_is_deterministic() {
        assert_eq!(
            FieldCodec::ticker_field("MKT-A").unwrap(),
            FieldCodec::ticker_field("MKT-A").unwrap()
        );
        assert_ne!(
            FieldCodec::ticker_field("MKT-A").unwrap(),
            FieldCodec::ticker_field("MKT-B").unwrap()
        );
    }

    #[test]
    fn side_field_matches_spec_convention() {
        assert_eq!(FieldCodec::side_field(Side::Yes), Fr::from(1u64));
        assert_eq!(FieldCodec::side_field(Side::No), Fr::from(0u64));
    }

    #[test]
    fn parse_usdc_micros_roundtrip() {
        assert_eq!(parse_usdc_micros("10.00").unwrap(), 10_000_000);
        assert_eq!(parse_usdc_micros("0.000001").unwrap(), 1);
        assert!(parse_usdc_micros("0").is_err());
        assert!(parse_usdc_micros("-1").is_err());
        assert!(parse_usdc_micros("1.0000001").is_err());
    }

    #[test]
    fn address_field_rejects_bad_base58() {
        assert!(FieldCodec::address_field("not-base-58-0OIl").is_err());
    }
}
