//! Off-process proving backend (spec §4.10). The relay only feeds this
//! trait the public inputs and stores whatever comes back — it never
//! inspects proof internals.

use crate::field::Fr;
use crate::types::Side;

#[derive(Debug, Clone)]
pub struct ProofRequest {
    pub root: Fr,
    pub total_in_micros: u128,
    pub total_out_shares: u128,
    pub market_id: String,
    pub side: Side,
    pub commitments: Vec<Fr>,
    pub allocation_shares: Vec<u128>,
}

#[derive(Debug, Clone)]
pub struct ProofReceipt {
    pub proof_blob: String,
    pub public_inputs: Vec<String>,
    pub verified: bool,
}

pub trait ProofGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        request: ProofRequest,
    ) -> impl std::future::Future<Output = Result<ProofReceipt, String>> + Send;
}

/// Deterministic stand-in prover: "proves" by hex-encoding the public
/// inputs and always reports verified. Lets the batch pipeline be exercised
/// without a real proving backend attached.
pub struct MockProver;

impl ProofGenerator for MockProver {
    async fn generate(&self, request: ProofRequest) -> Result<ProofReceipt, String> {
        use ark_ff::{BigInteger, PrimeField};

        let root_hex = format!("0x{}", hex::encode(request.root.into_bigint().to_bytes_be()));
        let public_inputs = vec![
            root_hex.clone(),
            request.total_in_micros.to_string(),
            request.total_out_shares.to_string(),
        ];
        let proof_blob = format!(
            "mock-proof:{}:{}:{}",
            root_hex, request.market_id, request.side
        );
        Ok(ProofReceipt {
            proof_blob,
            public_inputs,
            verified: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_prover_reports_verified() {
        let prover = MockProver;
        let receipt = prover
            .generate(ProofRequest {
                root: Fr::from(42u64),
                total_in_micros: 100,
                total_out_shares: 200,
                market_id: "MKT-A".into(),
                side: Side::Yes,
                commitments: vec![Fr::from(1u64)],
                allocation_shares: vec![200],
            })
            .await
            .unwrap();
        assert!(receipt.verified);
        assert_eq!(receipt.public_inputs[1], "100");
        assert_eq!(receipt.public_inputs[2], "200");
    }
}
