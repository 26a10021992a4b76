//! Pluggable aggregate-trade execution (spec §4.9). The relay never talks to
//! a market venue directly; it calls through this trait so the matching
//! engine stays testable without a live venue connection.

use serde::{Deserialize, Serialize};

use crate::types::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub title: String,
    pub yes_price: String,
    pub no_price: String,
    pub yes_mint: String,
    pub no_mint: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub market_id: String,
    pub side: Side,
    pub usdc_amount_micros: u128,
    pub slippage_bps: u32,
    pub output_mint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub usdc_spent_micros: u128,
    pub shares_received: u128,
    pub venue_tx: String,
    pub average_price: String,
    pub fill_percentage: f64,
    pub partial_fill: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueFailureKind {
    MarketUnavailable,
    InsufficientLiquidity,
    Timeout,
}

impl std::fmt::Display for VenueFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueFailureKind::MarketUnavailable => write!(f, "market_unavailable"),
            VenueFailureKind::InsufficientLiquidity => write!(f, "insufficient_liquidity"),
            VenueFailureKind::Timeout => write!(f, "venue_timeout"),
        }
    }
}

/// Best-effort fill up to the requested amount at the given slippage bound.
/// Implementations must confirm on-chain before resolving `Ok`.
pub trait VenueExecutor: Send + Sync + 'static {
    fn get_market(
        &self,
        market_id: &str,
    ) -> impl std::future::Future<Output = Result<MarketInfo, VenueFailureKind>> + Send;

    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> impl std::future::Future<Output = Result<ExecutionReceipt, VenueFailureKind>> + Send;
}

/// Deterministic in-process venue used until a real adapter is wired in.
/// Always fills completely at a fixed nominal price so batch execution can
/// be exercised end-to-end without network access.
pub struct MockVenue {
    pub shares_per_usdc: f64,
}

impl Default for MockVenue {
    fn default() -> Self {
        Self { shares_per_usdc: 2.0 }
    }
}

impl VenueExecutor for MockVenue {
    async fn get_market(&self, market_id: &str) -> Result<MarketInfo, VenueFailureKind> {
        Ok(MarketInfo {
            title: market_id.to_string(),
            yes_price: "0.50".into(),
            no_price: "0.50".into(),
            yes_mint: format!("{market_id}-YES"),
            no_mint: format!("{market_id}-NO"),
            status: "active".into(),
        })
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReceipt, VenueFailureKind> {
        if request.usdc_amount_micros == 0 {
            return Err(VenueFailureKind::InsufficientLiquidity);
        }
        let shares_received =
            ((request.usdc_amount_micros as f64) * self.shares_per_usdc).round() as u128;
        Ok(ExecutionReceipt {
            usdc_spent_micros: request.usdc_amount_micros,
            shares_received,
            venue_tx: format!("mock-venue-tx-{}", request.market_id),
            average_price: format!("{:.4}", 1.0 / self.shares_per_usdc),
            fill_percentage: 100.0,
            partial_fill: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_venue_fills_completely() {
        let venue = MockVenue::default();
        let receipt = venue
            .execute(ExecutionRequest {
                market_id: "MKT-A".into(),
                side: Side::Yes,
                usdc_amount_micros: 10_000_000,
                slippage_bps: 50,
                output_mint: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.usdc_spent_micros, 10_000_000);
        assert_eq!(receipt.shares_received, 20_000_000);
        assert!(!receipt.partial_fill);
    }

    #[tokio::test]
    async fn mock_venue_rejects_zero_amount() {
        let venue = MockVenue::default();
        let err = venue
            .execute(ExecutionRequest {
                market_id: "MKT-A".into(),
                side: Side::Yes,
                usdc_amount_micros: 0,
                slippage_bps: 50,
                output_mint: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, VenueFailureKind::InsufficientLiquidity);
    }
}
