//! Pro-rata allocation of a venue fill back across the funded orders that
//! paid into it, and across each order's declared destinations (spec §4.8).

use rust_decimal::Decimal;

use crate::types::{DistributionEntry, OrderId};

/// One funded order's contribution to a batch execution.
#[derive(Debug, Clone)]
pub struct FundedOrderInput {
    pub order_id: OrderId,
    pub usdc_amount_micros: u128,
    pub distribution: Vec<DistributionEntry>,
}

/// The venue's report for the aggregate trade a batch submitted.
#[derive(Debug, Clone, Copy)]
pub struct VenueFill {
    pub usdc_spent_micros: u128,
    pub shares_received: u128,
}

#[derive(Debug, Clone)]
pub struct DestAllocation {
    pub address: String,
    pub shares: u128,
}

#[derive(Debug, Clone)]
pub struct OrderAllocation {
    pub order_id: OrderId,
    pub effective_usdc_spent_micros: u128,
    pub refund_micros: u128,
    pub shares: u128,
    pub destinations: Vec<DestAllocation>,
}

pub struct DistributionPlanner;

impl DistributionPlanner {
    /// `T = Σ funded.usdcAmount`; each order gets `p_o = o.amount / T` of the
    /// fill. Refund is computed by subtraction so
    /// `effectiveSpent_o + refund_o == o.amount` holds exactly per order,
    /// which is what keeps the batch-level USDC-conservation invariant true
    /// without any residual bookkeeping across orders.
    pub fn plan(funded: &[FundedOrderInput], fill: VenueFill) -> Vec<OrderAllocation> {
        let total: u128 = funded.iter().map(|o| o.usdc_amount_micros).sum();
        if total == 0 {
            return Vec::new();
        }

        funded
            .iter()
            .map(|order| {
                let effective_spent = proportion(order.usdc_amount_micros, fill.usdc_spent_micros, total);
                let refund = order.usdc_amount_micros - effective_spent;
                let shares = proportion(order.usdc_amount_micros, fill.shares_received, total);
                let destinations = Self::split_destinations(shares, &order.distribution);

                OrderAllocation {
                    order_id: order.order_id,
                    effective_usdc_spent_micros: effective_spent,
                    refund_micros: refund,
                    shares,
                    destinations,
                }
            })
            .collect()
    }

    /// Splits `shares` across an order's destinations by declared bps. The
    /// last destination absorbs whatever truncation left over so the
    /// per-order sum always equals `shares` exactly (spec §4.8 "no
    /// share-dust loss").
    fn split_destinations(shares: u128, distribution: &[DistributionEntry]) -> Vec<DestAllocation> {
        let mut out = Vec::with_capacity(distribution.len());
        let mut allocated = 0u128;
        for entry in &distribution[..distribution.len().saturating_sub(1)] {
            let dest_shares = proportion(entry.bps as u128, shares, 10_000);
            allocated += dest_shares;
            out.push(DestAllocation {
                address: entry.address.clone(),
                shares: dest_shares,
            });
        }
        if let Some(last) = distribution.last() {
            out.push(DestAllocation {
                address: last.address.clone(),
                shares: shares - allocated,
            });
        }
        out
    }
}

/// `floor(numerator * part / denominator)` computed with enough precision to
/// avoid `u128` multiplication overflow for realistic USDC/share magnitudes.
fn proportion(part: u128, numerator: u128, denominator: u128) -> u128 {
    let ratio = Decimal::from(part) * Decimal::from(numerator) / Decimal::from(denominator);
    ratio.trunc().try_into().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: OrderId, amount: u128, dist: Vec<(&str, u32)>) -> FundedOrderInput {
        FundedOrderInput {
            order_id: id,
            usdc_amount_micros: amount,
            distribution: dist
                .into_iter()
                .map(|(addr, bps)| DistributionEntry {
                    address: addr.to_string(),
                    bps,
                })
                .collect(),
        }
    }

    #[test]
    fn single_order_full_fill() {
        let a = OrderId::new();
        let funded = vec![order(a, 10_000_000, vec![("addrX", 10000)])];
        let fill = VenueFill {
            usdc_spent_micros: 10_000_000,
            shares_received: 20_000_000,
        };
        let alloc = DistributionPlanner::plan(&funded, fill);
        assert_eq!(alloc.len(), 1);
        assert_eq!(alloc[0].shares, 20_000_000);
        assert_eq!(alloc[0].refund_micros, 0);
        assert_eq!(alloc[0].destinations[0].shares, 20_000_000);
    }

    #[test]
    fn three_orders_partial_fill() {
        let (a, b, c) = (OrderId::new(), OrderId::new(), OrderId::new());
        let funded = vec![
            order(a, 20_000_000, vec![("A", 10000)]),
            order(b, 30_000_000, vec![("B", 10000)]),
            order(c, 50_000_000, vec![("C", 10000)]),
        ];
        let fill = VenueFill {
            usdc_spent_micros: 80_000_000,
            shares_received: 120_000_000,
        };
        let alloc = DistributionPlanner::plan(&funded, fill);
        assert_eq!(alloc[0].shares, 24_000_000);
        assert_eq!(alloc[0].refund_micros, 4_000_000);
        assert_eq!(alloc[1].shares, 36_000_000);
        assert_eq!(alloc[1].refund_micros, 6_000_000);
        assert_eq!(alloc[2].shares, 60_000_000);
        assert_eq!(alloc[2].refund_micros, 10_000_000);
    }

    #[test]
    fn multi_destination_split() {
        let a = OrderId::new();
        let funded = vec![order(
            a,
            100_000_000,
            vec![("D1", 5000), ("D2", 3000), ("D3", 2000)],
        )];
        let fill = VenueFill {
            usdc_spent_micros: 100_000_000,
            shares_received: 200_000_000,
        };
        let alloc = DistributionPlanner::plan(&funded, fill);
        let dests = &alloc[0].destinations;
        assert_eq!(dests[0].shares, 100_000_000);
        assert_eq!(dests[1].shares, 60_000_000);
        assert_eq!(dests[2].shares, 40_000_000);
    }

    #[test]
    fn zero_total_yields_no_allocations() {
        let alloc = DistributionPlanner::plan(
            &[],
            VenueFill {
                usdc_spent_micros: 0,
                shares_received: 0,
            },
        );
        assert!(alloc.is_empty());
    }
}
