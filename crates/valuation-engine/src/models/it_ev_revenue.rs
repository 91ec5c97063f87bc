use std::sync::Arc;

use async_trait::async_trait;
use valuation_core::{
    stats, CalculatedData, FinancialDataProvider, MarketCapTier, ModelId, ValuationContext,
    ValuationError, ValuationModel, ValuationResult,
};

use super::{pct, require_revenue, require_shares};
use crate::peers::{MultipleSource, PeerMultipleResolver};
use crate::tables::it_peers;

const CAGR_YEARS: usize = 3;
const MIN_MARGIN_PROXY: f64 = 0.10;
const MAX_MARGIN_PROXY: f64 = 0.40;
const DEFAULT_MARGIN_PROXY: f64 = 0.20;
const QUALITY_DISCOUNT_MARKET_CAP: f64 = 5.0e10;
const QUALITY_DISCOUNT: f64 = 0.5;
pub const MIN_MULTIPLE: f64 = 2.0;

pub fn growth_premium(cagr_pct: f64) -> f64 {
    if cagr_pct > 20.0 {
        1.5
    } else if cagr_pct > 15.0 {
        1.0
    } else if cagr_pct > 10.0 {
        0.5
    } else if cagr_pct > 5.0 {
        0.2
    } else {
        -0.3
    }
}

pub fn margin_premium(margin_pct: f64) -> f64 {
    if margin_pct > 30.0 {
        1.2
    } else if margin_pct > 26.0 {
        0.8
    } else if margin_pct > 22.0 {
        0.4
    } else if margin_pct > 18.0 {
        0.0
    } else {
        -0.5
    }
}

/// Sum the adjustments onto the base multiple and apply the floor.
pub fn final_multiple(base: f64, cagr_pct: f64, margin_pct: f64, market_cap: Option<f64>) -> f64 {
    let mut multiple = base + growth_premium(cagr_pct) + margin_premium(margin_pct);
    if market_cap.is_some_and(|m| m < QUALITY_DISCOUNT_MARKET_CAP) {
        multiple -= QUALITY_DISCOUNT;
    }
    multiple.max(MIN_MULTIPLE)
}

/// EV/Revenue valuation for IT services, anchored on a live peer multiple.
pub struct ItEvRevenueModel {
    peers: PeerMultipleResolver,
}

impl ItEvRevenueModel {
    pub fn new(provider: Arc<dyn FinancialDataProvider>) -> Self {
        Self {
            peers: PeerMultipleResolver::new(provider),
        }
    }

    /// Average of `NI / (1 − tax) / revenue` over years inside the plausible
    /// band, as a fraction.
    fn margin_proxy(ctx: &ValuationContext<'_>) -> Option<f64> {
        let tax = ctx.assumptions.tax_rate / 100.0;
        if tax >= 1.0 {
            return None;
        }
        let proxies: Vec<f64> = ctx
            .financials
            .revenue
            .iter()
            .zip(ctx.financials.net_income.iter())
            .take(CAGR_YEARS)
            .filter(|(rev, _)| **rev > 0.0)
            .map(|(rev, ni)| ni / (1.0 - tax) / rev)
            .filter(|m| (MIN_MARGIN_PROXY..=MAX_MARGIN_PROXY).contains(m))
            .collect();
        stats::mean(&proxies)
    }
}

#[async_trait]
impl ValuationModel for ItEvRevenueModel {
    fn id(&self) -> ModelId {
        ModelId::ItEvRevenue
    }

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError> {
        let revenue = require_revenue(ctx)?;
        let shares = require_shares(ctx)?;
        let tier = MarketCapTier::from_market_cap(ctx.market.market_cap);
        let mut reasoning = Vec::new();

        let cagr = match ctx.financials.revenue_cagr(CAGR_YEARS) {
            Some(g) => g,
            None => {
                reasoning.push(
                    "Insufficient revenue history for CAGR; assuming flat revenue".to_string(),
                );
                0.0
            }
        };
        let (margin, margin_from_history) = match Self::margin_proxy(ctx) {
            Some(m) => (m, true),
            None => {
                reasoning.push(format!(
                    "No year with margin proxy inside {}–{}; using {}",
                    pct(MIN_MARGIN_PROXY * 100.0),
                    pct(MAX_MARGIN_PROXY * 100.0),
                    pct(DEFAULT_MARGIN_PROXY * 100.0)
                ));
                (DEFAULT_MARGIN_PROXY, false)
            }
        };

        let peer = self.peers.resolve(ctx.ticker, tier).await;
        let multiple = final_multiple(
            peer.multiple,
            cagr * 100.0,
            margin * 100.0,
            ctx.market.market_cap,
        );

        let forward_revenue = revenue * (1.0 + cagr);
        let enterprise_value = forward_revenue * multiple;
        let net_cash = revenue * it_peers::net_cash_pct_of_revenue(tier);
        let equity_value = enterprise_value + net_cash;
        let fair_value = equity_value / shares;

        match &peer.source {
            MultipleSource::Peers { used } => reasoning.push(format!(
                "Base EV/Revenue {:.2}x from peers {} ({})",
                peer.multiple,
                used.join(", "),
                it_peers::band_label(tier)
            )),
            MultipleSource::StaticFallback { reason } => reasoning.push(format!(
                "Base EV/Revenue {:.2}x, {} band constant ({reason})",
                peer.multiple,
                it_peers::band_label(tier)
            )),
        }
        reasoning.push(format!(
            "Growth premium {:+.1} for {} CAGR, margin premium {:+.1} for {} margin",
            growth_premium(cagr * 100.0),
            pct(cagr * 100.0),
            margin_premium(margin * 100.0),
            pct(margin * 100.0)
        ));
        if ctx.market.market_cap.is_some_and(|m| m < QUALITY_DISCOUNT_MARKET_CAP) {
            reasoning.push(format!(
                "Quality discount −{QUALITY_DISCOUNT:.1}x for sub-₹5e10 market cap"
            ));
        }
        reasoning.push(format!(
            "EV = forward revenue ₹{forward_revenue:.2e} × {multiple:.2}x; \
             net cash estimated at {} of revenue",
            pct(it_peers::net_cash_pct_of_revenue(tier) * 100.0)
        ));

        let mut confidence: f64 = 0.60;
        if peer.is_peer_derived() {
            confidence += 0.10;
        }
        if margin_from_history {
            confidence += 0.05;
        }

        tracing::debug!(
            ticker = %ctx.ticker,
            base = peer.multiple,
            multiple,
            fair_value,
            "IT EV/Revenue"
        );

        let method = "EV/Revenue (IT Services)";
        let mut result = ValuationResult::new(
            self.id(),
            method,
            fair_value,
            ctx.current_price(),
            confidence.min(0.80),
        )
        .with_assumption("revenue_cagr", pct(cagr * 100.0))
        .with_assumption("ebitda_margin_proxy", pct(margin * 100.0))
        .with_assumption("base_multiple", format!("{:.2}x", peer.multiple))
        .with_assumption("applied_multiple", format!("{multiple:.2}x"))
        .with_assumption("peer_band", it_peers::band_label(tier))
        .with_reasoning(reasoning);
        result.calculated_data = Some(CalculatedData {
            enterprise_value: Some(enterprise_value),
            equity_value: Some(equity_value),
            net_debt: Some(-net_cash),
            applied_multiple: Some(multiple),
            ..Default::default()
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use crate::peers::tests::CannedPeers;
    use std::collections::HashMap;
    use valuation_core::Sector;

    fn failing_peers() -> Arc<dyn FinancialDataProvider> {
        Arc::new(CannedPeers { data: HashMap::new() })
    }

    #[test]
    fn test_multiple_never_below_floor() {
        // Worst case: smallest base, negative growth and margin premia, discount
        assert_eq!(final_multiple(2.0, -10.0, 5.0, Some(1.0e9)), MIN_MULTIPLE);
        assert_eq!(final_multiple(0.0, 0.0, 0.0, Some(0.0)), MIN_MULTIPLE);
        assert!((final_multiple(6.5, 25.0, 35.0, None) - 9.2).abs() < 1e-9);
    }

    #[test]
    fn test_premium_buckets() {
        assert_eq!(growth_premium(20.5), 1.5);
        assert_eq!(growth_premium(15.0), 0.5);
        assert_eq!(growth_premium(5.0), -0.3);
        assert_eq!(margin_premium(26.5), 0.8);
        assert_eq!(margin_premium(18.0), -0.5);
    }

    #[tokio::test]
    async fn test_tier_one_scenario() {
        let data = fixtures::financials(vec![250e9, 230e9, 210e9], vec![50e9, 46e9, 42e9], 3.7e9);
        let market = fixtures::market(3500.0, 1.295e12, Some(28.0), Some(9.0));
        let a = fixtures::assumptions(Sector::It);
        let ctx = ValuationContext {
            ticker: "ITCO",
            sector: Sector::It,
            financials: &data,
            market: &market,
            assumptions: &a,
        };

        let result = ItEvRevenueModel::new(failing_peers()).value(&ctx).await.unwrap();
        assert_eq!(result.assumptions["base_multiple"], "6.50x");
        assert_eq!(result.assumptions["peer_band"], "Tier-1 Leader");
        let cagr = data.revenue_cagr(3).unwrap();
        assert!(cagr > 0.09 && cagr < 0.10);
        assert!(result.fair_value.is_finite() && result.fair_value > 0.0);
        let expected_upside = (result.fair_value - 3500.0) / 3500.0 * 100.0;
        assert!((result.upside_pct - expected_upside).abs() < 1e-9);
        assert!((result.confidence - 0.65).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_peer_multiple_used_when_available() {
        let mut peers = HashMap::new();
        peers.insert("TCS".to_string(), (1.5e13, 2.5e12));
        peers.insert("INFY".to_string(), (7.0e12, 1.4e12));
        let provider: Arc<dyn FinancialDataProvider> = Arc::new(CannedPeers { data: peers });

        let data = fixtures::financials(vec![250e9, 230e9, 210e9], vec![50e9, 46e9, 42e9], 3.7e9);
        let market = fixtures::market(3500.0, 1.295e12, None, None);
        let a = fixtures::assumptions(Sector::It);
        let ctx = ValuationContext {
            ticker: "ITCO",
            sector: Sector::It,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = ItEvRevenueModel::new(provider).value(&ctx).await.unwrap();
        assert_eq!(result.assumptions["base_multiple"], "5.50x");
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_small_loss_maker_takes_every_discount() {
        let data = fixtures::financials(vec![1.0e9, 1.1e9, 1.2e9], vec![-1.0e8; 3], 1.0e7);
        let market = fixtures::market(50.0, 5.0e8, None, None);
        let a = fixtures::assumptions(Sector::It);
        let ctx = ValuationContext {
            ticker: "TINYSOFT",
            sector: Sector::It,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = ItEvRevenueModel::new(failing_peers()).value(&ctx).await.unwrap();
        // 3.0 base − 0.3 growth + 0.0 default margin − 0.5 quality
        let applied = result.calculated_data.unwrap().applied_multiple.unwrap();
        assert!((applied - 2.2).abs() < 1e-9);
        assert!(result.reasoning.iter().any(|r| r.contains("Quality discount")));
    }
}
