use async_trait::async_trait;
use valuation_core::{
    stats, CalculatedData, MarketCapTier, ModelId, ValuationContext, ValuationError,
    ValuationModel, ValuationResult,
};

use super::{approximate_historical_roe, pct, require_price};

const MIN_NAV_MULTIPLE: f64 = 0.8;
const ROE_YEARS: usize = 3;

fn market_position_base(tier: MarketCapTier) -> f64 {
    match tier {
        MarketCapTier::Mega => 1.40,
        MarketCapTier::Large => 1.20,
        MarketCapTier::Mid => 1.05,
        MarketCapTier::Small => 0.95,
    }
}

/// Premium for the quality of the asset book, keyed to ROE in percentage points.
fn asset_quality_premium(roe: f64) -> f64 {
    if roe > 18.0 {
        0.15
    } else if roe > 14.0 {
        0.10
    } else if roe > 10.0 {
        0.05
    } else if roe > 6.0 {
        0.0
    } else {
        -0.10
    }
}

fn pipeline_premium(tier: MarketCapTier) -> f64 {
    if tier.is_large_cap() {
        0.10
    } else {
        0.05
    }
}

fn location_premium(tier: MarketCapTier) -> f64 {
    if tier.is_large_cap() {
        0.08
    } else {
        0.03
    }
}

/// Developer valued as a multiple of book NAV.
pub struct RealEstateNavModel;

impl RealEstateNavModel {
    pub fn new() -> Self {
        Self
    }

    /// ROE implied by PB / PE, else the historical approximation.
    fn roe(ctx: &ValuationContext<'_>, bvps: f64) -> Option<f64> {
        match (ctx.market.pb_ratio, ctx.market.pe_ratio) {
            (Some(pb), Some(pe)) if pb > 0.0 && pe > 0.0 => Some(pb / pe * 100.0),
            _ => stats::mean(&approximate_historical_roe(ctx.financials, bvps, ROE_YEARS)),
        }
    }
}

impl Default for RealEstateNavModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValuationModel for RealEstateNavModel {
    fn id(&self) -> ModelId {
        ModelId::RealEstateNav
    }

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError> {
        let price = require_price(ctx)?;
        let bvps = ctx.market.book_value_per_share().ok_or_else(|| {
            ValuationError::CalculationError(format!(
                "{}: PB ratio must be positive to derive NAV",
                ctx.ticker
            ))
        })?;
        let tier = MarketCapTier::from_market_cap(ctx.market.market_cap);
        let roe = Self::roe(ctx, bvps);

        let base = market_position_base(tier);
        let asset = roe.map_or(0.0, asset_quality_premium);
        let pipeline = pipeline_premium(tier);
        let location = location_premium(tier);
        let multiple = (base + asset + pipeline + location).max(MIN_NAV_MULTIPLE);
        let fair_value = bvps * multiple;

        let mut confidence: f64 = 0.70;
        if tier.is_large_cap() {
            confidence += 0.05;
        }
        if roe.is_some_and(|r| (10.0..=25.0).contains(&r)) {
            confidence += 0.05;
        }
        if ctx.market.pb_ratio.is_some_and(|pb| (0.5..=5.0).contains(&pb)) {
            confidence += 0.05;
        }

        let mut reasoning = vec![
            format!("Book NAV per share ₹{bvps:.2} (price / PB)"),
            format!("{} market position base {base:.2}x", tier.label()),
        ];
        match roe {
            Some(r) => reasoning.push(format!(
                "Asset quality premium {asset:+.2}x for {} ROE",
                pct(r)
            )),
            None => reasoning.push("ROE unavailable; no asset quality premium".to_string()),
        }
        reasoning.push(format!(
            "Pipeline {pipeline:+.2}x, location {location:+.2}x; NAV multiple {multiple:.2}x"
        ));

        tracing::debug!(ticker = %ctx.ticker, bvps, multiple, fair_value, "Real estate NAV");

        let mut result = ValuationResult::new(
            self.id(),
            "NAV (Real Estate)",
            fair_value,
            price,
            confidence.min(0.85),
        )
        .with_assumption("book_value_per_share", format!("₹{bvps:.2}"))
        .with_assumption("nav_multiple", format!("{multiple:.2}x"))
        .with_assumption("roe", roe.map_or_else(|| "n/a".to_string(), pct))
        .with_reasoning(reasoning);
        result.calculated_data = Some(CalculatedData {
            book_value_per_share: Some(bvps),
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
    use valuation_core::Sector;

    #[tokio::test]
    async fn test_large_developer() {
        // PB 2.5 / PE 12.5 => ROE 20%
        let data = fixtures::financials(vec![1.0e11; 3], vec![1.0e10; 3], 1.0e9);
        let market = fixtures::market(500.0, 5.0e11, Some(12.5), Some(2.5));
        let a = fixtures::assumptions(Sector::RealEstate);
        let ctx = ValuationContext {
            ticker: "DEVCO",
            sector: Sector::RealEstate,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = RealEstateNavModel::new().value(&ctx).await.unwrap();
        // 1.20 + 0.15 + 0.10 + 0.08
        let multiple = result.calculated_data.as_ref().unwrap().applied_multiple.unwrap();
        assert!((multiple - 1.53).abs() < 1e-9);
        assert!((result.fair_value - 200.0 * 1.53).abs() < 1e-6);
        assert!((result.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_multiple_floor() {
        // ROE from history: 1e6 / (1e8 × 50) => 0.02%
        let data = fixtures::financials(vec![1.0e9; 3], vec![1.0e6; 3], 1.0e8);
        let market = fixtures::market(40.0, 4.0e9, None, Some(0.8));
        let a = fixtures::assumptions(Sector::RealEstate);
        let ctx = ValuationContext {
            ticker: "SMALLDEV",
            sector: Sector::RealEstate,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = RealEstateNavModel::new().value(&ctx).await.unwrap();
        // 0.95 − 0.10 + 0.05 + 0.03 = 0.93, above the floor
        let multiple = result.calculated_data.unwrap().applied_multiple.unwrap();
        assert!(multiple >= MIN_NAV_MULTIPLE);
        assert!((multiple - 0.93).abs() < 1e-9);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_pb_fails() {
        let data = fixtures::financials(vec![1.0e9; 3], vec![1.0e8; 3], 1.0e8);
        let market = fixtures::market(40.0, 4.0e9, Some(10.0), None);
        let a = fixtures::assumptions(Sector::RealEstate);
        let ctx = ValuationContext {
            ticker: "NOPB",
            sector: Sector::RealEstate,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        assert!(RealEstateNavModel::new().value(&ctx).await.is_err());
    }
}
