use async_trait::async_trait;
use valuation_core::{
    stats, CalculatedData, MarketCapTier, ModelId, Sector, ValuationContext, ValuationError,
    ValuationModel, ValuationResult,
};

use super::{pct, require_price};
use crate::tables::{sector_tables, GDP_GROWTH};

const MAX_APPLIED_GROWTH: f64 = 15.0;
/// Single-year EPS swing treated as an accounting anomaly, fraction.
const MAX_CREDIBLE_SWING: f64 = 0.50;

/// EPS per year, most-recent-first, for years with positive share counts.
fn eps_series(ctx: &ValuationContext<'_>) -> Vec<f64> {
    ctx.financials
        .net_income
        .iter()
        .zip(ctx.financials.shares_outstanding.iter())
        .filter(|(ni, shares)| ni.is_finite() && **shares > 0.0)
        .map(|(ni, shares)| ni / shares)
        .collect()
}

/// EPS growth in percentage points: CAGR when both endpoints are positive,
/// otherwise the mean year-over-year change.
fn historical_growth(eps: &[f64]) -> Option<f64> {
    let n = eps.len();
    if n < 2 {
        return None;
    }
    stats::cagr(eps[0], eps[n - 1], n - 1)
        .or_else(|| stats::mean(&stats::yoy_changes(eps)))
        .map(|g| g * 100.0)
}

/// Growth substituted for stable large caps whose history looks anomalous.
pub fn stable_sector_growth(sector: Sector) -> f64 {
    GDP_GROWTH + sector_tables().profile(sector).growth_premium
}

/// Earnings-multiple valuation against a size-adjusted sector PE.
pub struct PeMultipleModel;

impl PeMultipleModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PeMultipleModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValuationModel for PeMultipleModel {
    fn id(&self) -> ModelId {
        ModelId::PeMultiple
    }

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError> {
        let price = require_price(ctx)?;
        let tier = MarketCapTier::from_market_cap(ctx.market.market_cap);
        let tables = sector_tables();
        let profile = tables.profile(ctx.sector);

        let eps = eps_series(ctx);
        let current_eps = eps
            .first()
            .copied()
            .or_else(|| ctx.market.pe_ratio.filter(|pe| *pe > 0.0).map(|pe| price / pe))
            .unwrap_or(0.0);
        if current_eps <= 0.0 {
            return Err(ValuationError::CalculationError(format!(
                "{}: PE valuation requires positive earnings per share",
                ctx.ticker
            )));
        }

        let mut reasoning = vec![format!("Current EPS ₹{current_eps:.2}")];
        let growth = historical_growth(&eps);
        let swings = stats::yoy_changes(&eps);
        let anomalous = growth.map_or(true, |g| g < 0.0)
            || swings.iter().any(|s| s.abs() > MAX_CREDIBLE_SWING);
        let guarded = tier.is_large_cap() && ctx.sector.is_historically_stable() && anomalous;

        let validated = match growth {
            Some(g) if !guarded => {
                reasoning.push(format!("Historical EPS growth {}", pct(g)));
                g
            }
            _ => {
                let substitute = stable_sector_growth(ctx.sector);
                let why = match growth {
                    Some(g) if g < 0.0 => format!("negative EPS growth {}", pct(g)),
                    Some(_) => format!(
                        "a single-year EPS swing above {:.0}%",
                        MAX_CREDIBLE_SWING * 100.0
                    ),
                    None => "insufficient EPS history".to_string(),
                };
                reasoning.push(format!(
                    "Discarded historical growth ({why}); using GDP {} + {} sector premium",
                    pct(GDP_GROWTH),
                    pct(profile.growth_premium)
                ));
                substitute
            }
        };
        let applied_growth = validated.min(MAX_APPLIED_GROWTH);
        if applied_growth < validated {
            reasoning.push(format!("Growth capped at {}", pct(MAX_APPLIED_GROWTH)));
        }

        let peer_pe = profile.base_pe * tables.pe_size_premium(tier) * profile.pe_adjustment;
        let projected_eps = current_eps * (1.0 + applied_growth / 100.0);
        let fair_value = projected_eps * peer_pe;
        reasoning.push(format!(
            "Peer PE {peer_pe:.1}x = {} base {:.1}x × {:.2} size × {:.2} sector; \
             forward EPS ₹{projected_eps:.2}",
            ctx.sector,
            profile.base_pe,
            tables.pe_size_premium(tier),
            profile.pe_adjustment
        ));

        let mut confidence: f64 = 0.65;
        if growth.is_none() || guarded {
            confidence -= 0.10;
        }
        if eps.len() >= 4 {
            confidence += 0.05;
        }

        tracing::debug!(
            ticker = %ctx.ticker,
            current_eps,
            applied_growth,
            peer_pe,
            fair_value,
            "PE multiple"
        );

        let mut result =
            ValuationResult::new(self.id(), "PE Multiple", fair_value, price, confidence)
                .with_assumption("current_eps", format!("₹{current_eps:.2}"))
                .with_assumption("eps_growth", pct(applied_growth))
                .with_assumption("peer_pe", format!("{peer_pe:.1}x"))
                .with_reasoning(reasoning);
        result.calculated_data = Some(CalculatedData {
            applied_multiple: Some(peer_pe),
            ..Default::default()
        });
        Ok(result)
    }
}
