//! Valuation models, one per methodology.

pub mod banking;
pub mod conservative_dcf;
pub mod ev_ebitda;
pub mod fcff_dcf;
pub mod it_ev_revenue;
pub mod pe_multiple;
pub mod real_estate;

pub use banking::BankingExcessReturnsModel;
pub use conservative_dcf::ConservativeDcfModel;
pub use ev_ebitda::EvEbitdaModel;
pub use fcff_dcf::{HistoricalInputs, StandardFcffDcfModel};
pub use it_ev_revenue::ItEvRevenueModel;
pub use pe_multiple::PeMultipleModel;
pub use real_estate::RealEstateNavModel;

use valuation_core::{FinancialDataSet, MarketCapTier, Sector, ValuationContext, ValuationError};

use crate::tables::{sector_tables, EQUITY_RISK_PREMIUM, RISK_FREE_RATE};

pub const MIN_BETA: f64 = 0.5;

pub(crate) fn pct(value: f64) -> String {
    format!("{value:.1}%")
}

pub(crate) fn require_price(ctx: &ValuationContext<'_>) -> Result<f64, ValuationError> {
    ctx.market
        .price()
        .ok_or_else(|| {
            ValuationError::CalculationError(format!("{}: current price unavailable", ctx.ticker))
        })
}

pub(crate) fn require_shares(ctx: &ValuationContext<'_>) -> Result<f64, ValuationError> {
    ctx.financials
        .latest_shares()
        .ok_or_else(|| {
            ValuationError::CalculationError(format!(
                "{}: shares outstanding must be positive",
                ctx.ticker
            ))
        })
}

pub(crate) fn require_revenue(ctx: &ValuationContext<'_>) -> Result<f64, ValuationError> {
    ctx.financials
        .latest_revenue()
        .ok_or_else(|| {
            ValuationError::CalculationError(format!(
                "{}: latest revenue must be positive",
                ctx.ticker
            ))
        })
}

/// CAPM cost of equity with a size-adjusted sector beta. Returns `(beta, Ke)`,
/// Ke in percentage points.
pub fn cost_of_equity(sector: Sector, tier: MarketCapTier) -> (f64, f64) {
    let tables = sector_tables();
    let beta = (tables.profile(sector).base_beta + tables.size_beta_adjustment(tier)).max(MIN_BETA);
    (beta, RISK_FREE_RATE + beta * EQUITY_RISK_PREMIUM)
}

/// Historical ROE per year (percentage points) for up to `years` years,
/// most-recent-first.
///
/// Every year is measured against the *current* book value per share, not the
/// equity that year actually carried. Downstream figures depend on this
/// approximation, so it is kept as-is.
pub fn approximate_historical_roe(
    financials: &FinancialDataSet,
    bvps: f64,
    years: usize,
) -> Vec<f64> {
    if bvps <= 0.0 {
        return Vec::new();
    }
    financials
        .net_income
        .iter()
        .zip(financials.shares_outstanding.iter())
        .take(years)
        .filter(|(ni, shares)| ni.is_finite() && **shares > 0.0)
        .map(|(ni, shares)| ni / (shares * bvps) * 100.0)
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_floor() {
        // FMCG 0.7 base, mega-cap −0.2 => 0.5 exactly
        let (beta, ke) = cost_of_equity(Sector::Fmcg, MarketCapTier::Mega);
        assert!((beta - 0.5).abs() < 1e-9);
        assert!((ke - (7.2 + 0.5 * 8.5)).abs() < 1e-9);
    }

    #[test]
    fn test_small_cap_penalty() {
        let (beta, _) = cost_of_equity(Sector::Metals, MarketCapTier::Small);
        assert!((beta - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_roe_uses_current_bvps_for_every_year() {
        let data = fixtures::financials(vec![1.0; 3], vec![30.0, 20.0, 10.0], 10.0);
        let roe = approximate_historical_roe(&data, 10.0, 3);
        assert_eq!(roe, vec![30.0, 20.0, 10.0]);
    }
}
