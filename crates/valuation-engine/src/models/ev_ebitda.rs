use async_trait::async_trait;
use valuation_core::{
    CalculatedData, FinancialDataSet, MarketCapTier, ModelId, ValuationContext, ValuationError,
    ValuationModel, ValuationResult,
};

use super::fcff_dcf::capped_net_debt;
use super::{pct, require_shares};
use crate::tables::sector_tables;

/// Latest EBITDA and whether it was reported or reconstructed from
/// `NI / (1 − tax) + D&A`.
fn latest_ebitda(ctx: &ValuationContext<'_>) -> Option<(f64, bool)> {
    let f = ctx.financials;
    if let Some(ebitda) = FinancialDataSet::at(f.ebitda.as_ref(), 0) {
        return Some((ebitda, true));
    }
    let tax = ctx.assumptions.tax_rate / 100.0;
    let net_income = f.net_income.first().copied().filter(|v| v.is_finite())?;
    if tax >= 1.0 {
        return None;
    }
    let depreciation = FinancialDataSet::at(f.depreciation_amortization.as_ref(), 0)
        .map(f64::abs)
        .or_else(|| f.latest_revenue().map(|r| r * ctx.assumptions.depreciation_percentage / 100.0))
        .unwrap_or(0.0);
    Some((net_income / (1.0 - tax) + depreciation, false))
}

/// Sector EV/EBITDA comparison, available for every sector.
pub struct EvEbitdaModel;

impl EvEbitdaModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EvEbitdaModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValuationModel for EvEbitdaModel {
    fn id(&self) -> ModelId {
        ModelId::EvEbitda
    }

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError> {
        let shares = require_shares(ctx)?;
        let (ebitda, reported) = latest_ebitda(ctx)
            .filter(|(e, _)| *e > 0.0)
            .ok_or_else(|| {
                ValuationError::CalculationError(format!(
                    "{}: EBITDA must be positive",
                    ctx.ticker
                ))
            })?;

        let tables = sector_tables();
        let tier = MarketCapTier::from_market_cap(ctx.market.market_cap);
        let sector_multiple = tables.profile(ctx.sector).ev_ebitda_multiple;
        let multiple = sector_multiple * tables.ev_ebitda_size_premium(tier);

        let enterprise_value = ebitda * multiple;
        let (net_debt, raw_net_debt) =
            capped_net_debt(ctx.financials, enterprise_value, ctx.assumptions.net_debt_percentage);
        let equity_value = enterprise_value - net_debt;
        let fair_value = (equity_value / shares).max(0.0);

        let mut reasoning = vec![
            if reported {
                format!("Latest reported EBITDA ₹{ebitda:.2e}")
            } else {
                format!("EBITDA reconstructed from net income and D&A: ₹{ebitda:.2e}")
            },
            format!(
                "{} multiple {sector_multiple:.1}x × {:.2} ({}) = {multiple:.2}x",
                ctx.sector,
                tables.ev_ebitda_size_premium(tier),
                tier.label()
            ),
        ];
        if net_debt < raw_net_debt {
            reasoning.push(format!(
                "Net debt capped at {} of EV",
                pct(ctx.assumptions.net_debt_percentage)
            ));
        }

        let confidence = if reported { 0.65 } else { 0.55 };
        tracing::debug!(ticker = %ctx.ticker, ebitda, multiple, fair_value, "EV/EBITDA");

        let mut result = ValuationResult::new(
            self.id(),
            "EV/EBITDA",
            fair_value,
            ctx.current_price(),
            confidence,
        )
        .with_assumption("ebitda", format!("₹{ebitda:.2e}"))
        .with_assumption("ev_ebitda_multiple", format!("{multiple:.2}x"))
        .with_assumption("net_debt_percentage", pct(ctx.assumptions.net_debt_percentage))
        .with_reasoning(reasoning);
        result.calculated_data = Some(CalculatedData {
            enterprise_value: Some(enterprise_value),
            equity_value: Some(equity_value),
            net_debt: Some(net_debt),
            raw_net_debt: Some(raw_net_debt),
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
    async fn test_reported_ebitda() {
        let mut data = fixtures::financials(vec![1.0e11], vec![1.0e10], 1.0e9);
        data.ebitda = Some(vec![2.0e10]);
        let market = fixtures::market(200.0, 3.0e11, None, None);
        let a = fixtures::assumptions(Sector::Cement);
        let ctx = ValuationContext {
            ticker: "CEMCO",
            sector: Sector::Cement,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = EvEbitdaModel::new().value(&ctx).await.unwrap();
        // Cement 13x, large-cap premium 1.05; no debt reported
        assert!((result.fair_value - 2.0e10 * 13.0 * 1.05 / 1.0e9).abs() < 1e-6);
        assert_eq!(result.confidence, 0.65);
    }

    #[tokio::test]
    async fn test_proxy_and_capped_debt() {
        let mut data = fixtures::financials(vec![1.0e11], vec![7.5e9], 1.0e9);
        data.total_debt = Some(vec![1.0e13]);
        let market = fixtures::market(100.0, 1.0e11, None, None);
        let a = fixtures::assumptions(Sector::Auto);
        let ctx = ValuationContext {
            ticker: "AUTOCO",
            sector: Sector::Auto,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = EvEbitdaModel::new().value(&ctx).await.unwrap();
        let calc = result.calculated_data.unwrap();
        let ev = calc.enterprise_value.unwrap();
        // 7.5e9 / 0.75 + 4% of revenue
        assert!((ev - (1.0e10 + 4.0e9) * 12.0).abs() < 1.0);
        assert!(calc.net_debt.unwrap() <= a.net_debt_percentage / 100.0 * ev + 1e-6);
        assert!(result.fair_value > 0.0);
    }

    #[tokio::test]
    async fn test_loss_maker_fails() {
        let data = fixtures::financials(vec![1.0e11], vec![-5.0e10], 1.0e9);
        let market = fixtures::market(100.0, 1.0e11, None, None);
        let a = fixtures::assumptions(Sector::Auto);
        let ctx = ValuationContext {
            ticker: "LOSSCO",
            sector: Sector::Auto,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        assert!(EvEbitdaModel::new().value(&ctx).await.unwrap_err().is_calculation_error());
    }
}
