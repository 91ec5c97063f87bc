use async_trait::async_trait;
use valuation_core::{
    stats, CalculatedData, CashFlowProjectionYear, DCFAssumptions, FinancialDataSet, ModelId,
    Sector, ValuationContext, ValuationError, ValuationModel, ValuationResult,
};

use super::{pct, require_revenue, require_shares};
use crate::growth::FadeSchedule;
use crate::tables::sector_tables;

const HISTORY_YEARS: usize = 5;
const MARGIN_YEARS: usize = 3;
pub const MIN_HISTORICAL_GROWTH: f64 = -5.0;
pub const MAX_HISTORICAL_GROWTH: f64 = 15.0;
/// Margins above this are treated as a reporting artefact for FCFF purposes.
pub const MAX_CREDIBLE_EBITDA_MARGIN: f64 = 40.0;

/// Growth and margin derived from history, percentage points.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalInputs {
    pub revenue_cagr: Option<f64>,
    pub ebitda_margin: Option<f64>,
    pub years_available: usize,
    pub notes: Vec<String>,
}

impl HistoricalInputs {
    /// Revenue CAGR over up to five years clamped to [−5%, 15%], and the
    /// three-year average EBITDA margin over years where both figures are
    /// valid. A margin above 40% is replaced by the sector benchmark.
    pub fn derive(financials: &FinancialDataSet, sector: Sector) -> Self {
        let mut notes = Vec::new();

        let revenue_cagr = financials.revenue_cagr(HISTORY_YEARS).map(|g| {
            let raw = g * 100.0;
            let clamped = raw.clamp(MIN_HISTORICAL_GROWTH, MAX_HISTORICAL_GROWTH);
            if (clamped - raw).abs() > f64::EPSILON {
                notes.push(format!("Revenue CAGR {} clamped to {}", pct(raw), pct(clamped)));
            }
            clamped
        });

        let margins: Vec<f64> = (0..financials.revenue.len().min(MARGIN_YEARS))
            .filter_map(|i| {
                let revenue = financials.revenue[i];
                let ebitda = FinancialDataSet::at(financials.ebitda.as_ref(), i)?;
                (revenue.is_finite() && revenue > 0.0).then(|| ebitda / revenue * 100.0)
            })
            .collect();

        let ebitda_margin = match stats::mean(&margins) {
            Some(m) if m > MAX_CREDIBLE_EBITDA_MARGIN => {
                let benchmark = sector_tables().profile(sector).ebitda_margin;
                notes.push(format!(
                    "EBITDA margin {} exceeds {}; using {sector} benchmark {}",
                    pct(m),
                    pct(MAX_CREDIBLE_EBITDA_MARGIN),
                    pct(benchmark)
                ));
                Some(benchmark)
            }
            other => other,
        };

        Self {
            revenue_cagr,
            ebitda_margin,
            years_available: financials.revenue.len().min(HISTORY_YEARS),
            notes,
        }
    }
}

/// Explicit-horizon cash flows plus terminal value.
#[derive(Debug, Clone, PartialEq)]
pub struct FcffProjection {
    pub years: Vec<CashFlowProjectionYear>,
    pub sum_pv: f64,
    pub terminal_value: f64,
    pub pv_terminal: f64,
    pub enterprise_value: f64,
}

impl FcffProjection {
    pub fn terminal_share(&self) -> f64 {
        if self.enterprise_value > 0.0 {
            self.pv_terminal / self.enterprise_value
        } else {
            0.0
        }
    }
}

/// Project FCFF from `base_revenue` under `a`, applying the three-stage fade
/// when the assumptions request normalization.
pub fn project_fcff(
    base_revenue: f64,
    a: &DCFAssumptions,
) -> Result<FcffProjection, ValuationError> {
    if a.wacc <= a.terminal_growth_rate {
        return Err(ValuationError::CalculationError(format!(
            "WACC {} must exceed terminal growth {}",
            pct(a.wacc),
            pct(a.terminal_growth_rate)
        )));
    }
    if a.projection_years == 0 {
        return Err(ValuationError::CalculationError(
            "projection horizon must be at least one year".to_string(),
        ));
    }

    let schedule = FadeSchedule::from_assumptions(a);
    let wacc = a.wacc / 100.0;
    let tax = a.tax_rate / 100.0;
    let mut revenue = base_revenue;
    let mut years = Vec::with_capacity(a.projection_years as usize);

    for year in 1..=a.projection_years {
        let growth = schedule.map_or(a.revenue_growth_rate, |s| s.growth_for_year(year));
        let capex_rate = schedule.map_or(a.capex_percentage, |s| s.capex_for_year(year));

        revenue *= 1.0 + growth / 100.0;
        let ebitda = revenue * a.ebitda_margin / 100.0;
        let depreciation = revenue * a.depreciation_percentage / 100.0;
        let nopat = (ebitda - depreciation) * (1.0 - tax);
        let capex = revenue * capex_rate / 100.0;
        let delta_wc = revenue * growth / 100.0 * a.working_capital_percentage / 100.0;
        let fcff = nopat + depreciation - capex - delta_wc;
        let present_value = fcff / (1.0 + wacc).powi(year as i32);

        years.push(CashFlowProjectionYear {
            year,
            revenue,
            ebitda,
            nopat,
            capex,
            delta_wc,
            depreciation,
            fcff,
            present_value,
            growth_rate: growth,
        });
    }

    let sum_pv: f64 = years.iter().map(|y| y.present_value).sum();
    let last_fcff = years.last().map_or(0.0, |y| y.fcff);
    let g = a.terminal_growth_rate / 100.0;
    let terminal_value = last_fcff * (1.0 + g) / (wacc - g);
    let pv_terminal = terminal_value / (1.0 + wacc).powi(a.projection_years as i32);

    Ok(FcffProjection {
        years,
        sum_pv,
        terminal_value,
        pv_terminal,
        enterprise_value: sum_pv + pv_terminal,
    })
}

/// Net debt used in the equity bridge: reported net debt capped at
/// `net_debt_percentage` of enterprise value. Raw debt feeds often include
/// non-interest-bearing liabilities. Returns `(capped, raw)`.
pub fn capped_net_debt(
    financials: &FinancialDataSet,
    enterprise_value: f64,
    net_debt_percentage: f64,
) -> (f64, f64) {
    let raw = financials.latest_net_debt().unwrap_or(0.0);
    let cap = net_debt_percentage / 100.0 * enterprise_value;
    (raw.min(cap), raw)
}

/// Projection → equity bridge → per-share value, shared by the FCFF models.
pub(crate) fn fcff_valuation(
    ctx: &ValuationContext<'_>,
    model: ModelId,
    method: &str,
    a: &DCFAssumptions,
) -> Result<(ValuationResult, FcffProjection), ValuationError> {
    let base_revenue = require_revenue(ctx)?;
    let shares = require_shares(ctx)?;
    let projection = project_fcff(base_revenue, a)?;

    let (net_debt, raw_net_debt) = capped_net_debt(
        ctx.financials,
        projection.enterprise_value,
        a.net_debt_percentage,
    );
    let equity_value = projection.enterprise_value - net_debt;
    let fair_value = (equity_value / shares).max(0.0);

    let mut reasoning = vec![
        format!(
            "{} years projected from revenue ₹{:.2e} at {} WACC",
            a.projection_years,
            base_revenue,
            pct(a.wacc)
        ),
        format!(
            "Enterprise value ₹{:.2e} ({:.0}% from terminal value)",
            projection.enterprise_value,
            projection.terminal_share() * 100.0
        ),
    ];
    if net_debt < raw_net_debt {
        reasoning.push(format!(
            "Net debt ₹{raw_net_debt:.2e} capped at {} of EV (₹{net_debt:.2e})",
            pct(a.net_debt_percentage)
        ));
    }
    if equity_value < 0.0 {
        reasoning
            .push("Equity value negative after net debt; fair value floored at zero".to_string());
    }

    let mut result = ValuationResult::new(model, method, fair_value, ctx.current_price(), 0.0)
        .with_assumption("revenue_growth_rate", pct(a.revenue_growth_rate))
        .with_assumption("ebitda_margin", pct(a.ebitda_margin))
        .with_assumption("tax_rate", pct(a.tax_rate))
        .with_assumption("wacc", pct(a.wacc))
        .with_assumption("terminal_growth_rate", pct(a.terminal_growth_rate))
        .with_assumption("capex_percentage", pct(a.capex_percentage))
        .with_assumption("working_capital_percentage", pct(a.working_capital_percentage))
        .with_assumption("depreciation_percentage", pct(a.depreciation_percentage))
        .with_assumption("net_debt_percentage", pct(a.net_debt_percentage))
        .with_reasoning(reasoning);
    result.cash_flow_projections = Some(projection.years.clone());
    result.calculated_data = Some(CalculatedData {
        enterprise_value: Some(projection.enterprise_value),
        equity_value: Some(equity_value),
        terminal_value: Some(projection.terminal_value),
        pv_terminal_value: Some(projection.pv_terminal),
        sum_pv_cash_flows: Some(projection.sum_pv),
        net_debt: Some(net_debt),
        raw_net_debt: Some(raw_net_debt),
        ..Default::default()
    });
    Ok((result, projection))
}

/// Unlevered free-cash-flow-to-firm DCF, the default model for most sectors.
///
/// Capital-intensity ratios come from the assumptions, which the caller has
/// already populated from the session's capital-intensity profile.
pub struct StandardFcffDcfModel;

impl StandardFcffDcfModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StandardFcffDcfModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValuationModel for StandardFcffDcfModel {
    fn id(&self) -> ModelId {
        ModelId::StandardFcffDcf
    }

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError> {
        let a = ctx.assumptions;
        let (mut result, projection) = fcff_valuation(ctx, self.id(), "FCFF DCF", a)?;

        let history = HistoricalInputs::derive(ctx.financials, ctx.sector);
        if let Some(cagr) = history.revenue_cagr {
            result.assumptions.insert("historical_revenue_cagr".to_string(), pct(cagr));
        }

        if let Some(schedule) = FadeSchedule::from_assumptions(a) {
            result
                .assumptions
                .insert("normalized_capex_rate".to_string(), pct(schedule.mature_capex));
            result.reasoning.push(format!(
                "Peak investment cycle normalized: growth {}→{} and CapEx {}→{} \
                 between years 4 and 7",
                pct(schedule.peak_growth),
                pct(schedule.mature_growth),
                pct(schedule.peak_capex),
                pct(schedule.mature_capex)
            ));
        }
        result.reasoning.extend(history.notes.iter().cloned());

        let mut confidence: f64 = 0.70;
        if a.requires_normalization {
            confidence -= 0.10;
        }
        if projection.terminal_share() > 0.75 {
            confidence -= 0.10;
            result.reasoning.push(
                "Terminal value dominates enterprise value; result sensitive to WACC".to_string(),
            );
        }
        if history.years_available < 3 {
            confidence -= 0.05;
        }
        result.confidence = confidence.clamp(0.30, 0.85);

        tracing::debug!(
            ticker = %ctx.ticker,
            ev = projection.enterprise_value,
            fair_value = result.fair_value,
            normalized = a.requires_normalization,
            "FCFF DCF complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::GrowthNormalizer;
    use crate::models::fixtures;

    fn base_assumptions() -> DCFAssumptions {
        DCFAssumptions {
            revenue_growth_rate: 10.0,
            ebitda_margin: 20.0,
            tax_rate: 25.0,
            wacc: 12.0,
            terminal_growth_rate: 5.0,
            projection_years: 10,
            capex_percentage: 5.0,
            working_capital_percentage: 2.0,
            depreciation_percentage: 3.0,
            net_debt_percentage: 20.0,
            normalized_capex_rate: None,
            requires_normalization: false,
        }
    }

    #[test]
    fn test_first_year_cash_flow() {
        let p = project_fcff(1000.0, &base_assumptions()).unwrap();
        let y1 = &p.years[0];
        assert!((y1.revenue - 1100.0).abs() < 1e-9);
        assert!((y1.ebitda - 220.0).abs() < 1e-9);
        assert!((y1.depreciation - 33.0).abs() < 1e-9);
        assert!((y1.nopat - 140.25).abs() < 1e-9);
        assert!((y1.capex - 55.0).abs() < 1e-9);
        assert!((y1.delta_wc - 2.2).abs() < 1e-9);
        assert!((y1.fcff - (140.25 + 33.0 - 55.0 - 2.2)).abs() < 1e-9);
        assert!((y1.present_value - y1.fcff / 1.12).abs() < 1e-9);
        assert_eq!(p.years.len(), 10);
        assert!((p.enterprise_value - (p.sum_pv + p.pv_terminal)).abs() < 1e-6);
    }

    #[test]
    fn test_wacc_not_above_terminal_growth_fails() {
        let mut a = base_assumptions();
        a.wacc = 5.0;
        let err = project_fcff(1000.0, &a).unwrap_err();
        assert!(err.is_calculation_error());
    }

    #[test]
    fn test_normalized_projection_follows_fade() {
        let mut a = base_assumptions();
        a.revenue_growth_rate = 18.0;
        a.capex_percentage = 14.0;
        let d = GrowthNormalizer::detect(
            18.0,
            14.0,
            a.depreciation_percentage,
            a.terminal_growth_rate,
        );
        GrowthNormalizer::apply(&mut a, &d);

        let p = project_fcff(1000.0, &a).unwrap();
        assert_eq!(p.years[0].growth_rate, 18.0);
        assert_eq!(p.years[2].growth_rate, 18.0);
        assert!(p.years[3].growth_rate < 18.0 && p.years[3].growth_rate > 5.0);
        for y in &p.years[7..] {
            assert_eq!(y.growth_rate, 5.0);
            assert!((y.capex / y.revenue * 100.0 - 6.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_net_debt_cap_holds() {
        let mut data = fixtures::financials(vec![1000.0], vec![100.0], 10.0);
        data.total_debt = Some(vec![5000.0]);
        data.cash = Some(vec![100.0]);
        for ev in [100.0, 1000.0, 50_000.0] {
            let (capped, raw) = capped_net_debt(&data, ev, 20.0);
            assert!(capped <= 0.20 * ev + 1e-9);
            assert_eq!(raw, 4900.0);
        }
        // Net cash passes through uncapped
        data.total_debt = Some(vec![0.0]);
        let (capped, _) = capped_net_debt(&data, 1000.0, 20.0);
        assert_eq!(capped, -100.0);
    }

    #[test]
    fn test_historical_inputs() {
        let mut data =
            fixtures::financials(vec![1331.0, 1210.0, 1100.0, 1000.0], vec![0.0; 4], 1.0);
        data.ebitda = Some(vec![266.2, 242.0, 220.0, 0.0]);
        let h = HistoricalInputs::derive(&data, Sector::Auto);
        assert!((h.revenue_cagr.unwrap() - 10.0).abs() < 1e-6);
        assert!((h.ebitda_margin.unwrap() - 20.0).abs() < 1e-6);

        let data = fixtures::financials(vec![2000.0, 1000.0], vec![0.0; 2], 1.0);
        let h = HistoricalInputs::derive(&data, Sector::Auto);
        assert_eq!(h.revenue_cagr, Some(MAX_HISTORICAL_GROWTH));
        assert!(h.ebitda_margin.is_none());
        assert_eq!(h.notes.len(), 1);
    }

    #[test]
    fn test_implausible_margin_replaced_by_benchmark() {
        let mut data = fixtures::financials(vec![100.0, 100.0, 100.0], vec![0.0; 3], 1.0);
        data.ebitda = Some(vec![60.0, 55.0, 50.0]);
        let h = HistoricalInputs::derive(&data, Sector::Cement);
        assert_eq!(h.ebitda_margin, Some(sector_tables().profile(Sector::Cement).ebitda_margin));
    }

    #[tokio::test]
    async fn test_model_result_carries_projections() {
        let mut data = fixtures::financials(vec![1.0e11, 9.0e10, 8.0e10], vec![1.0e10; 3], 1.0e9);
        data.total_debt = Some(vec![2.0e10]);
        data.cash = Some(vec![5.0e9]);
        let market = fixtures::market(150.0, 1.5e11, Some(15.0), Some(3.0));
        let a = base_assumptions();
        let ctx = ValuationContext {
            ticker: "MFG",
            sector: Sector::Auto,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = StandardFcffDcfModel::new().value(&ctx).await.unwrap();
        assert_eq!(result.cash_flow_projections.as_ref().map(Vec::len), Some(10));
        let calc = result.calculated_data.unwrap();
        let ev = calc.enterprise_value.unwrap();
        assert!(calc.net_debt.unwrap() <= a.net_debt_percentage / 100.0 * ev);
        assert!(result.fair_value.is_finite() && result.fair_value > 0.0);
        assert!((result.upside_pct - (result.fair_value - 150.0) / 150.0 * 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_shares_is_calculation_error() {
        let data = fixtures::financials(vec![1.0e11], vec![1.0e10], 0.0);
        let market = fixtures::market(150.0, 1.5e11, None, None);
        let a = base_assumptions();
        let ctx = ValuationContext {
            ticker: "NOSHARES",
            sector: Sector::Auto,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let err = StandardFcffDcfModel::new().value(&ctx).await.unwrap_err();
        assert!(err.is_calculation_error());
    }
}
