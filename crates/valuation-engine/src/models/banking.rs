use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use valuation_core::{
    stats, CalculatedData, MarketCapTier, ModelId, Sector, ValuationContext, ValuationError,
    ValuationModel, ValuationResult,
};

use super::{approximate_historical_roe, cost_of_equity, pct, require_price};
use crate::tables::sector_tables;

const ROE_YEARS: usize = 3;
const PROJECTION_YEARS: u32 = 10;
const RETENTION_RATIO: f64 = 0.60;
const TERMINAL_GROWTH: f64 = 4.5;
/// Bank ROE below this is treated as a data artefact rather than a franchise.
const MIN_CREDIBLE_BANK_ROE: f64 = 8.0;
const BENCHMARK_SIZE_THRESHOLD: f64 = 5.0e11;
const LARGE_BANK_BENCHMARK_ROE: f64 = 17.0;
const BANK_BENCHMARK_ROE: f64 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoeSource {
    HistoricalAverage,
    SectorBenchmark,
}

impl fmt::Display for RoeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoeSource::HistoricalAverage => f.write_str("Historical Average"),
            RoeSource::SectorBenchmark => f.write_str("Sector Benchmark"),
        }
    }
}

/// Excess-returns model for lenders: value = book value plus the present
/// value of returns earned above the cost of equity.
pub struct BankingExcessReturnsModel;

impl BankingExcessReturnsModel {
    pub fn new() -> Self {
        Self
    }

    fn benchmark_roe(market_cap: Option<f64>) -> f64 {
        if market_cap.is_some_and(|m| m > BENCHMARK_SIZE_THRESHOLD) {
            LARGE_BANK_BENCHMARK_ROE
        } else {
            BANK_BENCHMARK_ROE
        }
    }

    /// Starting ROE and its provenance.
    fn starting_roe(
        ctx: &ValuationContext<'_>,
        bvps: f64,
        reasoning: &mut Vec<String>,
    ) -> (f64, RoeSource) {
        let history = approximate_historical_roe(ctx.financials, bvps, ROE_YEARS);
        let benchmark = Self::benchmark_roe(ctx.market.market_cap);

        match stats::mean(&history) {
            Some(avg) if ctx.sector == Sector::Bfsi && avg < MIN_CREDIBLE_BANK_ROE => {
                reasoning.push(format!(
                    "Computed ROE {} is below the {} floor for banks; using {} sector benchmark",
                    pct(avg),
                    pct(MIN_CREDIBLE_BANK_ROE),
                    pct(benchmark)
                ));
                (benchmark, RoeSource::SectorBenchmark)
            }
            Some(avg) => {
                reasoning.push(format!("{}-year average ROE {}", history.len(), pct(avg)));
                (avg, RoeSource::HistoricalAverage)
            }
            None => {
                reasoning.push(format!(
                    "No usable earnings history; using {} sector benchmark ROE",
                    pct(benchmark)
                ));
                (benchmark, RoeSource::SectorBenchmark)
            }
        }
    }
}

impl Default for BankingExcessReturnsModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValuationModel for BankingExcessReturnsModel {
    fn id(&self) -> ModelId {
        ModelId::BankingExcessReturns
    }

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError> {
        let price = require_price(ctx)?;
        let bvps = ctx.market.book_value_per_share().ok_or_else(|| {
            ValuationError::CalculationError(format!(
                "{}: PB ratio must be positive to derive book value",
                ctx.ticker
            ))
        })?;

        let tables = sector_tables();
        let tier = MarketCapTier::from_market_cap(ctx.market.market_cap);
        let mut reasoning = vec![format!("Book value per share ₹{bvps:.2} (price / PB)")];

        let (start_roe, roe_source) = Self::starting_roe(ctx, bvps, &mut reasoning);
        let (beta, ke) = cost_of_equity(ctx.sector, tier);
        let moat = tables.moat_premium(tier) + tables.market_position_bonus(tier);
        let terminal_roe = ke + moat;

        if ke <= TERMINAL_GROWTH {
            return Err(ValuationError::CalculationError(format!(
                "cost of equity {} must exceed terminal growth {}",
                pct(ke),
                pct(TERMINAL_GROWTH)
            )));
        }

        let discount = 1.0 + ke / 100.0;
        let mut book_value = bvps;
        let mut sum_pv_excess = 0.0;
        for year in 1..=PROJECTION_YEARS {
            let roe = stats::lerp(start_roe, terminal_roe, year as f64 / PROJECTION_YEARS as f64);
            let excess = (roe - ke) / 100.0 * book_value;
            sum_pv_excess += excess / discount.powi(year as i32);
            book_value *= 1.0 + roe / 100.0 * RETENTION_RATIO;
        }

        let terminal_value =
            (terminal_roe - ke) / 100.0 * book_value / ((ke - TERMINAL_GROWTH) / 100.0);
        let pv_terminal = terminal_value / discount.powi(PROJECTION_YEARS as i32);
        let fair_value = bvps + sum_pv_excess + pv_terminal;

        let confidence = (0.50 + 1.5 * (start_roe - ke) / 100.0).clamp(0.40, 0.85);

        reasoning.push(format!(
            "Cost of equity {} = {} + {beta:.2} beta × {} ERP ({})",
            pct(ke),
            pct(crate::tables::RISK_FREE_RATE),
            pct(crate::tables::EQUITY_RISK_PREMIUM),
            tier.label()
        ));
        reasoning.push(format!(
            "ROE fades from {} to terminal {} (Ke + {} moat) over {PROJECTION_YEARS} years",
            pct(start_roe),
            pct(terminal_roe),
            pct(moat)
        ));
        reasoning.push(format!(
            "PV of excess returns ₹{sum_pv_excess:.2}, \
             PV of terminal ₹{pv_terminal:.2} per share"
        ));

        tracing::debug!(
            ticker = %ctx.ticker,
            start_roe,
            ke,
            fair_value,
            source = %roe_source,
            "Banking excess returns"
        );

        let mut result = ValuationResult::new(
            self.id(),
            "Excess Returns (Banking)",
            fair_value,
            price,
            confidence,
        )
        .with_assumption("roe", pct(start_roe))
        .with_assumption("roe_source", roe_source.to_string())
        .with_assumption("cost_of_equity", pct(ke))
        .with_assumption("beta", format!("{beta:.2}"))
        .with_assumption("terminal_roe", pct(terminal_roe))
        .with_assumption("retention_ratio", format!("{RETENTION_RATIO:.2}"))
        .with_assumption("terminal_growth", pct(TERMINAL_GROWTH))
        .with_reasoning(reasoning);
        result.calculated_data = Some(CalculatedData {
            terminal_value: Some(terminal_value),
            pv_terminal_value: Some(pv_terminal),
            sum_pv_cash_flows: Some(sum_pv_excess),
            book_value_per_share: Some(bvps),
            ..Default::default()
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[tokio::test]
    async fn test_declining_large_bank_uses_benchmark() {
        // BVPS 500, 1e9 shares => ROE 6%, 5%, 4%
        let data = fixtures::financials(vec![1.0e11; 3], vec![3.0e10, 2.5e10, 2.0e10], 1.0e9);
        let market = fixtures::market(1000.0, 1.0e12, Some(20.0), Some(2.0));
        let a = fixtures::assumptions(Sector::Bfsi);
        let ctx = ValuationContext {
            ticker: "BANK",
            sector: Sector::Bfsi,
            financials: &data,
            market: &market,
            assumptions: &a,
        };

        let result = BankingExcessReturnsModel::new().value(&ctx).await.unwrap();
        assert_eq!(result.assumptions["roe"], "17.0%");
        assert_eq!(result.assumptions["roe_source"], "Sector Benchmark");
    }

    #[tokio::test]
    async fn test_smaller_bank_benchmark() {
        let data = fixtures::financials(vec![1.0e10; 3], vec![1.0e8, 1.0e8, 1.0e8], 1.0e8);
        let market = fixtures::market(100.0, 1.0e10, None, Some(1.0));
        let a = fixtures::assumptions(Sector::Bfsi);
        let ctx = ValuationContext {
            ticker: "SMALLBANK",
            sector: Sector::Bfsi,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = BankingExcessReturnsModel::new().value(&ctx).await.unwrap();
        assert_eq!(result.assumptions["roe"], "14.0%");
    }

    #[tokio::test]
    async fn test_roe_above_ke_values_above_book() {
        // BVPS 250; ROE = 5e10 / (1e9 × 250) = 20% every year
        let data = fixtures::financials(vec![1.0e11; 3], vec![5.0e10; 3], 1.0e9);
        let market = fixtures::market(500.0, 5.0e11, Some(10.0), Some(2.0));
        let a = fixtures::assumptions(Sector::Bfsi);
        let ctx = ValuationContext {
            ticker: "GOODBANK",
            sector: Sector::Bfsi,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = BankingExcessReturnsModel::new().value(&ctx).await.unwrap();
        assert_eq!(result.assumptions["roe_source"], "Historical Average");
        assert!(result.fair_value > 250.0);
        assert!(result.confidence > 0.5 && result.confidence <= 0.85);
    }

    #[tokio::test]
    async fn test_non_bank_keeps_low_roe() {
        let data = fixtures::financials(vec![1.0e11; 3], vec![1.0e9; 3], 1.0e9);
        let market = fixtures::market(100.0, 1.0e12, None, Some(1.0));
        let a = fixtures::assumptions(Sector::Diversified);
        let ctx = ValuationContext {
            ticker: "HOLDCO",
            sector: Sector::Diversified,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let result = BankingExcessReturnsModel::new().value(&ctx).await.unwrap();
        assert_eq!(result.assumptions["roe_source"], "Historical Average");
        assert_eq!(result.confidence, 0.40);
    }

    #[tokio::test]
    async fn test_missing_pb_is_calculation_error() {
        let data = fixtures::financials(vec![1.0e11; 3], vec![5.0e10; 3], 1.0e9);
        let market = fixtures::market(500.0, 5.0e11, Some(10.0), None);
        let a = fixtures::assumptions(Sector::Bfsi);
        let ctx = ValuationContext {
            ticker: "NOPB",
            sector: Sector::Bfsi,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let err = BankingExcessReturnsModel::new().value(&ctx).await.unwrap_err();
        assert!(err.is_calculation_error());
    }
}
