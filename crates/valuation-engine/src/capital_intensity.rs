use valuation_core::{
    stats, CapitalIntensityProfile, DataQuality, FinancialDataSet, Sector, ValuationError,
};

use crate::tables::sector_tables;

/// Hard ceiling on the averaged CapEx ratio, percentage points.
pub const CAPEX_CEILING_PCT: f64 = 12.0;
const MAX_YEARS: usize = 5;

/// Per-metric sanity bounds (percentage of revenue). A year only contributes
/// to a metric when its ratio falls inside the metric's bounds.
#[derive(Debug, Clone, Copy)]
struct RatioBounds {
    min: f64,
    min_inclusive: bool,
    max: f64,
}

impl RatioBounds {
    fn contains(&self, ratio: f64) -> bool {
        let above_min = if self.min_inclusive {
            ratio >= self.min
        } else {
            ratio > self.min
        };
        ratio.is_finite() && above_min && ratio <= self.max
    }
}

const CAPEX_BOUNDS: RatioBounds = RatioBounds {
    min: 0.0,
    min_inclusive: false,
    max: 50.0,
};
const WORKING_CAPITAL_BOUNDS: RatioBounds = RatioBounds {
    min: 0.0,
    min_inclusive: true,
    max: 20.0,
};
const DEPRECIATION_BOUNDS: RatioBounds = RatioBounds {
    min: 0.0,
    min_inclusive: false,
    max: 25.0,
};

/// Derives CapEx, working-capital and D&A intensity from historical statements.
pub struct CapitalIntensityEstimator;

impl CapitalIntensityEstimator {
    /// Average each metric independently over the last five years.
    ///
    /// A metric with no usable year is filled from the sector defaults and a
    /// note records the substitution. Quality reflects how many metrics and
    /// years actually contributed.
    pub fn estimate(data: &FinancialDataSet, sector: Sector) -> CapitalIntensityProfile {
        let defaults = sector_tables().profile(sector);
        let mut notes = Vec::new();

        // Cash-flow statements report CapEx and D&A with either sign.
        let capex = ratio_series(data, data.capex.as_ref(), CAPEX_BOUNDS, f64::abs);
        let working_capital = ratio_series(
            data,
            data.working_capital_change.as_ref(),
            WORKING_CAPITAL_BOUNDS,
            |v| v,
        );
        let depreciation = ratio_series(
            data,
            data.depreciation_amortization.as_ref(),
            DEPRECIATION_BOUNDS,
            f64::abs,
        );

        let metrics_with_data = [&capex, &working_capital, &depreciation]
            .iter()
            .filter(|s| !s.is_empty())
            .count();
        let years_of_data = capex.len().max(working_capital.len()).max(depreciation.len());

        let capex_pct = match stats::mean(&capex) {
            Some(avg) if avg > CAPEX_CEILING_PCT => {
                notes.push(format!(
                    "CapEx average {avg:.1}% capped at {CAPEX_CEILING_PCT:.0}% \
                     to keep one heavy year from dominating the projection"
                ));
                CAPEX_CEILING_PCT
            }
            Some(avg) => avg,
            None => {
                notes.push(format!(
                    "No usable CapEx history; using {sector} default {:.1}%",
                    defaults.capex_pct
                ));
                defaults.capex_pct
            }
        };

        let working_capital_pct = stats::mean(&working_capital).unwrap_or_else(|| {
            notes.push(format!(
                "No usable working-capital history; using {sector} default {:.1}%",
                defaults.working_capital_pct
            ));
            defaults.working_capital_pct
        });

        let depreciation_pct = stats::mean(&depreciation).unwrap_or_else(|| {
            notes.push(format!(
                "No usable D&A history; using {sector} default {:.1}%",
                defaults.depreciation_pct
            ));
            defaults.depreciation_pct
        });

        let data_quality = if metrics_with_data == 3 && years_of_data >= 3 {
            DataQuality::High
        } else if metrics_with_data >= 2 && years_of_data >= 2 {
            DataQuality::Medium
        } else {
            DataQuality::Low
        };

        tracing::debug!(
            ticker = %data.ticker,
            capex_pct,
            working_capital_pct,
            depreciation_pct,
            quality = %data_quality,
            years_of_data,
            "Estimated capital intensity"
        );

        CapitalIntensityProfile {
            capex_pct,
            working_capital_pct,
            depreciation_pct,
            data_quality,
            years_of_data,
            notes,
        }
    }

    /// Static sector ratios tagged `fallback`, with the reason recorded.
    pub fn sector_default(sector: Sector, reason: impl Into<String>) -> CapitalIntensityProfile {
        let p = sector_tables().profile(sector);
        CapitalIntensityProfile {
            capex_pct: p.capex_pct,
            working_capital_pct: p.working_capital_pct,
            depreciation_pct: p.depreciation_pct,
            data_quality: DataQuality::Fallback,
            years_of_data: 0,
            notes: vec![reason.into(), format!("Using {sector} sector default ratios")],
        }
    }

    /// Estimate from a fetch outcome, substituting sector defaults when the
    /// fetch failed or the estimate is low quality.
    pub fn resolve(
        sector: Sector,
        fetched: Result<&FinancialDataSet, &ValuationError>,
    ) -> CapitalIntensityProfile {
        match fetched {
            Err(e) => {
                tracing::warn!(
                    %sector,
                    error = %e,
                    "Financial data unavailable for capital intensity"
                );
                Self::sector_default(sector, format!("Financial data fetch failed: {e}"))
            }
            Ok(data) => {
                let estimate = Self::estimate(data, sector);
                if estimate.data_quality == DataQuality::Low {
                    tracing::warn!(
                        ticker = %data.ticker,
                        %sector,
                        "Capital intensity history too thin, using sector defaults"
                    );
                    let mut fallback = Self::sector_default(
                        sector,
                        format!(
                            "Historical data quality low ({} usable years); estimate discarded",
                            estimate.years_of_data
                        ),
                    );
                    fallback.notes.extend(estimate.notes);
                    fallback
                } else {
                    estimate
                }
            }
        }
    }
}

fn ratio_series(
    data: &FinancialDataSet,
    series: Option<&Vec<f64>>,
    bounds: RatioBounds,
    numerator: fn(f64) -> f64,
) -> Vec<f64> {
    let years = data.revenue.len().min(MAX_YEARS);
    (0..years)
        .filter_map(|i| {
            let revenue = data.revenue[i];
            if !revenue.is_finite() || revenue <= 0.0 {
                return None;
            }
            let value = FinancialDataSet::at(series, i)?;
            let ratio = numerator(value) / revenue * 100.0;
            bounds.contains(ratio).then_some(ratio)
        })
        .collect()
}
