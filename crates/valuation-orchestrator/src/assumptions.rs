//! Default DCF assumptions for a new session.
//!
//! Advisory defaults from the backend are accepted field by field only when
//! they pass validation; anything rejected falls back to the sector table.
//! History, the capital-intensity profile and the peak-cycle check are then
//! layered on top.

use std::collections::BTreeMap;

use valuation_core::{
    CapitalIntensityProfile, DCFAssumptions, DcfDefaults, FinancialDataSet, Sector,
};
use valuation_engine::models::HistoricalInputs;
use valuation_engine::{sector_tables, GrowthNormalizer};

/// Tickers whose WACC is held to a tighter band.
pub const KNOWN_LARGE_CAPS: [&str; 10] = [
    "RELIANCE",
    "TCS",
    "HDFCBANK",
    "INFY",
    "ICICIBANK",
    "HINDUNILVR",
    "ITC",
    "SBIN",
    "BHARTIARTL",
    "LT",
];

pub const MAX_TERMINAL_GROWTH: f64 = 6.0;

/// Accepted WACC band, percentage points, inclusive.
pub fn wacc_bounds(ticker: &str, sector: Sector) -> (f64, f64) {
    if KNOWN_LARGE_CAPS.iter().any(|t| t.eq_ignore_ascii_case(ticker)) {
        (9.0, 13.0)
    } else if sector == Sector::Energy {
        (10.0, 14.0)
    } else {
        (8.0, 18.0)
    }
}

fn finite_in(value: f64, min: f64, max: f64) -> bool {
    value.is_finite() && value >= min && value <= max
}

pub struct AssumptionBuilder;

impl AssumptionBuilder {
    /// Merge advisory defaults into the sector table defaults.
    pub fn validate(
        ticker: &str,
        sector: Sector,
        advisory: Option<&DcfDefaults>,
    ) -> (DCFAssumptions, BTreeMap<String, String>) {
        let mut a = sector_tables().default_assumptions(sector);
        let mut rationale = BTreeMap::new();

        let Some(defaults) = advisory else {
            rationale.insert(
                "source".to_string(),
                format!("{sector} sector defaults (no advisory defaults)"),
            );
            return (a, rationale);
        };
        let advised = &defaults.assumptions;
        rationale.extend(defaults.rationale.clone());

        let (min_wacc, max_wacc) = wacc_bounds(ticker, sector);
        if finite_in(advised.wacc, min_wacc, max_wacc) {
            a.wacc = advised.wacc;
        } else {
            tracing::warn!(
                %ticker,
                wacc = advised.wacc,
                min_wacc,
                max_wacc,
                "Advisory WACC rejected"
            );
            rationale.insert(
                "wacc".to_string(),
                format!(
                    "Advisory WACC {:.1}% outside [{min_wacc:.0}%, {max_wacc:.0}%]; \
                     using {sector} default {:.1}%",
                    advised.wacc, a.wacc
                ),
            );
        }

        if finite_in(advised.terminal_growth_rate, 0.0, MAX_TERMINAL_GROWTH)
            && advised.terminal_growth_rate < a.wacc
        {
            a.terminal_growth_rate = advised.terminal_growth_rate;
        } else {
            tracing::warn!(
                %ticker,
                terminal_growth = advised.terminal_growth_rate,
                "Advisory terminal growth rejected"
            );
            rationale.insert(
                "terminal_growth_rate".to_string(),
                format!(
                    "Advisory terminal growth {:.1}% must be below WACC and at most \
                     {MAX_TERMINAL_GROWTH:.0}%; using {:.1}%",
                    advised.terminal_growth_rate, a.terminal_growth_rate
                ),
            );
        }

        if finite_in(advised.tax_rate, 0.0, 50.0) {
            a.tax_rate = advised.tax_rate;
        }
        if (1..=20).contains(&advised.projection_years) {
            a.projection_years = advised.projection_years;
        }
        if finite_in(advised.revenue_growth_rate, -20.0, 50.0) {
            a.revenue_growth_rate = advised.revenue_growth_rate;
        }
        if finite_in(advised.ebitda_margin, 0.0, 100.0) && advised.ebitda_margin > 0.0 {
            a.ebitda_margin = advised.ebitda_margin;
        }
        if finite_in(advised.net_debt_percentage, 0.0, 100.0) {
            a.net_debt_percentage = advised.net_debt_percentage;
        }
        (a, rationale)
    }

    /// Full default assumption set for a session.
    pub fn build(
        ticker: &str,
        sector: Sector,
        advisory: Option<&DcfDefaults>,
        financials: &FinancialDataSet,
        capital: &CapitalIntensityProfile,
    ) -> (DCFAssumptions, BTreeMap<String, String>) {
        let (mut a, mut rationale) = Self::validate(ticker, sector, advisory);

        let history = HistoricalInputs::derive(financials, sector);
        if let Some(cagr) = history.revenue_cagr {
            a.revenue_growth_rate = cagr;
            rationale.insert(
                "revenue_growth_rate".to_string(),
                format!("{}-year historical revenue CAGR", history.years_available),
            );
        }
        if let Some(margin) = history.ebitda_margin {
            a.ebitda_margin = margin;
            rationale.insert(
                "ebitda_margin".to_string(),
                "3-year average EBITDA margin".to_string(),
            );
        }
        for note in history.notes {
            tracing::info!(%ticker, %note, "Historical input adjusted");
        }

        a.capex_percentage = capital.capex_pct;
        a.working_capital_percentage = capital.working_capital_pct;
        a.depreciation_percentage = capital.depreciation_pct;
        rationale.insert(
            "capital_intensity".to_string(),
            format!("{} quality, {} years of data", capital.data_quality, capital.years_of_data),
        );

        let decision = GrowthNormalizer::detect(
            a.revenue_growth_rate,
            a.capex_percentage,
            a.depreciation_percentage,
            a.terminal_growth_rate,
        );
        GrowthNormalizer::apply(&mut a, &decision);
        if decision.requires_normalization {
            rationale.insert("normalization".to_string(), decision.reason);
        }
        (a, rationale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valuation_core::DataQuality;

    fn advisory(wacc: f64, terminal: f64) -> DcfDefaults {
        let mut assumptions = sector_tables().default_assumptions(Sector::Other);
        assumptions.wacc = wacc;
        assumptions.terminal_growth_rate = terminal;
        DcfDefaults {
            assumptions,
            rationale: BTreeMap::new(),
        }
    }

    fn profile(capex: f64, da: f64) -> CapitalIntensityProfile {
        CapitalIntensityProfile {
            capex_pct: capex,
            working_capital_pct: 2.0,
            depreciation_pct: da,
            data_quality: DataQuality::High,
            years_of_data: 5,
            notes: Vec::new(),
        }
    }

    #[test]
    fn test_large_cap_wacc_band() {
        let (a, rationale) =
            AssumptionBuilder::validate("TCS", Sector::It, Some(&advisory(15.0, 5.0)));
        assert_eq!(a.wacc, sector_tables().profile(Sector::It).wacc);
        assert!(rationale.contains_key("wacc"));

        let (a, _) = AssumptionBuilder::validate("tcs", Sector::It, Some(&advisory(12.0, 5.0)));
        assert_eq!(a.wacc, 12.0);
    }

    #[test]
    fn test_energy_wacc_band() {
        let (a, _) = AssumptionBuilder::validate("NTPC", Sector::Energy, Some(&advisory(9.0, 4.0)));
        assert_eq!(a.wacc, sector_tables().profile(Sector::Energy).wacc);
        let (a, _) =
            AssumptionBuilder::validate("NTPC", Sector::Energy, Some(&advisory(13.5, 4.0)));
        assert_eq!(a.wacc, 13.5);
    }

    #[test]
    fn test_terminal_growth_rules() {
        let (a, _) = AssumptionBuilder::validate("XYZ", Sector::Auto, Some(&advisory(12.0, 7.0)));
        assert_eq!(a.terminal_growth_rate, sector_tables().profile(Sector::Auto).terminal_growth);
        let (a, _) = AssumptionBuilder::validate("XYZ", Sector::Auto, Some(&advisory(12.0, 6.0)));
        assert_eq!(a.terminal_growth_rate, 6.0);
        assert!(a.terminal_growth_rate < a.wacc);
    }

    #[test]
    fn test_build_detects_peak_cycle() {
        // CAGR ≈ 12%: 100 → 112 → 125.44
        let financials = FinancialDataSet {
            ticker: "GROW".to_string(),
            revenue: vec![125.44, 112.0, 100.0],
            net_income: vec![10.0; 3],
            shares_outstanding: vec![1.0; 3],
            ..Default::default()
        };
        let capital = profile(11.5, 3.0);
        let (a, rationale) =
            AssumptionBuilder::build("GROW", Sector::Chemicals, None, &financials, &capital);
        assert!((a.revenue_growth_rate - 12.0).abs() < 1e-6);
        assert!(a.requires_normalization);
        assert_eq!(a.normalized_capex_rate, Some(6.0));
        assert!(rationale.contains_key("normalization"));
    }

    #[test]
    fn test_build_without_history_keeps_sector_defaults() {
        let empty = FinancialDataSet::default();
        let (a, rationale) =
            AssumptionBuilder::build("EMPTY", Sector::Fmcg, None, &empty, &profile(4.0, 2.5));
        let defaults = sector_tables().default_assumptions(Sector::Fmcg);
        assert_eq!(a.revenue_growth_rate, defaults.revenue_growth_rate);
        assert!(!a.requires_normalization);
        assert!(rationale["source"].contains("FMCG"));
    }
}
