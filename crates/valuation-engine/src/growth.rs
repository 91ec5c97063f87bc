//! Peak-investment-cycle detection and the three-stage fade schedule.
//!
//! A company growing fast while spending heavily on CapEx should not have
//! that spending extrapolated for a decade. When the cycle is detected both
//! growth and CapEx hold at their peak for a grace period, fade linearly to
//! mature levels, then stay flat.

use serde::{Deserialize, Serialize};
use valuation_core::{stats, DCFAssumptions};

/// Revenue CAGR above which growth counts as a peak cycle, percentage points.
pub const PEAK_GROWTH_THRESHOLD: f64 = 10.0;
/// CapEx ratio above which spending counts as a peak cycle, percentage points.
pub const PEAK_CAPEX_THRESHOLD: f64 = 10.0;
pub const MATURE_CAPEX_FLOOR: f64 = 6.0;
/// Mature CapEx sits this far above D&A so the asset base still grows.
pub const MATURE_CAPEX_SPREAD_OVER_DA: f64 = 2.0;

pub const GRACE_PERIOD_END: u32 = 3;
pub const FADE_END: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeStage {
    GracePeriod,
    Fade,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationDecision {
    pub requires_normalization: bool,
    pub revenue_cagr: f64,
    pub capex_pct: f64,
    pub normalized_capex_rate: Option<f64>,
    pub reason: String,
}

pub struct GrowthNormalizer;

impl GrowthNormalizer {
    /// All inputs in percentage points.
    pub fn detect(
        revenue_cagr: f64,
        capex_pct: f64,
        depreciation_pct: f64,
        terminal_growth: f64,
    ) -> NormalizationDecision {
        let peak = revenue_cagr > PEAK_GROWTH_THRESHOLD
            && revenue_cagr > terminal_growth
            && capex_pct > PEAK_CAPEX_THRESHOLD;

        if peak {
            let mature = Self::mature_capex_rate(depreciation_pct);
            tracing::debug!(
                revenue_cagr,
                capex_pct,
                mature_capex = mature,
                "Peak investment cycle detected"
            );
            NormalizationDecision {
                requires_normalization: true,
                revenue_cagr,
                capex_pct,
                normalized_capex_rate: Some(mature),
                reason: format!(
                    "Peak investment cycle: revenue CAGR {revenue_cagr:.1}% with CapEx at \
                     {capex_pct:.1}% of revenue; fading to {terminal_growth:.1}% growth and \
                     {mature:.1}% CapEx from year {} to {FADE_END}",
                    GRACE_PERIOD_END + 1
                ),
            }
        } else {
            NormalizationDecision {
                requires_normalization: false,
                revenue_cagr,
                capex_pct,
                normalized_capex_rate: None,
                reason: "Growth and CapEx within steady-state range; no normalization".to_string(),
            }
        }
    }

    /// `max(D&A + 2pp, 6%)`.
    pub fn mature_capex_rate(depreciation_pct: f64) -> f64 {
        (depreciation_pct + MATURE_CAPEX_SPREAD_OVER_DA).max(MATURE_CAPEX_FLOOR)
    }

    pub fn apply(assumptions: &mut DCFAssumptions, decision: &NormalizationDecision) {
        assumptions.requires_normalization = decision.requires_normalization;
        assumptions.normalized_capex_rate = decision.normalized_capex_rate;
    }
}

/// Year-by-year growth and CapEx rates for a normalized projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSchedule {
    pub peak_growth: f64,
    pub mature_growth: f64,
    pub peak_capex: f64,
    pub mature_capex: f64,
}

impl FadeSchedule {
    /// Schedule implied by the assumptions, `None` when normalization is off.
    pub fn from_assumptions(a: &DCFAssumptions) -> Option<Self> {
        if !a.requires_normalization {
            return None;
        }
        let mature_capex = a
            .normalized_capex_rate
            .unwrap_or_else(|| GrowthNormalizer::mature_capex_rate(a.depreciation_percentage));
        Some(Self {
            peak_growth: a.revenue_growth_rate,
            mature_growth: a.terminal_growth_rate,
            peak_capex: a.capex_percentage,
            mature_capex,
        })
    }

    pub fn stage(year: u32) -> FadeStage {
        if year <= GRACE_PERIOD_END {
            FadeStage::GracePeriod
        } else if year <= FADE_END {
            FadeStage::Fade
        } else {
            FadeStage::Stable
        }
    }

    /// 0 through year 3, `(year − 3) / 4` for years 4–7, 1 afterwards.
    pub fn weight(year: u32) -> f64 {
        match Self::stage(year) {
            FadeStage::GracePeriod => 0.0,
            FadeStage::Fade => {
                (year - GRACE_PERIOD_END) as f64 / (FADE_END - GRACE_PERIOD_END) as f64
            }
            FadeStage::Stable => 1.0,
        }
    }

    pub fn growth_for_year(&self, year: u32) -> f64 {
        match Self::stage(year) {
            FadeStage::GracePeriod => self.peak_growth,
            FadeStage::Fade => {
                stats::lerp(self.peak_growth, self.mature_growth, Self::weight(year))
            }
            FadeStage::Stable => self.mature_growth,
        }
    }

    pub fn capex_for_year(&self, year: u32) -> f64 {
        match Self::stage(year) {
            FadeStage::GracePeriod => self.peak_capex,
            FadeStage::Fade => stats::lerp(self.peak_capex, self.mature_capex, Self::weight(year)),
            FadeStage::Stable => self.mature_capex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> FadeSchedule {
        FadeSchedule {
            peak_growth: 18.0,
            mature_growth: 5.0,
            peak_capex: 14.0,
            mature_capex: 6.0,
        }
    }

    #[test]
    fn test_weight_boundaries() {
        assert_eq!(FadeSchedule::weight(3), 0.0);
        assert_eq!(FadeSchedule::weight(4), 0.25);
        assert_eq!(FadeSchedule::weight(7), 1.0);
        assert_eq!(FadeSchedule::weight(8), 1.0);
    }

    #[test]
    fn test_three_stage_growth() {
        let s = schedule();
        for year in 1..=3 {
            assert_eq!(s.growth_for_year(year), 18.0);
        }
        let y4 = s.growth_for_year(4);
        assert!(y4 < 18.0 && y4 > 5.0);
        assert_eq!(s.growth_for_year(7), 5.0);
        for year in 8..=10 {
            assert_eq!(s.growth_for_year(year), 5.0);
        }
    }

    #[test]
    fn test_capex_fades_monotonically() {
        let s = schedule();
        let rates: Vec<f64> = (1..=10).map(|y| s.capex_for_year(y)).collect();
        assert!(rates.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(rates[9], 6.0);
    }

    #[test]
    fn test_detect_peak_cycle() {
        let d = GrowthNormalizer::detect(12.0, 13.0, 3.0, 5.0);
        assert!(d.requires_normalization);
        assert_eq!(d.normalized_capex_rate, Some(6.0));

        let d = GrowthNormalizer::detect(12.0, 13.0, 7.0, 5.0);
        assert_eq!(d.normalized_capex_rate, Some(9.0));
    }

    #[test]
    fn test_no_normalization_when_capex_modest() {
        let d = GrowthNormalizer::detect(18.0, 8.0, 3.0, 5.0);
        assert!(!d.requires_normalization);
        assert!(d.normalized_capex_rate.is_none());

        let d = GrowthNormalizer::detect(9.0, 14.0, 3.0, 5.0);
        assert!(!d.requires_normalization);
    }

    #[test]
    fn test_schedule_from_assumptions() {
        let mut a =
            crate::tables::sector_tables().default_assumptions(valuation_core::Sector::Energy);
        assert!(FadeSchedule::from_assumptions(&a).is_none());
        a.revenue_growth_rate = 18.0;
        a.capex_percentage = 14.0;
        let d = GrowthNormalizer::detect(
            18.0,
            14.0,
            a.depreciation_percentage,
            a.terminal_growth_rate,
        );
        GrowthNormalizer::apply(&mut a, &d);
        let s = FadeSchedule::from_assumptions(&a).unwrap();
        assert_eq!(s.mature_growth, a.terminal_growth_rate);
        assert_eq!(s.mature_capex, 8.0); // ENERGY D&A 6% + 2pp
    }
}
