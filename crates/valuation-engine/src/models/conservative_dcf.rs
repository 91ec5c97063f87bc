use async_trait::async_trait;
use valuation_core::{
    DCFAssumptions, ModelId, ValuationContext, ValuationError, ValuationModel, ValuationResult,
};

use super::fcff_dcf::fcff_valuation;
use super::pct;

const GROWTH_HAIRCUT: f64 = 0.7;
const WACC_PREMIUM: f64 = 2.0;
const TERMINAL_GROWTH_CUT: f64 = 1.0;
const TERMINAL_GROWTH_FLOOR: f64 = 2.0;

/// Stressed copy of the session assumptions. Normalization relief is
/// withdrawn so peak CapEx runs for the full horizon.
pub fn haircut(a: &DCFAssumptions) -> DCFAssumptions {
    DCFAssumptions {
        revenue_growth_rate: a.revenue_growth_rate * GROWTH_HAIRCUT,
        wacc: a.wacc + WACC_PREMIUM,
        terminal_growth_rate: (a.terminal_growth_rate - TERMINAL_GROWTH_CUT)
            .max(TERMINAL_GROWTH_FLOOR),
        normalized_capex_rate: None,
        requires_normalization: false,
        ..a.clone()
    }
}

/// FCFF DCF under haircut assumptions, for a downside reference point.
pub struct ConservativeDcfModel;

impl ConservativeDcfModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConservativeDcfModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValuationModel for ConservativeDcfModel {
    fn id(&self) -> ModelId {
        ModelId::ConservativeDcf
    }

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError> {
        let stressed = haircut(ctx.assumptions);
        let (mut result, _) = fcff_valuation(ctx, self.id(), "Conservative DCF", &stressed)?;
        result.reasoning.insert(
            0,
            format!(
                "Stress case: growth × {GROWTH_HAIRCUT}, WACC {} → {}, \
                 terminal growth {} → {}",
                pct(ctx.assumptions.wacc),
                pct(stressed.wacc),
                pct(ctx.assumptions.terminal_growth_rate),
                pct(stressed.terminal_growth_rate)
            ),
        );
        result.confidence = 0.60;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fixtures, StandardFcffDcfModel};
    use valuation_core::Sector;

    #[test]
    fn test_haircut() {
        let mut a = fixtures::assumptions(Sector::Energy);
        a.requires_normalization = true;
        let s = haircut(&a);
        assert!((s.revenue_growth_rate - a.revenue_growth_rate * 0.7).abs() < 1e-9);
        assert_eq!(s.wacc, a.wacc + 2.0);
        assert_eq!(s.terminal_growth_rate, 3.0);
        assert!(!s.requires_normalization);

        a.terminal_growth_rate = 2.5;
        assert_eq!(haircut(&a).terminal_growth_rate, 2.0);
    }

    #[tokio::test]
    async fn test_conservative_below_standard() {
        let data = fixtures::financials(vec![1.0e11, 9.0e10, 8.0e10], vec![1.0e10; 3], 1.0e9);
        let market = fixtures::market(150.0, 1.5e11, None, None);
        let a = fixtures::assumptions(Sector::Pharma);
        let ctx = ValuationContext {
            ticker: "PHARMACO",
            sector: Sector::Pharma,
            financials: &data,
            market: &market,
            assumptions: &a,
        };
        let standard = StandardFcffDcfModel::new().value(&ctx).await.unwrap();
        let conservative = ConservativeDcfModel::new().value(&ctx).await.unwrap();
        assert!(conservative.fair_value < standard.fair_value);
        assert_eq!(conservative.model, ModelId::ConservativeDcf);
    }
}
