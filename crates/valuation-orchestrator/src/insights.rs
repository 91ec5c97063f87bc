//! Offline stand-in for the narrative insight service.

use valuation_core::{DCFAssumptions, DataQuality, InsightContext, InsightsPayload, ValuationResult};

const KEY_INSIGHT_LIMIT: usize = 3;
const TERMINAL_SHARE_WARNING: f64 = 0.75;
const EXTREME_UPSIDE_PCT: f64 = 50.0;

fn quality_factor(quality: DataQuality) -> f64 {
    match quality {
        DataQuality::High => 1.0,
        DataQuality::Medium => 0.9,
        DataQuality::Low => 0.8,
        DataQuality::Fallback => 0.7,
    }
}

fn thesis(result: &ValuationResult) -> String {
    let upside = result.upside_pct;
    let stance = if upside > 20.0 {
        "Undervalued"
    } else if upside > 5.0 {
        "Modestly undervalued"
    } else if upside >= -5.0 {
        "Fairly valued"
    } else if upside >= -20.0 {
        "Modestly overvalued"
    } else {
        "Overvalued"
    };
    format!(
        "{stance}: fair value ₹{:.2} vs market price ₹{:.2} ({upside:+.1}%)",
        result.fair_value, result.current_price
    )
}

/// Build an insight payload from the result alone, same shape as the
/// service's.
pub fn synthesize_offline(
    result: &ValuationResult,
    assumptions: &DCFAssumptions,
    context: &InsightContext,
) -> InsightsPayload {
    if result.is_error() {
        let reason = result.reasoning.first().cloned().unwrap_or_default();
        return InsightsPayload {
            investment_thesis: format!("No fair value available: {reason}"),
            model_interpretation: format!(
                "Offline summary: {} could not complete",
                result.model.display_name()
            ),
            key_insights: Vec::new(),
            risk_commentary: Vec::new(),
            red_flags: vec![reason],
            confidence_score: 0.0,
        };
    }

    let key_insights: Vec<String> = result
        .reasoning
        .iter()
        .take(KEY_INSIGHT_LIMIT)
        .cloned()
        .collect();

    let mut risk_commentary = vec![format!(
        "Discount rate {:.1}% against {:.1}% terminal growth; \
         a 1pp move in either shifts the result materially",
        assumptions.wacc, assumptions.terminal_growth_rate
    )];
    if context.requires_normalization {
        risk_commentary.push(
            "Projection assumes the current investment cycle fades by year 7; \
             a longer cycle lowers free cash flow"
                .to_string(),
        );
    }
    if context.sector.is_historically_stable() {
        risk_commentary.push(format!(
            "{} valuations are sensitive to sector re-rating",
            context.sector
        ));
    }

    let mut red_flags = Vec::new();
    if context.data_quality <= DataQuality::Low {
        red_flags.push(format!("Capital intensity based on {} quality data", context.data_quality));
    }
    let terminal_share = result.calculated_data.as_ref().and_then(|c| {
        let ev = c.enterprise_value.filter(|ev| *ev > 0.0)?;
        Some(c.pv_terminal_value? / ev)
    });
    if let Some(share) = terminal_share.filter(|s| *s > TERMINAL_SHARE_WARNING) {
        red_flags.push(format!("Terminal value is {:.0}% of enterprise value", share * 100.0));
    }
    if result.upside_pct.abs() > EXTREME_UPSIDE_PCT {
        red_flags.push(format!(
            "Implied move of {:+.0}% is extreme; verify inputs",
            result.upside_pct
        ));
    }
    red_flags.extend(context.capital_intensity_notes.iter().cloned());

    InsightsPayload {
        investment_thesis: thesis(result),
        model_interpretation: format!(
            "Offline summary: {} estimate with {:.0}% model confidence",
            result.method,
            result.confidence * 100.0
        ),
        key_insights,
        risk_commentary,
        red_flags,
        confidence_score: (result.confidence * quality_factor(context.data_quality))
            .clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valuation_core::{CalculatedData, ModelId, Sector};

    fn context(quality: DataQuality) -> InsightContext {
        InsightContext {
            sector: Sector::Auto,
            data_quality: quality,
            requires_normalization: true,
            capital_intensity_notes: Vec::new(),
        }
    }

    fn assumptions() -> DCFAssumptions {
        valuation_engine::sector_tables().default_assumptions(Sector::Auto)
    }

    #[test]
    fn test_offline_payload_shape() {
        let mut result =
            ValuationResult::new(ModelId::StandardFcffDcf, "FCFF DCF", 130.0, 100.0, 0.7)
                .with_reasoning(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        result.calculated_data = Some(CalculatedData {
            enterprise_value: Some(100.0),
            pv_terminal_value: Some(80.0),
            ..Default::default()
        });

        let payload = synthesize_offline(&result, &assumptions(), &context(DataQuality::Fallback));
        assert!(payload.investment_thesis.starts_with("Undervalued"));
        assert_eq!(payload.key_insights.len(), 3);
        assert_eq!(payload.risk_commentary.len(), 2);
        assert_eq!(payload.red_flags.len(), 2);
        assert!((payload.confidence_score - 0.49).abs() < 1e-9);
    }

    #[test]
    fn test_error_result() {
        let result = ValuationResult::error(ModelId::EvEbitda, 100.0, "EBITDA must be positive");
        let payload = synthesize_offline(&result, &assumptions(), &context(DataQuality::High));
        assert_eq!(payload.confidence_score, 0.0);
        assert!(payload.investment_thesis.contains("EBITDA"));
    }
}
