use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Quiet period before an assumption edit is recomputed.
    pub debounce: Duration,
    /// How long the fair value must hold still before insights are requested.
    pub insight_stability_window: Duration,
    /// Relative change below which the fair value counts as unchanged (0.005 = 0.5%).
    pub stability_tolerance: f64,
    /// System-initiated recalculations allowed per ticker session.
    pub cost_budget: u32,
    pub history_years: usize,
    pub result_cache_ttl_secs: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            insight_stability_window: Duration::from_secs(2),
            stability_tolerance: 0.005,
            cost_budget: 10,
            history_years: 5,
            result_cache_ttl_secs: 300,
        }
    }
}

fn var_or(name: &str, default: impl ToString) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            debounce: Duration::from_millis(
                var_or("VALUATION_DEBOUNCE_MS", defaults.debounce.as_millis())
                    .parse()
                    .context("VALUATION_DEBOUNCE_MS must be an integer")?,
            ),
            insight_stability_window: Duration::from_millis(
                var_or(
                    "VALUATION_INSIGHT_STABILITY_MS",
                    defaults.insight_stability_window.as_millis(),
                )
                .parse()
                .context("VALUATION_INSIGHT_STABILITY_MS must be an integer")?,
            ),
            stability_tolerance: var_or(
                "VALUATION_STABILITY_TOLERANCE",
                defaults.stability_tolerance,
            )
            .parse()
            .context("VALUATION_STABILITY_TOLERANCE must be a number")?,
            cost_budget: var_or("VALUATION_COST_BUDGET", defaults.cost_budget)
                .parse()
                .context("VALUATION_COST_BUDGET must be an integer")?,
            history_years: var_or("VALUATION_HISTORY_YEARS", defaults.history_years)
                .parse()
                .context("VALUATION_HISTORY_YEARS must be an integer")?,
            result_cache_ttl_secs: var_or(
                "VALUATION_CACHE_TTL_SECS",
                defaults.result_cache_ttl_secs,
            )
            .parse()
            .context("VALUATION_CACHE_TTL_SECS must be an integer")?,
        };

        anyhow::ensure!(config.history_years >= 1, "VALUATION_HISTORY_YEARS must be at least 1");
        anyhow::ensure!(
            (0.0..1.0).contains(&config.stability_tolerance),
            "VALUATION_STABILITY_TOLERANCE must be in [0, 1)"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = OrchestratorConfig::default();
        assert_eq!(c.debounce, Duration::from_millis(300));
        assert_eq!(c.insight_stability_window, Duration::from_secs(2));
        assert_eq!(c.cost_budget, 10);
    }
}
