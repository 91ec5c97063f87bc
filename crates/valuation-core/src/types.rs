use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::sector::Sector;
use crate::stats;

/// Historical statements for one ticker. Every series is most-recent-first.
///
/// Optional series are `None` when the upstream feed has no data for them;
/// they are never zero-filled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialDataSet {
    pub ticker: String,
    pub years: Vec<String>,
    pub revenue: Vec<f64>,
    pub net_income: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebitda: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capex: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_capital_change: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depreciation_amortization: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_debt: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<Vec<f64>>,
    pub shares_outstanding: Vec<f64>,
}

impl FinancialDataSet {
    /// Value at `index` of an optional series, if present and finite.
    pub fn at(series: Option<&Vec<f64>>, index: usize) -> Option<f64> {
        series.and_then(|s| s.get(index)).copied().filter(|v| v.is_finite())
    }

    pub fn latest_revenue(&self) -> Option<f64> {
        self.revenue.first().copied().filter(|r| r.is_finite() && *r > 0.0)
    }

    pub fn latest_shares(&self) -> Option<f64> {
        self.shares_outstanding.first().copied().filter(|s| s.is_finite() && *s > 0.0)
    }

    /// Number of years with a revenue observation.
    pub fn len(&self) -> usize {
        self.revenue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revenue.is_empty()
    }

    /// Revenue CAGR (fraction) over at most `max_points` observations.
    pub fn revenue_cagr(&self, max_points: usize) -> Option<f64> {
        let n = self.revenue.len().min(max_points);
        if n < 2 {
            return None;
        }
        stats::cagr(self.revenue[0], self.revenue[n - 1], n - 1)
    }

    /// Latest `total_debt − cash`, treating a missing side as zero.
    /// Returns `None` when neither series is reported.
    pub fn latest_net_debt(&self) -> Option<f64> {
        let debt = Self::at(self.total_debt.as_ref(), 0);
        let cash = Self::at(self.cash.as_ref(), 0);
        match (debt, cash) {
            (None, None) => None,
            (d, c) => Some(d.unwrap_or(0.0) - c.unwrap_or(0.0)),
        }
    }
}

/// Live market snapshot. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyMarketData {
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub pb_ratio: Option<f64>,
}

impl CompanyMarketData {
    pub fn price(&self) -> Option<f64> {
        self.current_price.filter(|p| p.is_finite() && *p > 0.0)
    }

    /// Book value per share implied by price / PB.
    pub fn book_value_per_share(&self) -> Option<f64> {
        match (self.price(), self.pb_ratio) {
            (Some(price), Some(pb)) if pb.is_finite() && pb > 0.0 => Some(price / pb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Fallback,
    Low,
    Medium,
    High,
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataQuality::High => "high",
            DataQuality::Medium => "medium",
            DataQuality::Low => "low",
            DataQuality::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// Capital-intensity ratios to revenue, in percentage points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalIntensityProfile {
    pub capex_pct: f64,
    pub working_capital_pct: f64,
    pub depreciation_pct: f64,
    pub data_quality: DataQuality,
    pub years_of_data: usize,
    pub notes: Vec<String>,
}

/// Inputs to the cash-flow models. Rates are percentage points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DCFAssumptions {
    pub revenue_growth_rate: f64,
    pub ebitda_margin: f64,
    pub tax_rate: f64,
    pub wacc: f64,
    pub terminal_growth_rate: f64,
    pub projection_years: u32,
    pub capex_percentage: f64,
    pub working_capital_percentage: f64,
    pub depreciation_percentage: f64,
    pub net_debt_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_capex_rate: Option<f64>,
    #[serde(default)]
    pub requires_normalization: bool,
}

/// Provider-supplied default assumptions plus a per-field rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfDefaults {
    pub assumptions: DCFAssumptions,
    #[serde(default)]
    pub rationale: BTreeMap<String, String>,
}

/// Identifies a valuation methodology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    BankingExcessReturns,
    ItEvRevenue,
    RealEstateNav,
    PeMultiple,
    StandardFcffDcf,
    EvEbitda,
    ConservativeDcf,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::BankingExcessReturns => "banking_excess_returns",
            ModelId::ItEvRevenue => "it_ev_revenue",
            ModelId::RealEstateNav => "real_estate_nav",
            ModelId::PeMultiple => "pe_multiple",
            ModelId::StandardFcffDcf => "standard_fcff_dcf",
            ModelId::EvEbitda => "ev_ebitda",
            ModelId::ConservativeDcf => "conservative_dcf",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::BankingExcessReturns => "Banking Excess Returns",
            ModelId::ItEvRevenue => "IT EV/Revenue",
            ModelId::RealEstateNav => "Real Estate NAV",
            ModelId::PeMultiple => "PE Multiple",
            ModelId::StandardFcffDcf => "FCFF DCF",
            ModelId::EvEbitda => "EV/EBITDA",
            ModelId::ConservativeDcf => "Conservative DCF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "banking_excess_returns" | "banking" => Some(ModelId::BankingExcessReturns),
            "it_ev_revenue" | "ev_revenue" => Some(ModelId::ItEvRevenue),
            "real_estate_nav" | "nav" => Some(ModelId::RealEstateNav),
            "pe_multiple" | "pe" => Some(ModelId::PeMultiple),
            "standard_fcff_dcf" | "dcf" | "fcff" => Some(ModelId::StandardFcffDcf),
            "ev_ebitda" => Some(ModelId::EvEbitda),
            "conservative_dcf" => Some(ModelId::ConservativeDcf),
            _ => None,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One projected year of an FCFF model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowProjectionYear {
    pub year: u32,
    pub revenue: f64,
    pub ebitda: f64,
    pub nopat: f64,
    pub capex: f64,
    #[serde(rename = "deltaWC")]
    pub delta_wc: f64,
    pub depreciation: f64,
    pub fcff: f64,
    #[serde(rename = "presentValue")]
    pub present_value: f64,
    #[serde(rename = "growthRate")]
    pub growth_rate: f64,
}

/// Intermediate values of the equity bridge, when a model produces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculatedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pv_terminal_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_pv_cash_flows: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_debt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_net_debt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_value_per_share: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_multiple: Option<f64>,
}

pub const ERROR_METHOD: &str = "Error";

/// Output of any valuation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub model: ModelId,
    pub fair_value: f64,
    pub current_price: f64,
    pub upside_pct: f64,
    pub confidence: f64, // 0.0 to 1.0
    pub method: String,
    pub assumptions: BTreeMap<String, String>,
    pub reasoning: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_flow_projections: Option<Vec<CashFlowProjectionYear>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_data: Option<CalculatedData>,
    pub computed_at: DateTime<Utc>,
}

impl ValuationResult {
    pub fn new(
        model: ModelId,
        method: impl Into<String>,
        fair_value: f64,
        current_price: f64,
        confidence: f64,
    ) -> Self {
        Self {
            model,
            fair_value,
            current_price,
            upside_pct: upside_pct(fair_value, current_price),
            confidence: confidence.clamp(0.0, 1.0),
            method: method.into(),
            assumptions: BTreeMap::new(),
            reasoning: Vec::new(),
            cash_flow_projections: None,
            calculated_data: None,
            computed_at: Utc::now(),
        }
    }

    /// Failed valuation: zero fair value and confidence, message in reasoning.
    pub fn error(model: ModelId, current_price: f64, message: impl Into<String>) -> Self {
        let mut result = Self::new(model, ERROR_METHOD, 0.0, current_price, 0.0);
        result.upside_pct = 0.0;
        result.reasoning.push(message.into());
        result
    }

    pub fn is_error(&self) -> bool {
        self.method == ERROR_METHOD
    }

    pub fn with_assumption(mut self, key: &str, value: impl Into<String>) -> Self {
        self.assumptions.insert(key.to_string(), value.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: Vec<String>) -> Self {
        self.reasoning = reasoning;
        self
    }
}

/// `(fair − price) / price × 100`, zero when the price is unknown.
pub fn upside_pct(fair_value: f64, current_price: f64) -> f64 {
    if current_price > 0.0 && fair_value.is_finite() {
        (fair_value - current_price) / current_price * 100.0
    } else {
        0.0
    }
}

/// Everything a model needs for one run.
#[derive(Debug, Clone)]
pub struct ValuationContext<'a> {
    pub ticker: &'a str,
    pub sector: Sector,
    pub financials: &'a FinancialDataSet,
    pub market: &'a CompanyMarketData,
    pub assumptions: &'a DCFAssumptions,
}

impl ValuationContext<'_> {
    pub fn current_price(&self) -> f64 {
        self.market.price().unwrap_or(0.0)
    }
}

/// Narrative commentary produced by the insight service (or synthesized offline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsPayload {
    pub investment_thesis: String,
    pub model_interpretation: String,
    pub key_insights: Vec<String>,
    pub risk_commentary: Vec<String>,
    pub red_flags: Vec<String>,
    pub confidence_score: f64,
}

/// Wire envelope of the insight service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsResponse {
    pub insights: InsightsPayload,
}

/// Extra context forwarded to the insight service alongside a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightContext {
    pub sector: Sector,
    pub data_quality: DataQuality,
    pub requires_normalization: bool,
    pub capital_intensity_notes: Vec<String>,
}
