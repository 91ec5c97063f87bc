use async_trait::async_trait;

use crate::{
    CompanyMarketData, DCFAssumptions, DcfDefaults, FinancialDataSet, InsightContext,
    InsightsPayload, ModelId, Sector, ValuationContext, ValuationError, ValuationResult,
};

/// Source of historical statements and market snapshots.
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    async fn get_financial_data(
        &self,
        ticker: &str,
        years: usize,
    ) -> Result<FinancialDataSet, ValuationError>;

    async fn get_basic_company_data(
        &self,
        ticker: &str,
    ) -> Result<CompanyMarketData, ValuationError>;
}

/// Advisory default assumptions for a ticker.
#[async_trait]
pub trait AssumptionDefaultsProvider: Send + Sync {
    async fn get_dcf_defaults(
        &self,
        ticker: &str,
        sector: Sector,
    ) -> Result<DcfDefaults, ValuationError>;
}

/// Narrative insight generation, consumed as a black box.
#[async_trait]
pub trait InsightsProvider: Send + Sync {
    async fn get_dcf_insights(
        &self,
        ticker: &str,
        result: &ValuationResult,
        assumptions: &DCFAssumptions,
        context: &InsightContext,
    ) -> Result<InsightsPayload, ValuationError>;
}

/// A single valuation methodology.
///
/// Implementations are side-effect free apart from read-only fetches.
#[async_trait]
pub trait ValuationModel: Send + Sync {
    fn id(&self) -> ModelId;

    async fn value(&self, ctx: &ValuationContext<'_>) -> Result<ValuationResult, ValuationError>;
}
