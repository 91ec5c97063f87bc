use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use valuation_core::{
    AssumptionDefaultsProvider, CompanyMarketData, DCFAssumptions, DcfDefaults,
    FinancialDataProvider, FinancialDataSet, InsightContext, InsightsPayload, InsightsProvider,
    InsightsResponse, Sector, ValuationError, ValuationResult,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Serialize)]
struct InsightsRequest<'a> {
    ticker: &'a str,
    result: &'a ValuationResult,
    assumptions: &'a DCFAssumptions,
    context: &'a InsightContext,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

/// Decode the insight service body: either the `{insights: …}` envelope or
/// an `{error: …}` payload.
pub fn decode_insights(body: &str) -> ClientResult<InsightsPayload> {
    if let Ok(envelope) = serde_json::from_str::<InsightsResponse>(body) {
        return Ok(envelope.insights);
    }
    match serde_json::from_str::<ErrorPayload>(body) {
        Ok(payload) => Err(ClientError::ServiceUnavailable(payload.error)),
        Err(e) => Err(ClientError::Serialization(e)),
    }
}

#[derive(Clone)]
pub struct ValuationApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ValuationApiClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_defaults() -> ClientResult<Self> {
        Self::new(ClientConfig::default())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::ServiceUnavailable(format!(
                "GET {path}: status {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn fetch_financials(
        &self,
        ticker: &str,
        years: usize,
    ) -> ClientResult<FinancialDataSet> {
        let data: FinancialDataSet = self
            .get_json(&format!("financials/{ticker}"), &[("years", years.to_string())])
            .await?;
        if data.revenue.is_empty() {
            return Err(ClientError::InvalidResponse(format!("{ticker}: no revenue history")));
        }
        Ok(data)
    }

    pub async fn fetch_company(&self, ticker: &str) -> ClientResult<CompanyMarketData> {
        self.get_json(&format!("company/{ticker}"), &[]).await
    }

    pub async fn fetch_defaults(&self, ticker: &str, sector: Sector) -> ClientResult<DcfDefaults> {
        self.get_json(
            &format!("dcf-defaults/{ticker}"),
            &[("sector", sector.as_str().to_string())],
        )
        .await
    }

    pub async fn fetch_insights(
        &self,
        ticker: &str,
        result: &ValuationResult,
        assumptions: &DCFAssumptions,
        context: &InsightContext,
    ) -> ClientResult<InsightsPayload> {
        let request = InsightsRequest {
            ticker,
            result,
            assumptions,
            context,
        };
        let response = self
            .client
            .post(format!("{}/dcf-insights", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }
        decode_insights(&response.text().await?)
    }
}

#[async_trait]
impl FinancialDataProvider for ValuationApiClient {
    async fn get_financial_data(
        &self,
        ticker: &str,
        years: usize,
    ) -> Result<FinancialDataSet, ValuationError> {
        tracing::debug!(%ticker, years, "Fetching financial data");
        self.fetch_financials(ticker, years).await.map_err(|e| match e {
            ClientError::InvalidResponse(msg) => ValuationError::DataUnavailable(msg),
            other => other.into(),
        })
    }

    async fn get_basic_company_data(
        &self,
        ticker: &str,
    ) -> Result<CompanyMarketData, ValuationError> {
        tracing::debug!(%ticker, "Fetching company data");
        Ok(self.fetch_company(ticker).await?)
    }
}

#[async_trait]
impl AssumptionDefaultsProvider for ValuationApiClient {
    async fn get_dcf_defaults(
        &self,
        ticker: &str,
        sector: Sector,
    ) -> Result<DcfDefaults, ValuationError> {
        Ok(self.fetch_defaults(ticker, sector).await?)
    }
}

#[async_trait]
impl InsightsProvider for ValuationApiClient {
    async fn get_dcf_insights(
        &self,
        ticker: &str,
        result: &ValuationResult,
        assumptions: &DCFAssumptions,
        context: &InsightContext,
    ) -> Result<InsightsPayload, ValuationError> {
        tracing::info!(%ticker, model = %result.model, "Requesting insights");
        Ok(self.fetch_insights(ticker, result, assumptions, context).await?)
    }
}
