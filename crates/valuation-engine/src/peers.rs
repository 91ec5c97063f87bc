use std::sync::Arc;

use serde::{Deserialize, Serialize};
use valuation_core::{stats, FinancialDataProvider, MarketCapTier, ValuationError};

use crate::tables::it_peers;

pub const MIN_PEER_MULTIPLE: f64 = 2.0;
pub const MAX_PEER_MULTIPLE: f64 = 15.0;
const TRIM_FRACTION: f64 = 0.2;
const MIN_PEERS_FOR_TRIM: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultipleSource {
    Peers { used: Vec<String> },
    StaticFallback { reason: String },
}

/// Resolved base EV/Revenue multiple and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMultiple {
    pub multiple: f64,
    pub tier: MarketCapTier,
    pub source: MultipleSource,
    pub discarded: Vec<String>,
}

impl PeerMultiple {
    pub fn is_peer_derived(&self) -> bool {
        matches!(self.source, MultipleSource::Peers { .. })
    }
}

/// Fetches peer EV/Revenue multiples concurrently and sanitizes them.
#[derive(Clone)]
pub struct PeerMultipleResolver {
    provider: Arc<dyn FinancialDataProvider>,
}

impl PeerMultipleResolver {
    pub fn new(provider: Arc<dyn FinancialDataProvider>) -> Self {
        Self { provider }
    }

    /// Base multiple for a company of `tier`, excluding the company itself
    /// from its own peer group. Never fails: total failure yields the static
    /// per-tier constant.
    pub async fn resolve(&self, ticker: &str, tier: MarketCapTier) -> PeerMultiple {
        let peers: Vec<&str> = it_peers::peer_set(tier)
            .iter()
            .copied()
            .filter(|p| !p.eq_ignore_ascii_case(ticker))
            .collect();

        // One peer's failure must not abort the group
        let futures: Vec<_> = peers
            .iter()
            .map(|peer| async move { (peer.to_string(), self.peer_ev_revenue(peer).await) })
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut accepted = Vec::new();
        let mut used = Vec::new();
        let mut discarded = Vec::new();
        for (peer, result) in results {
            match result {
                Ok(m) if (MIN_PEER_MULTIPLE..=MAX_PEER_MULTIPLE).contains(&m) => {
                    accepted.push(m);
                    used.push(peer);
                }
                Ok(m) => {
                    tracing::debug!(
                        %peer,
                        multiple = m,
                        "Discarding peer multiple outside sanity band"
                    );
                    discarded.push(format!(
                        "{peer}: {m:.2}x outside [{MIN_PEER_MULTIPLE}, {MAX_PEER_MULTIPLE}]"
                    ));
                }
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "Peer data fetch failed");
                    discarded.push(format!("{peer}: {e}"));
                }
            }
        }

        match stats::trimmed_mean(&accepted, TRIM_FRACTION, MIN_PEERS_FOR_TRIM) {
            Some(multiple) => {
                tracing::info!(%ticker, multiple, peers = used.len(), "Resolved peer EV/Revenue");
                PeerMultiple {
                    multiple,
                    tier,
                    source: MultipleSource::Peers { used },
                    discarded,
                }
            }
            None => {
                let multiple = it_peers::fallback_multiple(tier);
                tracing::warn!(
                    %ticker,
                    multiple,
                    "No usable peer multiples, using static tier multiple"
                );
                PeerMultiple {
                    multiple,
                    tier,
                    source: MultipleSource::StaticFallback {
                        reason: "No peer multiple within sanity band".to_string(),
                    },
                    discarded,
                }
            }
        }
    }

    async fn peer_ev_revenue(&self, peer: &str) -> Result<f64, ValuationError> {
        let (market, financials) = futures::future::join(
            self.provider.get_basic_company_data(peer),
            self.provider.get_financial_data(peer, 1),
        )
        .await;
        let market = market?;
        let financials = financials?;

        let market_cap = market
            .market_cap
            .filter(|m| *m > 0.0)
            .ok_or_else(|| ValuationError::DataUnavailable(format!("{peer} market cap missing")))?;
        let revenue = financials
            .latest_revenue()
            .ok_or_else(|| ValuationError::DataUnavailable(format!("{peer} revenue missing")))?;

        let enterprise_value = market_cap + financials.latest_net_debt().unwrap_or(0.0);
        Ok(enterprise_value / revenue)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use valuation_core::{CompanyMarketData, FinancialDataSet};

    /// Provider serving canned market cap / revenue per ticker; unknown
    /// tickers fail.
    pub(crate) struct CannedPeers {
        pub data: HashMap<String, (f64, f64)>,
    }

    #[async_trait]
    impl FinancialDataProvider for CannedPeers {
        async fn get_financial_data(
            &self,
            ticker: &str,
            _years: usize,
        ) -> Result<FinancialDataSet, ValuationError> {
            let (_, revenue) = self
                .data
                .get(ticker)
                .ok_or_else(|| ValuationError::ExternalCallFailure(format!("{ticker}: 404")))?;
            Ok(FinancialDataSet {
                ticker: ticker.to_string(),
                revenue: vec![*revenue],
                net_income: vec![0.0],
                shares_outstanding: vec![1.0],
                ..Default::default()
            })
        }

        async fn get_basic_company_data(
            &self,
            ticker: &str,
        ) -> Result<CompanyMarketData, ValuationError> {
            let (market_cap, _) = self
                .data
                .get(ticker)
                .ok_or_else(|| ValuationError::ExternalCallFailure(format!("{ticker}: 404")))?;
            Ok(CompanyMarketData {
                market_cap: Some(*market_cap),
                ..Default::default()
            })
        }
    }

    fn resolver(entries: &[(&str, f64, f64)]) -> PeerMultipleResolver {
        let data = entries
            .iter()
            .map(|(t, m, r)| (t.to_string(), (*m, *r)))
            .collect();
        PeerMultipleResolver::new(Arc::new(CannedPeers { data }))
    }

    #[tokio::test]
    async fn test_partial_failure_still_resolves() {
        // WIPRO and HCLTECH missing from the canned data
        let r = resolver(&[("TCS", 1.5e13, 2.4e12), ("INFY", 7.0e12, 1.5e12)]);
        let result = r.resolve("XYZ", MarketCapTier::Mega).await;
        assert!(result.is_peer_derived());
        let expected = (1.5e13 / 2.4e12 + 7.0e12 / 1.5e12) / 2.0;
        assert!((result.multiple - expected).abs() < 1e-9);
        assert_eq!(result.discarded.len(), 2);
    }

    #[tokio::test]
    async fn test_outliers_discarded() {
        let r = resolver(&[
            ("TCS", 20.0e12, 1.0e12),    // 20x, discarded
            ("INFY", 5.0e12, 1.0e12),    // 5x
            ("HCLTECH", 6.0e12, 1.0e12), // 6x
            ("WIPRO", 1.0e12, 1.0e12),   // 1x, discarded
        ]);
        let result = r.resolve("XYZ", MarketCapTier::Mega).await;
        assert!((result.multiple - 5.5).abs() < 1e-9);
        assert_eq!(result.discarded.len(), 2);
    }

    #[tokio::test]
    async fn test_four_peers_trimmed_to_middle_pair() {
        let r = resolver(&[
            ("TCS", 14.0e12, 1.0e12),    // 14x
            ("INFY", 5.0e12, 1.0e12),    // 5x
            ("HCLTECH", 6.0e12, 1.0e12), // 6x
            ("WIPRO", 3.0e12, 1.0e12),   // 3x
        ]);
        let result = r.resolve("XYZ", MarketCapTier::Mega).await;
        assert!(result.discarded.is_empty());
        assert!((result.multiple - 5.5).abs() < 1e-9);
        match result.source {
            MultipleSource::Peers { used } => assert_eq!(used.len(), 4),
            other => panic!("expected peer-derived multiple, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_total_failure_uses_static_tier_multiple() {
        let r = resolver(&[]);
        let result = r.resolve("XYZ", MarketCapTier::Mega).await;
        assert!(!result.is_peer_derived());
        assert_eq!(result.multiple, 6.5);
    }

    #[tokio::test]
    async fn test_target_excluded_from_own_peer_group() {
        let r = resolver(&[("TCS", 4.0e12, 1.0e12), ("INFY", 8.0e12, 1.0e12)]);
        let result = r.resolve("tcs", MarketCapTier::Mega).await;
        assert_eq!(result.multiple, 8.0);
    }
}
