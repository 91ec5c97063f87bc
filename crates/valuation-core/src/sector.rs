use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical industry sectors understood by the valuation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sector {
    #[serde(rename = "BFSI")]
    Bfsi,
    #[serde(rename = "IT")]
    It,
    #[serde(rename = "PHARMA")]
    Pharma,
    #[serde(rename = "REAL ESTATE")]
    RealEstate,
    #[serde(rename = "FMCG")]
    Fmcg,
    #[serde(rename = "ENERGY")]
    Energy,
    #[serde(rename = "TELECOM")]
    Telecom,
    #[serde(rename = "AUTO")]
    Auto,
    #[serde(rename = "METALS")]
    Metals,
    #[serde(rename = "CHEMICALS")]
    Chemicals,
    #[serde(rename = "TEXTILES")]
    Textiles,
    #[serde(rename = "CEMENT")]
    Cement,
    #[serde(rename = "DIVERSIFIED")]
    Diversified,
    #[serde(rename = "OTHER")]
    Other,
}

impl Sector {
    pub const ALL: [Sector; 14] = [
        Sector::Bfsi,
        Sector::It,
        Sector::Pharma,
        Sector::RealEstate,
        Sector::Fmcg,
        Sector::Energy,
        Sector::Telecom,
        Sector::Auto,
        Sector::Metals,
        Sector::Chemicals,
        Sector::Textiles,
        Sector::Cement,
        Sector::Diversified,
        Sector::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Bfsi => "BFSI",
            Sector::It => "IT",
            Sector::Pharma => "PHARMA",
            Sector::RealEstate => "REAL ESTATE",
            Sector::Fmcg => "FMCG",
            Sector::Energy => "ENERGY",
            Sector::Telecom => "TELECOM",
            Sector::Auto => "AUTO",
            Sector::Metals => "METALS",
            Sector::Chemicals => "CHEMICALS",
            Sector::Textiles => "TEXTILES",
            Sector::Cement => "CEMENT",
            Sector::Diversified => "DIVERSIFIED",
            Sector::Other => "OTHER",
        }
    }

    /// Sectors whose large caps historically compound earnings steadily.
    /// Used by the PE model's anomaly guard.
    pub fn is_historically_stable(&self) -> bool {
        matches!(self, Sector::Bfsi | Sector::Fmcg | Sector::It)
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ₹1 lakh crore.
pub const MEGA_CAP_THRESHOLD: f64 = 1.0e12;
/// ₹20,000 crore.
pub const LARGE_CAP_THRESHOLD: f64 = 2.0e11;
/// ₹5,000 crore.
pub const MID_CAP_THRESHOLD: f64 = 5.0e10;

/// Size bucket derived from market capitalisation in rupees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCapTier {
    Mega,
    Large,
    Mid,
    Small,
}

impl MarketCapTier {
    pub fn from_market_cap(market_cap: Option<f64>) -> Self {
        match market_cap {
            Some(m) if m >= MEGA_CAP_THRESHOLD => MarketCapTier::Mega,
            Some(m) if m >= LARGE_CAP_THRESHOLD => MarketCapTier::Large,
            Some(m) if m >= MID_CAP_THRESHOLD => MarketCapTier::Mid,
            _ => MarketCapTier::Small,
        }
    }

    pub fn is_large_cap(&self) -> bool {
        matches!(self, MarketCapTier::Mega | MarketCapTier::Large)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarketCapTier::Mega => "Mega Cap",
            MarketCapTier::Large => "Large Cap",
            MarketCapTier::Mid => "Mid Cap",
            MarketCapTier::Small => "Small Cap",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(MarketCapTier::from_market_cap(Some(1.295e12)), MarketCapTier::Mega);
        assert_eq!(MarketCapTier::from_market_cap(Some(3.0e11)), MarketCapTier::Large);
        assert_eq!(MarketCapTier::from_market_cap(Some(5.0e10)), MarketCapTier::Mid);
        assert_eq!(MarketCapTier::from_market_cap(Some(4.9e10)), MarketCapTier::Small);
        assert_eq!(MarketCapTier::from_market_cap(None), MarketCapTier::Small);
    }

    #[test]
    fn test_sector_serializes_to_canonical_label() {
        let json = serde_json::to_string(&Sector::RealEstate).unwrap();
        assert_eq!(json, "\"REAL ESTATE\"");
        let back: Sector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Sector::RealEstate);
    }
}
