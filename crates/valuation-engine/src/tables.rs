//! Immutable sector- and size-keyed constants.
//!
//! Built once on first use and shared by reference for the life of the
//! process.

use std::collections::HashMap;
use std::sync::OnceLock;

use valuation_core::{DCFAssumptions, MarketCapTier, Sector};

/// CAPM inputs, percentage points.
pub const RISK_FREE_RATE: f64 = 7.2;
pub const EQUITY_RISK_PREMIUM: f64 = 8.5;
/// Nominal GDP growth used when historical EPS growth is discarded.
pub const GDP_GROWTH: f64 = 8.0;

/// Static per-sector configuration.
#[derive(Debug, Clone)]
pub struct SectorProfile {
    pub base_beta: f64,
    /// Benchmark trailing PE for the sector.
    pub base_pe: f64,
    /// Sector-specific multiplier applied on top of the size premium.
    pub pe_adjustment: f64,
    /// Growth premium over GDP, percentage points.
    pub growth_premium: f64,
    pub ev_ebitda_multiple: f64,
    /// CapEx, working-capital and D&A ratios to revenue, percentage points.
    pub capex_pct: f64,
    pub working_capital_pct: f64,
    pub depreciation_pct: f64,
    pub wacc: f64,
    pub terminal_growth: f64,
    pub revenue_growth: f64,
    pub ebitda_margin: f64,
    /// Cap on net debt as a share of enterprise value, percentage points.
    pub net_debt_pct: f64,
}

pub struct SectorTables {
    profiles: HashMap<Sector, SectorProfile>,
    other: SectorProfile,
}

impl SectorTables {
    fn build() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            Sector::Bfsi,
            SectorProfile {
                base_beta: 1.00,
                base_pe: 16.0,
                pe_adjustment: 0.95,
                growth_premium: 5.0,
                ev_ebitda_multiple: 12.0,
                capex_pct: 1.0,
                working_capital_pct: 0.0,
                depreciation_pct: 1.0,
                wacc: 12.5,
                terminal_growth: 5.0,
                revenue_growth: 12.0,
                ebitda_margin: 35.0,
                net_debt_pct: 15.0,
            },
        );
        profiles.insert(
            Sector::It,
            SectorProfile {
                base_beta: 0.90,
                base_pe: 26.0,
                pe_adjustment: 1.10,
                growth_premium: 7.0,
                ev_ebitda_multiple: 18.0,
                capex_pct: 3.0,
                working_capital_pct: 2.0,
                depreciation_pct: 3.0,
                wacc: 11.5,
                terminal_growth: 5.0,
                revenue_growth: 10.0,
                ebitda_margin: 24.0,
                net_debt_pct: 5.0,
            },
        );
        profiles.insert(
            Sector::Pharma,
            SectorProfile {
                base_beta: 0.80,
                base_pe: 28.0,
                pe_adjustment: 1.05,
                growth_premium: 6.0,
                ev_ebitda_multiple: 16.0,
                capex_pct: 6.0,
                working_capital_pct: 3.0,
                depreciation_pct: 4.0,
                wacc: 11.5,
                terminal_growth: 5.0,
                revenue_growth: 10.0,
                ebitda_margin: 22.0,
                net_debt_pct: 10.0,
            },
        );
        profiles.insert(
            Sector::RealEstate,
            SectorProfile {
                base_beta: 1.30,
                base_pe: 22.0,
                pe_adjustment: 0.90,
                growth_premium: 4.0,
                ev_ebitda_multiple: 14.0,
                capex_pct: 2.0,
                working_capital_pct: 8.0,
                depreciation_pct: 1.5,
                wacc: 13.5,
                terminal_growth: 4.5,
                revenue_growth: 12.0,
                ebitda_margin: 28.0,
                net_debt_pct: 25.0,
            },
        );
        profiles.insert(
            Sector::Fmcg,
            SectorProfile {
                base_beta: 0.70,
                base_pe: 42.0,
                pe_adjustment: 1.15,
                growth_premium: 4.0,
                ev_ebitda_multiple: 30.0,
                capex_pct: 4.0,
                working_capital_pct: 1.0,
                depreciation_pct: 2.5,
                wacc: 10.5,
                terminal_growth: 5.0,
                revenue_growth: 9.0,
                ebitda_margin: 20.0,
                net_debt_pct: 5.0,
            },
        );
        profiles.insert(
            Sector::Energy,
            SectorProfile {
                base_beta: 1.10,
                base_pe: 12.0,
                pe_adjustment: 0.90,
                growth_premium: 2.0,
                ev_ebitda_multiple: 7.0,
                capex_pct: 10.0,
                working_capital_pct: 2.0,
                depreciation_pct: 6.0,
                wacc: 11.5,
                terminal_growth: 4.0,
                revenue_growth: 7.0,
                ebitda_margin: 16.0,
                net_debt_pct: 25.0,
            },
        );
        profiles.insert(
            Sector::Telecom,
            SectorProfile {
                base_beta: 0.90,
                base_pe: 20.0,
                pe_adjustment: 1.00,
                growth_premium: 3.0,
                ev_ebitda_multiple: 9.0,
                capex_pct: 12.0,
                working_capital_pct: 1.0,
                depreciation_pct: 10.0,
                wacc: 11.5,
                terminal_growth: 4.5,
                revenue_growth: 9.0,
                ebitda_margin: 45.0,
                net_debt_pct: 30.0,
            },
        );
        profiles.insert(
            Sector::Auto,
            SectorProfile {
                base_beta: 1.10,
                base_pe: 22.0,
                pe_adjustment: 1.00,
                growth_premium: 4.0,
                ev_ebitda_multiple: 12.0,
                capex_pct: 7.0,
                working_capital_pct: 2.0,
                depreciation_pct: 4.0,
                wacc: 12.0,
                terminal_growth: 5.0,
                revenue_growth: 10.0,
                ebitda_margin: 14.0,
                net_debt_pct: 15.0,
            },
        );
        profiles.insert(
            Sector::Metals,
            SectorProfile {
                base_beta: 1.40,
                base_pe: 10.0,
                pe_adjustment: 0.90,
                growth_premium: 2.0,
                ev_ebitda_multiple: 6.0,
                capex_pct: 9.0,
                working_capital_pct: 3.0,
                depreciation_pct: 5.0,
                wacc: 13.0,
                terminal_growth: 4.0,
                revenue_growth: 7.0,
                ebitda_margin: 18.0,
                net_debt_pct: 30.0,
            },
        );
        profiles.insert(
            Sector::Chemicals,
            SectorProfile {
                base_beta: 1.00,
                base_pe: 28.0,
                pe_adjustment: 1.05,
                growth_premium: 5.0,
                ev_ebitda_multiple: 15.0,
                capex_pct: 7.0,
                working_capital_pct: 3.0,
                depreciation_pct: 4.0,
                wacc: 12.0,
                terminal_growth: 5.0,
                revenue_growth: 11.0,
                ebitda_margin: 18.0,
                net_debt_pct: 15.0,
            },
        );
        profiles.insert(
            Sector::Textiles,
            SectorProfile {
                base_beta: 1.10,
                base_pe: 16.0,
                pe_adjustment: 0.95,
                growth_premium: 3.0,
                ev_ebitda_multiple: 8.0,
                capex_pct: 5.0,
                working_capital_pct: 4.0,
                depreciation_pct: 3.5,
                wacc: 13.0,
                terminal_growth: 4.5,
                revenue_growth: 8.0,
                ebitda_margin: 12.0,
                net_debt_pct: 20.0,
            },
        );
        profiles.insert(
            Sector::Cement,
            SectorProfile {
                base_beta: 1.00,
                base_pe: 24.0,
                pe_adjustment: 1.00,
                growth_premium: 3.0,
                ev_ebitda_multiple: 13.0,
                capex_pct: 8.0,
                working_capital_pct: 2.0,
                depreciation_pct: 4.5,
                wacc: 12.0,
                terminal_growth: 5.0,
                revenue_growth: 9.0,
                ebitda_margin: 20.0,
                net_debt_pct: 20.0,
            },
        );
        profiles.insert(
            Sector::Diversified,
            SectorProfile {
                base_beta: 1.00,
                base_pe: 18.0,
                pe_adjustment: 1.00,
                growth_premium: 3.0,
                ev_ebitda_multiple: 10.0,
                capex_pct: 6.0,
                working_capital_pct: 3.0,
                depreciation_pct: 4.0,
                wacc: 12.0,
                terminal_growth: 5.0,
                revenue_growth: 9.0,
                ebitda_margin: 18.0,
                net_debt_pct: 20.0,
            },
        );
        let other = SectorProfile {
            base_beta: 1.00,
            base_pe: 18.0,
            pe_adjustment: 1.00,
            growth_premium: 3.0,
            ev_ebitda_multiple: 10.0,
            capex_pct: 6.0,
            working_capital_pct: 3.0,
            depreciation_pct: 4.0,
            wacc: 12.0,
            terminal_growth: 5.0,
            revenue_growth: 9.0,
            ebitda_margin: 18.0,
            net_debt_pct: 20.0,
        };
        profiles.insert(Sector::Other, other.clone());
        Self { profiles, other }
    }

    pub fn profile(&self, sector: Sector) -> &SectorProfile {
        self.profiles.get(&sector).unwrap_or(&self.other)
    }

    /// Beta adjustment for company size, added to the sector base beta.
    pub fn size_beta_adjustment(&self, tier: MarketCapTier) -> f64 {
        match tier {
            MarketCapTier::Mega => -0.2,
            MarketCapTier::Large => -0.1,
            MarketCapTier::Mid => 0.0,
            MarketCapTier::Small => 0.2,
        }
    }

    /// Base moat premium over cost of equity, percentage points.
    pub fn moat_premium(&self, tier: MarketCapTier) -> f64 {
        match tier {
            MarketCapTier::Mega => 3.0,
            MarketCapTier::Large => 2.0,
            MarketCapTier::Mid => 1.0,
            MarketCapTier::Small => 0.5,
        }
    }

    /// Extra moat credit for dominant market position, percentage points.
    pub fn market_position_bonus(&self, tier: MarketCapTier) -> f64 {
        match tier {
            MarketCapTier::Mega => 2.0,
            MarketCapTier::Large => 1.0,
            MarketCapTier::Mid => 0.5,
            MarketCapTier::Small => 0.0,
        }
    }

    /// Market-cap premium applied to the sector benchmark PE.
    pub fn pe_size_premium(&self, tier: MarketCapTier) -> f64 {
        match tier {
            MarketCapTier::Mega => 1.25,
            MarketCapTier::Large => 1.15,
            MarketCapTier::Mid => 1.05,
            MarketCapTier::Small => 1.0,
        }
    }

    /// EV/EBITDA premium for size.
    pub fn ev_ebitda_size_premium(&self, tier: MarketCapTier) -> f64 {
        match tier {
            MarketCapTier::Mega => 1.15,
            MarketCapTier::Large => 1.05,
            MarketCapTier::Mid => 1.0,
            MarketCapTier::Small => 0.9,
        }
    }

    /// Sector default DCF assumptions, with capital-intensity ratios taken from
    /// the same profile.
    pub fn default_assumptions(&self, sector: Sector) -> DCFAssumptions {
        let p = self.profile(sector);
        DCFAssumptions {
            revenue_growth_rate: p.revenue_growth,
            ebitda_margin: p.ebitda_margin,
            tax_rate: 25.0,
            wacc: p.wacc,
            terminal_growth_rate: p.terminal_growth,
            projection_years: 10,
            capex_percentage: p.capex_pct,
            working_capital_percentage: p.working_capital_pct,
            depreciation_percentage: p.depreciation_pct,
            net_debt_percentage: p.net_debt_pct,
            normalized_capex_rate: None,
            requires_normalization: false,
        }
    }
}

/// IT services peer groups and fallback multiples by size.
pub mod it_peers {
    use valuation_core::MarketCapTier;

    pub fn peer_set(tier: MarketCapTier) -> &'static [&'static str] {
        match tier {
            MarketCapTier::Mega => &["TCS", "INFY", "HCLTECH", "WIPRO"],
            MarketCapTier::Large => &["TECHM", "LTIM", "PERSISTENT", "COFORGE"],
            MarketCapTier::Mid => &["MPHASIS", "LTTS", "KPITTECH", "CYIENT"],
            MarketCapTier::Small => &["SONATSOFTW", "BSOFT", "ZENSARTECH", "MASTEK"],
        }
    }

    /// Static EV/Revenue used when no peer multiple can be resolved.
    pub fn fallback_multiple(tier: MarketCapTier) -> f64 {
        match tier {
            MarketCapTier::Mega => 6.5,
            MarketCapTier::Large => 5.0,
            MarketCapTier::Mid => 4.0,
            MarketCapTier::Small => 3.0,
        }
    }

    pub fn band_label(tier: MarketCapTier) -> &'static str {
        match tier {
            MarketCapTier::Mega => "Tier-1 Leader",
            MarketCapTier::Large => "Tier-2 Established",
            MarketCapTier::Mid => "Mid-Tier Specialist",
            MarketCapTier::Small => "Emerging",
        }
    }

    /// Net cash as a share of revenue, pending a balance-sheet feed.
    pub fn net_cash_pct_of_revenue(tier: MarketCapTier) -> f64 {
        match tier {
            MarketCapTier::Mega => 0.15,
            MarketCapTier::Large => 0.10,
            MarketCapTier::Mid => 0.08,
            MarketCapTier::Small => 0.05,
        }
    }
}

static TABLES: OnceLock<SectorTables> = OnceLock::new();

pub fn sector_tables() -> &'static SectorTables {
    TABLES.get_or_init(SectorTables::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sector_has_profile() {
        let tables = sector_tables();
        for sector in Sector::ALL {
            let p = tables.profile(sector);
            assert!(p.wacc > p.terminal_growth, "{sector}");
            assert!(p.capex_pct <= 12.0, "{sector}");
            assert!(p.growth_premium >= 2.0 && p.growth_premium <= 7.0, "{sector}");
        }
    }

    #[test]
    fn test_tables_are_shared() {
        assert!(std::ptr::eq(sector_tables(), sector_tables()));
    }
}
