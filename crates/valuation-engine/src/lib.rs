//! Sector-aware valuation engine.
//!
//! Classifies a company's sector, estimates its capital intensity from
//! history, normalizes peak-investment growth, and runs the valuation model
//! appropriate for the sector.

pub mod capital_intensity;
pub mod classifier;
pub mod dispatcher;
pub mod growth;
pub mod models;
pub mod peers;
pub mod tables;

pub use capital_intensity::CapitalIntensityEstimator;
pub use classifier::classify;
pub use dispatcher::ModelDispatcher;
pub use growth::{FadeSchedule, GrowthNormalizer, NormalizationDecision};
pub use peers::{PeerMultiple, PeerMultipleResolver};
pub use tables::{sector_tables, SectorTables};
